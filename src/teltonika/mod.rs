pub mod codec;
pub mod connection;
pub mod frame;
pub mod io_semantics;
pub mod parser;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// AVL codec variants spoken by the devices.
///
/// Codec 8 Extended widens the event id and count fields from one byte to two
/// and adds a fifth variable-width I/O group; the rest of the layout is shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Codec {
    Codec8,
    Codec8Ext,
}

impl Codec {
    /// Wire identifier of the codec.
    pub fn id(&self) -> u8 {
        match self {
            Codec::Codec8 => 0x08,
            Codec::Codec8Ext => 0x8E,
        }
    }

    /// Width in bytes of event id, I/O count and I/O id fields.
    pub fn data_step(&self) -> usize {
        match self {
            Codec::Codec8 => 1,
            Codec::Codec8Ext => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Codec> {
        match id {
            0x08 => Some(Codec::Codec8),
            0x8E => Some(Codec::Codec8Ext),
            _ => None,
        }
    }
}

/// A decoded I/O element value.
///
/// The variant is chosen by the I/O semantics table ([`io_semantics::io_kind`]).
/// Scaled values keep their raw integer and decimal places so the upstream
/// string form is produced with integer arithmetic instead of a float
/// round-trip.
#[derive(Clone, Debug, PartialEq)]
pub enum IoValue {
    Unsigned(u64),
    Scaled { raw: u64, places: u32 },
    Signed(i32),
    /// Opaque identifier (driver / iButton id) as uppercase hex, normalized
    /// to exactly 16 characters.
    Identifier(String),
}

impl IoValue {
    /// The raw integer behind the value. Scaled values yield their unscaled
    /// integer; identifiers and negative values yield 0.
    pub fn as_u64(&self) -> u64 {
        match self {
            IoValue::Unsigned(value) => *value,
            IoValue::Scaled { raw, .. } => *raw,
            IoValue::Signed(value) => {
                if *value >= 0 {
                    *value as u64
                } else {
                    0
                }
            }
            IoValue::Identifier(_) => 0,
        }
    }

    /// The value with its scale factor applied.
    pub fn as_f64(&self) -> f64 {
        match self {
            IoValue::Unsigned(value) => *value as f64,
            IoValue::Scaled { raw, places } => *raw as f64 / 10u64.pow(*places) as f64,
            IoValue::Signed(value) => *value as f64,
            IoValue::Identifier(_) => 0.0,
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            IoValue::Identifier(id) => Some(id),
            _ => None,
        }
    }

    /// Upstream string form of the value.
    pub fn display(&self) -> String {
        match self {
            IoValue::Unsigned(value) => value.to_string(),
            IoValue::Scaled { raw, places } => format_scaled(*raw, *places),
            IoValue::Signed(value) => value.to_string(),
            IoValue::Identifier(id) => id.clone(),
        }
    }
}

impl Serialize for IoValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IoValue::Unsigned(value) => serializer.serialize_u64(*value),
            IoValue::Scaled { .. } => serializer.serialize_f64(self.as_f64()),
            IoValue::Signed(value) => serializer.serialize_i32(*value),
            IoValue::Identifier(id) => serializer.serialize_str(id),
        }
    }
}

/// Formats `raw / 10^places` without a float round-trip, trimming trailing
/// zeros: `(489, 2)` becomes `"4.89"`, `(0, 2)` becomes `"0"`.
pub fn format_scaled(raw: u64, places: u32) -> String {
    if places == 0 {
        return raw.to_string();
    }
    let divisor = 10u64.pow(places);
    let whole = raw / divisor;
    let mut fraction = format!("{:0width$}", raw % divisor, width = places as usize);
    while fraction.ends_with('0') {
        fraction.pop();
    }

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// One key-value pair carried inside an AVL record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IoElement {
    pub id: u16,
    pub value: IoValue,
}

/// A decoded AVL observation.
///
/// Immutable once emitted by the parser; the classifier derives an activity id
/// from it without modifying it.
#[derive(Clone, Debug, Serialize)]
pub struct AvlRecord {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i16,
    pub bearing: u16,
    pub satellites: u8,
    pub speed: u16,
    pub event_id: u16,
    pub io_elements: Vec<IoElement>,
    pub parse_errors: Vec<String>,
}

impl AvlRecord {
    /// Looks up an I/O element by id.
    pub fn io(&self, id: u16) -> Option<&IoValue> {
        self.io_elements
            .iter()
            .find(|element| element.id == id)
            .map(|element| &element.value)
    }

    pub fn io_u64(&self, id: u16) -> Option<u64> {
        self.io(id).map(IoValue::as_u64)
    }

    pub fn io_f64(&self, id: u16) -> Option<f64> {
        self.io(id).map(IoValue::as_f64)
    }

    pub fn io_display(&self, id: u16) -> Option<String> {
        self.io(id).map(IoValue::display)
    }

    pub fn has_io(&self, id: u16) -> bool {
        self.io(id).is_some()
    }
}

/// A decoded AVL data frame.
///
/// Frame-level decode problems end up in `parse_errors`; the records decoded
/// before the problem are retained. The trailing CRC is carried but not
/// verified.
#[derive(Clone, Debug, Serialize)]
pub struct AvlFrame {
    pub codec: Codec,
    pub records: Vec<AvlRecord>,
    pub crc16: u32,
    pub parse_errors: Vec<String>,
}
