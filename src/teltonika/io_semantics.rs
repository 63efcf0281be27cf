use std::collections::HashMap;

use lazy_static::lazy_static;

use super::codec::{be_unsigned, signed_32};
use super::IoValue;
use crate::utils::bytes_to_hex;

/// Decoder kind for an I/O element id.
///
/// The table below is the single process-wide source of truth for how an I/O
/// value is decoded. Consumers (classifier, payload builder) own their range
/// and sentinel semantics; nothing here interprets the values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoKind {
    /// Unsigned big-endian integer in its group width. The default.
    Raw,
    /// Fixed-point decimal with the given number of decimal places.
    Scaled(u32),
    /// Signed 32-bit value (accelerometer axes).
    Signed32,
    /// Driver / iButton identifier kept as normalized uppercase hex.
    OpaqueId,
}

/// Invalid-scan sentinel: the reader could not read the iButton.
pub const DRIVER_ID_ALL_F: &str = "FFFFFFFFFFFFFFFF";
/// Invalid-scan sentinel: no identifier present.
pub const DRIVER_ID_ALL_0: &str = "0000000000000000";

lazy_static! {
    /// I/O id to decoder kind. Ids missing from the table decode as [`IoKind::Raw`].
    static ref IO_KINDS: HashMap<u16, IoKind> = {
        let mut kinds = HashMap::new();
        // Voltages, 0.01 V resolution
        kinds.insert(66, IoKind::Scaled(2));
        kinds.insert(67, IoKind::Scaled(2));
        kinds.insert(13, IoKind::Scaled(2));
        // Currents and fuel rate, 0.001 resolution
        kinds.insert(68, IoKind::Scaled(3));
        kinds.insert(12, IoKind::Scaled(3));
        kinds.insert(6, IoKind::Scaled(3));
        // GNSS dilution and trip speed statistics, 0.1 resolution
        kinds.insert(181, IoKind::Scaled(1));
        kinds.insert(182, IoKind::Scaled(1));
        kinds.insert(241, IoKind::Scaled(1));
        kinds.insert(242, IoKind::Scaled(1));
        // Dallas temperature probes, 0.1 degree resolution
        kinds.insert(72, IoKind::Scaled(1));
        kinds.insert(73, IoKind::Scaled(1));
        kinds.insert(74, IoKind::Scaled(1));
        kinds.insert(75, IoKind::Scaled(1));
        // Accelerometer axes
        kinds.insert(17, IoKind::Signed32);
        kinds.insert(18, IoKind::Signed32);
        kinds.insert(19, IoKind::Signed32);
        // Driver identifiers
        kinds.insert(78, IoKind::OpaqueId);
        kinds.insert(245, IoKind::OpaqueId);
        kinds
    };
}

/// Decoder kind for an I/O id.
pub fn io_kind(id: u16) -> IoKind {
    IO_KINDS.get(&id).copied().unwrap_or(IoKind::Raw)
}

/// Normalizes an opaque identifier to exactly 16 uppercase hex characters:
/// left-padded with zeros when shorter, truncated to the last 16 when longer.
/// Sentinel patterns are kept verbatim; classifying them is the consumer's job.
pub fn normalize_opaque_id(hex: &str) -> String {
    let upper = hex.to_uppercase();
    if upper.len() >= 16 {
        upper[upper.len() - 16..].to_string()
    } else {
        format!("{:0>16}", upper)
    }
}

/// True when a normalized identifier matches an invalid-scan sentinel.
pub fn is_invalid_scan(identifier: &str) -> bool {
    identifier == DRIVER_ID_ALL_F || identifier == DRIVER_ID_ALL_0
}

/// Decodes an I/O element value according to the semantics table.
///
/// Variable-length values (Codec 8E X group) of raw ids wider than eight
/// bytes fall back to an opaque hex identifier so no data is dropped.
pub fn decode_io_value(id: u16, bytes: &[u8]) -> IoValue {
    match io_kind(id) {
        IoKind::Raw => {
            if bytes.len() > 8 {
                IoValue::Identifier(bytes_to_hex(bytes))
            } else {
                IoValue::Unsigned(be_unsigned(bytes))
            }
        }
        IoKind::Scaled(places) => IoValue::Scaled {
            raw: be_unsigned(bytes),
            places,
        },
        IoKind::Signed32 => IoValue::Signed(signed_32(bytes)),
        IoKind::OpaqueId => IoValue::Identifier(normalize_opaque_id(&bytes_to_hex(bytes))),
    }
}
