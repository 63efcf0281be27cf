use std::collections::HashSet;
use std::fmt;

use log::debug;
use nom::bytes::complete::tag;
use nom::multi::length_data;
use nom::number::complete::{be_u32, be_u8};
use nom::IResult;

use super::codec::{coordinate_or, device_timestamp, unsigned_or, ByteCursor};
use super::io_semantics::decode_io_value;
use super::{AvlFrame, AvlRecord, Codec, IoElement};

/// The frame is not a structurally valid Codec 8 / 8E packet. Raised only for
/// header-level damage; anything inside the body degrades into `parse_errors`.
#[derive(Debug, PartialEq, Eq)]
pub struct MalformedFrame;

impl fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed AVL frame")
    }
}

impl std::error::Error for MalformedFrame {}

/// Splits a raw frame into its length-prefixed data field and trailing CRC.
fn frame_envelope(input: &[u8]) -> IResult<&[u8], (&[u8], u32)> {
    let (input, _) = tag(&[0x00, 0x00, 0x00, 0x00][..])(input)?;
    let (input, data) = length_data(be_u32)(input)?;
    let (input, crc16) = be_u32(input)?;
    Ok((input, (data, crc16)))
}

/// Decodes a Codec 8 / 8E data frame into records.
///
/// Returns `Err` only when the envelope itself is damaged (bad preamble,
/// short data field, unknown codec). Everything inside the body is decoded
/// with per-record and per-element recovery: a failed element annotates the
/// record and skips the remainder of its width group, a truncated record
/// annotates the frame and keeps the records decoded before it. The trailing
/// CRC is carried but deliberately not verified.
pub fn parse_data_frame(input: &[u8]) -> Result<AvlFrame, MalformedFrame> {
    let (_, (data, crc16)) = frame_envelope(input).map_err(|_| MalformedFrame)?;
    let (body, codec_id) = be_u8::<_, nom::error::Error<&[u8]>>(data).map_err(|_| MalformedFrame)?;
    let codec = Codec::from_id(codec_id).ok_or(MalformedFrame)?;
    let (body, record_count) = be_u8::<_, nom::error::Error<&[u8]>>(body).map_err(|_| MalformedFrame)?;

    let mut frame = AvlFrame {
        codec,
        records: Vec::with_capacity(record_count as usize),
        crc16,
        parse_errors: Vec::new(),
    };

    let mut cursor = ByteCursor::new(body);
    for record_number in 1..=record_count {
        if cursor.remaining() == 0 {
            frame
                .parse_errors
                .push(format!("record {} of {} missing", record_number, record_count));
            break;
        }
        frame.records.push(record(&mut cursor, codec));
    }

    // The record count is repeated after the records; a mismatch is worth an
    // annotation but the decoded records stand.
    match cursor.take(1) {
        Some(trailer) if trailer[0] as usize == frame.records.len() => {}
        Some(trailer) => frame.parse_errors.push(format!(
            "trailing record count {} does not match {} decoded records",
            trailer[0],
            frame.records.len()
        )),
        None => frame.parse_errors.push(String::from("trailing record count missing")),
    }

    debug!(
        "Decoded {:?} frame: {} records, {} frame errors",
        codec,
        frame.records.len(),
        frame.parse_errors.len()
    );

    Ok(frame)
}

/// Decodes a single AVL record at the cursor.
///
/// The fixed header fields use total decode primitives, so a truncated record
/// produces defaults plus annotations rather than a panic or abort.
fn record(cursor: &mut ByteCursor, codec: Codec) -> AvlRecord {
    let step = codec.data_step();
    let mut errors = Vec::new();

    let timestamp = device_timestamp(cursor.take(8), &mut errors);
    let priority = unsigned_or(cursor.take(1), 0, "priority", &mut errors) as u8;
    let longitude = coordinate_or(cursor.take(4), 0.0, "longitude", &mut errors);
    let latitude = coordinate_or(cursor.take(4), 0.0, "latitude", &mut errors);
    let altitude = unsigned_or(cursor.take(2), 0, "altitude", &mut errors) as u16 as i16;
    let bearing = unsigned_or(cursor.take(2), 0, "bearing", &mut errors) as u16;
    let satellites = unsigned_or(cursor.take(1), 0, "satellites", &mut errors) as u8;
    let speed = unsigned_or(cursor.take(2), 0, "speed", &mut errors) as u16;
    let event_id = unsigned_or(cursor.take(step), 0, "event id", &mut errors) as u16;
    let declared_io_count = unsigned_or(cursor.take(step), 0, "I/O element count", &mut errors) as usize;

    let mut io_elements: Vec<IoElement> = Vec::new();
    for width in [1usize, 2, 4, 8] {
        fixed_io_group(cursor, step, width, &mut io_elements, &mut errors);
    }
    if codec == Codec::Codec8Ext {
        variable_io_group(cursor, &mut io_elements, &mut errors);
    }

    if errors.is_empty() && io_elements.len() != declared_io_count {
        errors.push(format!(
            "declared {} I/O elements, decoded {}",
            declared_io_count,
            io_elements.len()
        ));
    }

    AvlRecord {
        timestamp,
        priority,
        latitude,
        longitude,
        altitude,
        bearing,
        satellites,
        speed,
        event_id,
        io_elements,
        parse_errors: errors,
    }
}

/// Appends an element to the record map unless its id already appeared in an
/// earlier group; the first occurrence wins.
fn push_element(io_elements: &mut Vec<IoElement>, id: u16, value: super::IoValue) {
    if io_elements.iter().all(|element| element.id != id) {
        io_elements.push(IoElement { id, value });
    }
}

/// Decodes one fixed-width I/O group: a count followed by (id, value) pairs.
///
/// A failed element records an error and leaves the cursor where it was; the
/// rest of the group is skipped and the next group count is read from the
/// current position. A duplicate id inside the group is treated the same way.
fn fixed_io_group(
    cursor: &mut ByteCursor,
    step: usize,
    width: usize,
    io_elements: &mut Vec<IoElement>,
    errors: &mut Vec<String>,
) {
    let count = unsigned_or(cursor.take(step), 0, &format!("{}-byte group count", width), errors) as usize;
    let mut seen: HashSet<u16> = HashSet::new();
    for _ in 0..count {
        let Some(id_bytes) = cursor.take(step) else {
            errors.push(format!("{}-byte group truncated", width));
            return;
        };
        let id = super::codec::be_unsigned(id_bytes) as u16;
        if !seen.insert(id) {
            errors.push(format!("duplicate I/O id {} in {}-byte group", id, width));
            return;
        }
        let Some(value_bytes) = cursor.take(width) else {
            errors.push(format!("I/O id {} value truncated in {}-byte group", id, width));
            return;
        };
        push_element(io_elements, id, decode_io_value(id, value_bytes));
    }
}

/// Decodes the Codec 8E variable-width group: a count followed by
/// (id, length, value) triples.
fn variable_io_group(cursor: &mut ByteCursor, io_elements: &mut Vec<IoElement>, errors: &mut Vec<String>) {
    let count = unsigned_or(cursor.take(2), 0, "variable group count", errors) as usize;
    let mut seen: HashSet<u16> = HashSet::new();
    for _ in 0..count {
        let Some(id_bytes) = cursor.take(2) else {
            errors.push(String::from("variable group truncated"));
            return;
        };
        let id = super::codec::be_unsigned(id_bytes) as u16;
        if !seen.insert(id) {
            errors.push(format!("duplicate I/O id {} in variable group", id));
            return;
        }
        let Some(length_bytes) = cursor.take(2) else {
            errors.push(format!("I/O id {} length truncated in variable group", id));
            return;
        };
        let length = super::codec::be_unsigned(length_bytes) as usize;
        let Some(value_bytes) = cursor.take(length) else {
            errors.push(format!("I/O id {} value truncated in variable group", id));
            return;
        };
        push_element(io_elements, id, decode_io_value(id, value_bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teltonika::IoValue;
    use crate::utils::str_to_bytes;

    #[test]
    fn test_parse_codec8_single_record() {
        let input = str_to_bytes(
            "000000000000003608010000016B40D8EA30010000000000000000000000000000000105021503010101425E0F01F10000601A014E0000000000000000010000C7CF",
        );
        let frame = parse_data_frame(&input).unwrap();

        assert_eq!(frame.codec, Codec::Codec8);
        assert_eq!(frame.records.len(), 1);
        assert!(frame.parse_errors.is_empty());
        assert_eq!(frame.crc16, 51151);

        let record = &frame.records[0];
        assert_eq!(record.timestamp.to_rfc3339(), "2019-06-10T10:04:46+00:00");
        assert_eq!(record.priority, 1);
        assert_eq!(record.latitude, 0.0);
        assert_eq!(record.longitude, 0.0);
        assert_eq!(record.event_id, 1);
        assert!(record.parse_errors.is_empty());
        assert_eq!(record.io_elements.len(), 5);
        assert_eq!(record.io(21), Some(&IoValue::Unsigned(3)));
        assert_eq!(record.io(1), Some(&IoValue::Unsigned(1)));
        assert_eq!(record.io(66), Some(&IoValue::Scaled { raw: 24079, places: 2 }));
        assert_eq!(record.io(241), Some(&IoValue::Scaled { raw: 24602, places: 1 }));
        assert_eq!(
            record.io(78),
            Some(&IoValue::Identifier(String::from("0000000000000000")))
        );
    }

    #[test]
    fn test_parse_codec8_two_records() {
        let input = str_to_bytes(
            "000000000000004308020000016B40D57B480100000000000000000000000000000001010101000000000000016B40D5C198010000000000000000000000000000000101010101000000020000252C",
        );
        let frame = parse_data_frame(&input).unwrap();

        assert_eq!(frame.records.len(), 2);
        assert!(frame.parse_errors.is_empty());
        assert_eq!(frame.records[0].io(1), Some(&IoValue::Unsigned(0)));
        assert_eq!(frame.records[1].io(1), Some(&IoValue::Unsigned(1)));
    }

    #[test]
    fn test_parse_codec8_extended() {
        let input = str_to_bytes(
            "000000000000004A8E010000016B412CEE000100000000000000000000000000000000010005000100010100010011001D00010010015E2C880002000B000000003544C87A000E000000001DD7E06A00000100002994",
        );
        let frame = parse_data_frame(&input).unwrap();

        assert_eq!(frame.codec, Codec::Codec8Ext);
        assert_eq!(frame.records.len(), 1);
        assert!(frame.parse_errors.is_empty());

        let record = &frame.records[0];
        assert_eq!(record.event_id, 1);
        assert_eq!(record.io_elements.len(), 5);
        assert_eq!(record.io(1), Some(&IoValue::Unsigned(1)));
        // Accelerometer ids decode as zero-extended signed 32-bit values
        assert_eq!(record.io(17), Some(&IoValue::Signed(29)));
        assert_eq!(record.io(16), Some(&IoValue::Unsigned(22_949_000)));
        assert_eq!(record.io(11), Some(&IoValue::Unsigned(893_700_218)));
        assert_eq!(record.io(14), Some(&IoValue::Unsigned(500_686_954)));
    }

    #[test]
    fn test_parse_rejects_missing_preamble() {
        let input = str_to_bytes(
            "3608010000016B40D8EA30010000000000000000000000000000000105021503010101425E0F01F10000601A014E0000000000000000010000C7CF",
        );
        assert_eq!(parse_data_frame(&input).unwrap_err(), MalformedFrame);
    }

    #[test]
    fn test_duplicate_io_id_skips_rest_of_group() {
        // One record, 1-byte group declares three elements but repeats id 21;
        // the duplicate annotates the record and the rest of the group is
        // dropped. The cursor then reads the next group counts from where the
        // group stopped.
        let body = concat!(
            "08",               // codec 8
            "01",               // one record
            "0000016B40D8EA30", // timestamp
            "00",               // priority
            "00000000",         // longitude
            "00000000",         // latitude
            "0000",             // altitude
            "0000",             // bearing
            "00",               // satellites
            "0000",             // speed
            "00",               // event id
            "03",               // total io count
            "03",               // 1-byte group count
            "1503",             // io 21 = 3
            "1504",             // duplicate io 21
            "F001",             // io 240 = 1, never reached
        );
        let data = str_to_bytes(body);
        let mut input = vec![0x00, 0x00, 0x00, 0x00];
        input.extend_from_slice(&(data.len() as u32).to_be_bytes());
        input.extend_from_slice(&data);
        input.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let frame = parse_data_frame(&input).unwrap();
        assert_eq!(frame.records.len(), 1);

        let record = &frame.records[0];
        assert_eq!(record.io_elements.len(), 1);
        assert_eq!(record.io(21), Some(&IoValue::Unsigned(3)));
        assert!(record
            .parse_errors
            .iter()
            .any(|error| error.contains("duplicate I/O id 21")));
    }

    #[test]
    fn test_truncated_record_keeps_earlier_records() {
        // Frame declares two records but carries only one; the second is
        // reported as a frame-level error and the first survives.
        let body = concat!(
            "08",
            "02",
            "0000016B40D8EA30",
            "00",
            "00000000",
            "00000000",
            "0000",
            "0000",
            "00",
            "0000",
            "00",
            "01",
            "01",
            "F001", // io 240 = 1
            "00",
            "00",
            "00",
        );
        let data = str_to_bytes(body);
        let mut input = vec![0x00, 0x00, 0x00, 0x00];
        input.extend_from_slice(&(data.len() as u32).to_be_bytes());
        input.extend_from_slice(&data);
        input.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let frame = parse_data_frame(&input).unwrap();
        assert_eq!(frame.records.len(), 1);
        assert_eq!(frame.records[0].io(240), Some(&IoValue::Unsigned(1)));
        assert!(!frame.parse_errors.is_empty());
    }
}
