use chrono::{DateTime, TimeZone, Utc};

/// Decode primitives for the fixed-width fields of AVL frames.
///
/// Every function in this module is total: missing or malformed input produces
/// the caller's default and an annotation in the enclosing record's
/// `parse_errors` list instead of aborting the packet.

/// Sequential reader over a frame body.
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteCursor { bytes, position: 0 }
    }

    /// Takes the next `count` bytes, or `None` without advancing when the
    /// input is exhausted. Leaving the cursor in place on a short read is what
    /// lets the parser skip the remainder of a damaged I/O group and resume at
    /// the next group count.
    pub fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        if self.position + count > self.bytes.len() {
            return None;
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Some(slice)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }
}

/// Decodes an unsigned big-endian integer of up to eight bytes.
pub fn be_unsigned(bytes: &[u8]) -> u64 {
    let mut value: u64 = 0;
    for byte in bytes.iter().take(8) {
        value = (value << 8) | u64::from(*byte);
    }

    return value;
}

/// Decodes an unsigned big-endian integer, or the given default when the
/// input is missing.
pub fn unsigned_or(bytes: Option<&[u8]>, default: u64, field: &str, errors: &mut Vec<String>) -> u64 {
    match bytes {
        Some(bytes) => be_unsigned(bytes),
        None => {
            errors.push(format!("{} truncated", field));
            default
        }
    }
}

/// Decodes a four-byte two's-complement coordinate scaled by 1e-7 into
/// decimal degrees.
pub fn coordinate(bytes: &[u8]) -> f64 {
    if bytes.len() != 4 {
        return 0.0;
    }
    let raw = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    return raw as f64 / 10_000_000.0;
}

/// Decodes a coordinate, or the given default when the input is missing.
pub fn coordinate_or(bytes: Option<&[u8]>, default: f64, field: &str, errors: &mut Vec<String>) -> f64 {
    match bytes {
        Some(bytes) => coordinate(bytes),
        None => {
            errors.push(format!("{} truncated", field));
            default
        }
    }
}

/// Decodes a signed 32-bit value used by the accelerometer axes.
///
/// Values carried in narrower groups are zero-extended to four bytes before
/// the two's-complement read, matching the device's own encoding.
pub fn signed_32(bytes: &[u8]) -> i32 {
    let mut padded = [0u8; 4];
    let source = if bytes.len() > 4 { &bytes[bytes.len() - 4..] } else { bytes };
    padded[4 - source.len()..].copy_from_slice(source);

    return i32::from_be_bytes(padded);
}

/// Decodes an eight-byte millisecond epoch timestamp.
///
/// Out-of-range values fall back to the epoch with an error annotation; the
/// payload builder substitutes "now" for such timestamps later.
pub fn device_timestamp(bytes: Option<&[u8]>, errors: &mut Vec<String>) -> DateTime<Utc> {
    let Some(bytes) = bytes else {
        errors.push(String::from("timestamp truncated"));
        return Utc.timestamp_millis_opt(0).unwrap();
    };
    let millis = be_unsigned(bytes) as i64;
    match Utc.timestamp_millis_opt(millis).single() {
        Some(timestamp) => timestamp,
        None => {
            errors.push(format!("timestamp out of range: {}", millis));
            Utc.timestamp_millis_opt(0).unwrap()
        }
    }
}
