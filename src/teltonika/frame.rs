use nom::character::complete::anychar;
use nom::multi::length_count;
use nom::number::complete::be_u16;
use nom::IResult;

use super::codec::be_unsigned;
use super::Codec;

/// Upper bound for the data-length field of an AVL frame. Anything larger is
/// treated as garbage rather than buffered indefinitely.
const MAX_DATA_LENGTH: u64 = 65_535;
/// Longest plausible IMEI handshake payload.
const MAX_IMEI_LENGTH: u64 = 64;

/// Result of inspecting the bytes buffered so far on a connection.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// IMEI handshake: `u16` length followed by that many ASCII bytes.
    Imei(String),
    /// A complete Codec 8 / 8E data frame, preamble through CRC.
    Data(Vec<u8>),
    /// A consistent prefix of a frame whose remainder has not arrived yet.
    Incomplete,
    /// Bytes that cannot become either frame shape; the session is torn down.
    Malformed,
}

/// Parses an IMEI handshake payload: `u16` length and `length` ASCII bytes.
fn imei(input: &[u8]) -> IResult<&[u8], String> {
    let (input, chars) = length_count(be_u16, anychar)(input)?;
    Ok((input, chars.iter().collect()))
}

/// Classifies the buffered bytes into one inbound frame.
///
/// Returns the frame together with the number of bytes it consumed so the
/// connection can drain its buffer. TCP delivery is not frame aligned, so a
/// prefix that is still consistent with a handshake or a data frame yields
/// [`InboundFrame::Incomplete`] and consumes nothing.
///
/// A buffer whose leading `u16` equals the remaining byte count is an IMEI
/// handshake. Otherwise a zero preamble with a Codec 8 / 8E id at offset 8 is
/// a data frame. Anything else is malformed.
pub fn recognize(buffer: &[u8]) -> (InboundFrame, usize) {
    if buffer.len() < 2 {
        return (InboundFrame::Incomplete, 0);
    }

    let declared = be_unsigned(&buffer[0..2]);
    if declared as usize == buffer.len() - 2 {
        return match imei(buffer) {
            Ok((_, imei)) if imei.is_ascii() => (InboundFrame::Imei(imei), buffer.len()),
            _ => (InboundFrame::Malformed, 0),
        };
    }

    // A data frame opens with a four-byte zero preamble; an IMEI handshake
    // never does, its length field is non-zero.
    let preamble_plausible = buffer.iter().take(4).all(|byte| *byte == 0);
    if preamble_plausible {
        if buffer.len() < 9 {
            return (InboundFrame::Incomplete, 0);
        }
        if Codec::from_id(buffer[8]).is_none() {
            return (InboundFrame::Malformed, 0);
        }
        let data_length = be_unsigned(&buffer[4..8]);
        if data_length == 0 || data_length > MAX_DATA_LENGTH {
            return (InboundFrame::Malformed, 0);
        }
        let total = 8 + data_length as usize + 4;
        if buffer.len() < total {
            return (InboundFrame::Incomplete, 0);
        }
        return (InboundFrame::Data(buffer[..total].to_vec()), total);
    }

    // Possibly a handshake whose tail has not arrived yet.
    if declared > 0 && declared <= MAX_IMEI_LENGTH && (declared as usize) > buffer.len() - 2 {
        return (InboundFrame::Incomplete, 0);
    }

    (InboundFrame::Malformed, 0)
}
