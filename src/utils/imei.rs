#![allow(dead_code)]
//! Utility functions for building IMEI handshake packets in tests.

use rand::Rng;

/// Builds a valid IMEI handshake packet from the given IMEI.
///
/// The first two bytes carry the length of the IMEI and the rest is the IMEI
/// itself as ASCII.
pub fn build_valid_imei_packet(imei: &str) -> Vec<u8> {
    let mut packet = (imei.len() as u16).to_be_bytes().to_vec();
    packet.extend_from_slice(imei.as_bytes());

    return packet;
}

/// Builds an invalid IMEI packet: the same ASCII bytes without the length
/// prefix, so the length check can never match.
pub fn build_invalid_imei_packet(imei: &str) -> Vec<u8> {
    return imei.as_bytes().to_vec();
}

/// Generates a random IMEI with a valid Luhn check digit.
pub fn get_random_imei() -> String {
    let mut rng = rand::thread_rng();
    let mut imei: Vec<u8> = (0..14).map(|_| rng.gen_range(0..=9)).collect();

    // Checksum over the first 14 digits
    let mut checksum = 0;
    for (i, &digit) in imei.iter().rev().enumerate() {
        if i % 2 == 0 {
            let double = digit * 2;
            checksum += if double > 9 { double - 9 } else { double };
        } else {
            checksum += digit;
        }
    }

    let final_digit = (10 - (checksum % 10)) % 10;
    imei.push(final_digit);

    imei.iter().map(|digit| digit.to_string()).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teltonika::frame::{recognize, InboundFrame};

    #[test]
    fn test_random_imei_is_valid() {
        for _ in 0..10 {
            let generated = get_random_imei();
            assert_eq!(generated.len(), 15);
            assert!(imei::valid(&generated));
        }
    }

    #[test]
    fn test_valid_packet_is_recognized() {
        let generated = get_random_imei();
        let packet = build_valid_imei_packet(&generated);
        let (frame, _) = recognize(&packet);
        assert_eq!(frame, InboundFrame::Imei(generated));
    }

    #[test]
    fn test_invalid_packet_is_not_an_imei() {
        let packet = build_invalid_imei_packet("531360808494930");
        let (frame, _) = recognize(&packet);
        assert_ne!(frame, InboundFrame::Imei(String::from("531360808494930")));
    }
}
