use std::str::FromStr;

pub mod avl_frame_builder;
pub mod avl_record_builder;
pub mod imei;

/// Decodes a hex fixture string into bytes.
///
/// Intended for test fixtures and captured frames; panics on odd length or a
/// non-hex digit so a broken fixture fails loudly.
///
/// # Arguments
/// * `input` - The hex string to decode
///
/// # Returns
/// * `Vec<u8>` - The decoded bytes
pub fn str_to_bytes(input: &str) -> Vec<u8> {
    assert!(input.len() % 2 == 0, "hex input must have an even length");

    (0..input.len())
        .step_by(2)
        .map(|position| {
            u8::from_str_radix(&input[position..position + 2], 16).expect("invalid hex digit")
        })
        .collect()
}

/// Converts a byte slice to an uppercase hex string
///
/// # Arguments
/// * `input` - The bytes to convert
///
/// # Returns
/// * `String` - The hex string
pub fn bytes_to_hex(input: &[u8]) -> String {
    use std::fmt::Write;

    let mut hex = String::with_capacity(input.len() * 2);
    for byte in input {
        let _ = write!(hex, "{:02X}", byte);
    }

    return hex;
}

/// Reads environment variable and parses it to the desired type
///
/// Panics if the environment variable is not set
///
/// # Arguments
/// * `key` - The environment variable key
///
/// # Returns
/// * `T` - The parsed environment variable
pub fn read_env_variable<T: FromStr>(key: &str) -> T {
    match std::env::var(key) {
        Ok(value) => parse_env_variable(key, value),
        Err(_) => panic!("{} environment variable not set", key),
    }
}

/// Reads environment variable and parses it to the desired type wrapped in an Option
///
/// # Arguments
/// * `key` - The environment variable key
///
/// # Returns
/// * `Option<T>` - The parsed environment variable
pub fn read_optional_env_variable<T: FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(value) => Some(parse_env_variable(key, value)),
        Err(_) => None,
    }
}

/// Parses an environment variable to the desired type
///
/// Panics if the parsing fails
///
/// # Arguments
/// * `key` - The environment variable key
/// * `value` - The environment variable value
fn parse_env_variable<T: FromStr>(key: &str, value: String) -> T {
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => panic!("Failed to parse environment variable {}", key),
    }
}

/// Reads environment variable and parses it to the desired type with a default value
///
/// If the environment variable is not set, the default value is returned.
///
/// # Arguments
/// * `key` - The environment variable key
/// * `default_value` - The default value
///
/// # Returns
/// * `T` - The parsed environment variable or the default value
pub fn read_env_variable_with_default_value<T: FromStr>(key: &str, default_value: T) -> T {
    match read_optional_env_variable(key) {
        Some(value) => value,
        None => default_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_to_bytes() {
        assert_eq!(str_to_bytes("000F"), vec![0x00, 0x0F]);
        assert_eq!(str_to_bytes("8E01"), vec![0x8E, 0x01]);
    }

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(bytes_to_hex(&[0x00, 0x0F, 0x8E]), "000F8E");
    }

    #[test]
    fn test_hex_round_trip() {
        let hex = "000000000000003608010000016B40D8EA30";
        assert_eq!(bytes_to_hex(&str_to_bytes(hex)), hex);
    }

    #[test]
    fn test_read_env_variable_with_default_value() {
        assert_eq!(
            read_env_variable_with_default_value("SURELY_NOT_SET_ANYWHERE", 2000_u16),
            2000
        );
    }
}
