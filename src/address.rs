//! Instruction-address and debug-identifier string handling.

use crate::error::Error;

/// Parse a hex address with or without a `0x` prefix into a `u64`.
pub fn parse_address(value: &str) -> Result<u64, Error> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::MalformedAddress(value.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| Error::MalformedAddress(value.to_string()))
}

/// Breakpad identifiers are 33 characters: the module UUID without dashes,
/// uppercased, followed by the age digit (`0` for Mach-O images).
pub fn breakpad_uuid(raw: &str) -> String {
    const LEN: usize = 33;
    let mut ident = raw.replace('-', "").to_uppercase();
    while ident.len() < LEN {
        ident.push('0');
    }
    ident
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_prefix_and_case() {
        let expected = 0xabc;
        assert_eq!(parse_address("0xABC").unwrap(), expected);
        assert_eq!(parse_address("abc").unwrap(), expected);
        assert_eq!(parse_address("ABC").unwrap(), expected);
        assert_eq!(parse_address("0xabc").unwrap(), expected);
    }

    #[test]
    fn address_rejects_non_hex() {
        for bad in ["", "0x", "zfff", "12 34", "+1f", "-1f", "0x12g4"] {
            match parse_address(bad) {
                Err(Error::MalformedAddress(s)) => assert_eq!(s, bad),
                other => panic!("expected malformed address for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn address_full_width() {
        assert_eq!(
            parse_address("0xffffffffffffffff").unwrap(),
            u64::MAX,
        );
        assert!(parse_address("0x10000000000000000").is_err());
    }

    #[test]
    fn uuid_from_dashed_ident() {
        assert_eq!(
            breakpad_uuid("D54FE0E8-24AB-4893-859C-F26797170CC2"),
            "D54FE0E824AB4893859CF26797170CC20"
        );
    }

    #[test]
    fn uuid_from_bare_ident() {
        assert_eq!(
            breakpad_uuid("cf4d75d8804d775084d363a5cbbf7702"),
            "CF4D75D8804D775084D363A5CBBF77020"
        );
    }

    #[test]
    fn uuid_shape() {
        for raw in [
            "8BC87704-1B47-6F0C-70DE-17F7A99A1E45",
            "26A6C8D5-C994-73CA-195E-55656E111C97",
            "cf4d75d8804d775084d363a5cbbf7702",
        ] {
            let uuid = breakpad_uuid(raw);
            assert_eq!(uuid.len(), 33);
            assert!(!uuid.contains('-'));
            assert_eq!(uuid, uuid.to_uppercase());
        }
    }
}
