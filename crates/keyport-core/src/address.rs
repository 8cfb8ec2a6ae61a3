//! Account address parsing and checksum normalization.
//!
//! Addresses are 20-byte account identifiers. The canonical text form is the
//! EIP-55 mixed-case checksum encoding, which is what [`Address`]'s `Display`
//! produces. Every address is parsed into [`Address`] before it is stored or
//! compared, so two spellings of the same account always collide.

pub use alloy::primitives::Address;

use crate::error::WalletError;

/// Length of an address in hex characters, without the `0x` prefix.
const ADDRESS_HEX_LEN: usize = 40;

/// Parse an address in any letter case, with or without the `0x` prefix.
///
/// The checksum casing is not enforced on input; normalization happens by
/// formatting the parsed value back out with [`to_checksum`].
pub fn parse_address(s: &str) -> Result<Address, WalletError> {
    let trimmed = s.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex_part.len() != ADDRESS_HEX_LEN {
        return Err(WalletError::InvalidAddress(format!(
            "{s:?} must be {ADDRESS_HEX_LEN} hex characters"
        )));
    }

    let bytes =
        hex::decode(hex_part).map_err(|_| WalletError::InvalidAddress(format!("{s:?} is not hex")))?;
    Ok(Address::from_slice(&bytes))
}

/// Checksum-cased text form of an address (`0x` + EIP-55 hex).
pub fn to_checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// Re-encode an address string into checksum form.
pub fn normalize(s: &str) -> Result<String, WalletError> {
    parse_address(s).map(|a| to_checksum(&a))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development account.
    const LOWER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const CHECKSUM: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn lowercase_normalizes_to_checksum() {
        assert_eq!(normalize(LOWER).unwrap(), CHECKSUM);
    }

    #[test]
    fn missing_prefix_accepted() {
        let addr = parse_address(&LOWER[2..]).unwrap();
        assert_eq!(to_checksum(&addr), CHECKSUM);
    }

    #[test]
    fn uppercase_accepted() {
        let upper = format!("0x{}", LOWER[2..].to_uppercase());
        assert_eq!(normalize(&upper).unwrap(), CHECKSUM);
    }

    #[test]
    fn different_spellings_compare_equal() {
        assert_eq!(parse_address(LOWER).unwrap(), parse_address(CHECKSUM).unwrap());
    }

    #[test]
    fn display_is_checksum() {
        let addr = parse_address(LOWER).unwrap();
        assert_eq!(addr.to_string(), CHECKSUM);
    }

    #[test]
    fn wrong_length_rejected() {
        let err = parse_address("0x1234").unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress(_)));
    }

    #[test]
    fn non_hex_rejected() {
        let err = parse_address("0xzz9fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress(_)));
    }
}
