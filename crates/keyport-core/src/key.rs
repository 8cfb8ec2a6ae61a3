//! Raw secp256k1 private keys.
//!
//! A [`RawKey`] only exists in memory for the span of one operation: it is
//! decrypted from a key record, used, and dropped. Its bytes are zeroized on
//! drop and never appear in `Debug` output.

use std::fmt;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::WalletError;

/// Length of a private key in bytes.
pub const KEY_LEN: usize = 32;

/// A 32-byte secp256k1 secret key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RawKey {
    bytes: [u8; KEY_LEN],
}

impl RawKey {
    /// Generate a fresh key from the OS random number generator.
    pub fn generate() -> Self {
        let signer = PrivateKeySigner::random();
        Self {
            bytes: signer.to_bytes().0,
        }
    }

    /// Wrap raw bytes, rejecting values that are not valid secp256k1 scalars.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Result<Self, WalletError> {
        PrivateKeySigner::from_slice(&bytes)
            .map_err(|_| WalletError::MalformedRecord("private key is out of range".into()))?;
        Ok(Self { bytes })
    }

    /// Parse a 64-character hex key, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        let trimmed = s.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut decoded = hex::decode(hex_part)
            .map_err(|_| WalletError::MalformedRecord("private key is not hex".into()))?;
        if decoded.len() != KEY_LEN {
            decoded.zeroize();
            return Err(WalletError::MalformedRecord(format!(
                "private key must be {KEY_LEN} bytes"
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Self::from_bytes(bytes)
    }

    /// The key as lowercase hex without a prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Raw bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Build a signer for this key.
    pub fn signer(&self) -> Result<PrivateKeySigner, WalletError> {
        PrivateKeySigner::from_slice(&self.bytes)
            .map_err(|e| WalletError::Signing(e.to_string()))
    }

    /// The account address controlled by this key.
    pub fn address(&self) -> Result<Address, WalletError> {
        Ok(self.signer()?.address())
    }
}

impl PartialEq for RawKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for RawKey {}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key and its address.
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn known_key_derives_known_address() {
        let key = RawKey::from_hex(DEV_KEY).unwrap();
        assert_eq!(key.address().unwrap().to_string(), DEV_ADDRESS);
    }

    #[test]
    fn hex_prefix_optional() {
        let a = RawKey::from_hex(DEV_KEY).unwrap();
        let b = RawKey::from_hex(&format!("0x{DEV_KEY}")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), DEV_KEY);
    }

    #[test]
    fn generated_keys_differ() {
        assert_ne!(RawKey::generate(), RawKey::generate());
    }

    #[test]
    fn zero_key_rejected() {
        assert!(RawKey::from_bytes([0u8; KEY_LEN]).is_err());
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(matches!(
            RawKey::from_hex("abcd"),
            Err(WalletError::MalformedRecord(_))
        ));
    }

    #[test]
    fn debug_is_redacted() {
        let key = RawKey::from_hex(DEV_KEY).unwrap();
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains(&DEV_KEY[..16]));
    }
}
