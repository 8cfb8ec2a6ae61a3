//! Web3 Secret Storage (version 3) key records.
//!
//! A record holds one AES-128-CTR encrypted private key plus everything
//! needed to re-derive the decryption key from a password:
//!
//! ```json
//! {
//!   "version": 3,
//!   "id": "uuid-v4",
//!   "address": "40 lowercase hex chars, no 0x",
//!   "crypto": {
//!     "cipher": "aes-128-ctr",
//!     "cipherparams": { "iv": "hex" },
//!     "ciphertext": "hex",
//!     "kdf": "pbkdf2" | "scrypt",
//!     "kdfparams": { ... },
//!     "mac": "hex keccak256(dk[16..32] || ciphertext)"
//!   }
//! }
//! ```
//!
//! Records exported by nodes often carry extra top-level fields (`name`,
//! `meta`); they are kept verbatim so a record survives a round trip through
//! the keystore unchanged.

use aes::Aes128;
use alloy::primitives::{Address, B256, keccak256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use keyport_core::{RawKey, WalletError, key::KEY_LEN, parse_address};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// PBKDF2 rounds for new records unless configured otherwise.
pub const DEFAULT_PBKDF2_ROUNDS: u32 = 262_144;

const VERSION: u32 = 3;
const CIPHER: &str = "aes-128-ctr";
const PRF: &str = "hmac-sha256";
const DKLEN: u32 = 32;
const MAX_DKLEN: u32 = 64;
const SALT_LEN: usize = 32;
const IV_LEN: usize = 16;

/// An encrypted private key in V3 keystore format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub version: u32,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub crypto: CryptoJson,
    /// Top-level fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoJson {
    pub cipher: String,
    pub cipherparams: CipherParams,
    pub ciphertext: String,
    pub kdf: String,
    pub kdfparams: KdfParams,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CipherParams {
    pub iv: String,
}

/// Key derivation parameters. Objects carrying `n`, `r` and `p` are scrypt;
/// anything else must be PBKDF2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KdfParams {
    Scrypt {
        dklen: u32,
        n: u64,
        r: u32,
        p: u32,
        salt: String,
    },
    Pbkdf2 {
        dklen: u32,
        c: u32,
        prf: String,
        salt: String,
    },
}

impl KdfParams {
    /// PBKDF2-HMAC-SHA256 with a fresh random salt.
    pub fn pbkdf2(rounds: u32) -> Self {
        Self::Pbkdf2 {
            dklen: DKLEN,
            c: rounds,
            prf: PRF.to_string(),
            salt: hex::encode(random_bytes::<SALT_LEN>()),
        }
    }

    /// Scrypt with `N = 2^log_n` and a fresh random salt.
    pub fn scrypt(log_n: u8, r: u32, p: u32) -> Self {
        Self::Scrypt {
            dklen: DKLEN,
            n: 1u64 << log_n,
            r,
            p,
            salt: hex::encode(random_bytes::<SALT_LEN>()),
        }
    }

    /// Value of the record's `kdf` field for these parameters.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Scrypt { .. } => "scrypt",
            Self::Pbkdf2 { .. } => "pbkdf2",
        }
    }

    fn derive(&self, password: &str) -> Result<Vec<u8>, WalletError> {
        let (dklen, salt) = match self {
            Self::Scrypt { dklen, salt, .. } | Self::Pbkdf2 { dklen, salt, .. } => (*dklen, salt),
        };
        if dklen < DKLEN {
            return Err(malformed(format!("dklen {dklen} is shorter than {DKLEN}")));
        }
        if dklen > MAX_DKLEN {
            return Err(malformed(format!("dklen {dklen} exceeds {MAX_DKLEN}")));
        }
        let salt = decode_hex("salt", salt)?;
        let mut derived = vec![0u8; dklen as usize];

        match self {
            Self::Pbkdf2 { c, prf, .. } => {
                if prf != PRF {
                    return Err(malformed(format!("unsupported prf {prf:?}")));
                }
                pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), &salt, *c, &mut derived);
            }
            Self::Scrypt { n, r, p, .. } => {
                if *n < 2 || !n.is_power_of_two() {
                    return Err(malformed(format!("scrypt n={n} is not a power of two")));
                }
                let log_n = n.trailing_zeros() as u8;
                let params = scrypt::Params::new(log_n, *r, *p, derived.len())
                    .map_err(|e| malformed(format!("scrypt params: {e}")))?;
                scrypt::scrypt(password.as_bytes(), &salt, &params, &mut derived)
                    .map_err(|e| malformed(format!("scrypt: {e}")))?;
            }
        }
        Ok(derived)
    }
}

impl KeyRecord {
    /// Encrypt `key` under `password`.
    pub fn encrypt(key: &RawKey, password: &str, kdf: KdfParams) -> Result<Self, WalletError> {
        let address = key.address()?;
        let iv = random_bytes::<IV_LEN>();

        let mut derived = kdf.derive(password)?;
        let mut ciphertext = key.as_bytes().to_vec();
        apply_cipher(&derived, &iv, &mut ciphertext)?;
        let mac = compute_mac(&derived, &ciphertext);
        derived.zeroize();

        Ok(Self {
            version: VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            address: Some(hex::encode(address.as_slice())),
            crypto: CryptoJson {
                cipher: CIPHER.to_string(),
                cipherparams: CipherParams { iv: hex::encode(iv) },
                ciphertext: hex::encode(&ciphertext),
                kdf: kdf.name().to_string(),
                kdfparams: kdf,
                mac: hex::encode(mac),
            },
            extra: serde_json::Map::new(),
        })
    }

    /// Parse a record from JSON text.
    pub fn from_json(text: &str) -> Result<Self, WalletError> {
        let value = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse a record from an already-decoded JSON value. Older tools write
    /// the `crypto` object as `Crypto`; both are accepted.
    pub fn from_value(mut value: serde_json::Value) -> Result<Self, WalletError> {
        if let Some(obj) = value.as_object_mut() {
            if !obj.contains_key("crypto") {
                if let Some(crypto) = obj.remove("Crypto") {
                    obj.insert("crypto".into(), crypto);
                }
            }
        }
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, WalletError> {
        serde_json::to_string(self).map_err(|e| malformed(e.to_string()))
    }

    /// The address the record claims to encrypt, if it names one.
    pub fn declared_address(&self) -> Result<Option<Address>, WalletError> {
        self.address
            .as_deref()
            .map(|a| parse_address(a).map_err(|e| malformed(e.to_string())))
            .transpose()
    }

    /// Decrypt the private key.
    ///
    /// A wrong password and tampered ciphertext both fail the MAC check and
    /// are reported as [`WalletError::Auth`].
    pub fn decrypt(&self, password: &str) -> Result<RawKey, WalletError> {
        if self.version != VERSION {
            return Err(malformed(format!("unsupported version {}", self.version)));
        }
        if self.crypto.cipher != CIPHER {
            return Err(malformed(format!("unsupported cipher {:?}", self.crypto.cipher)));
        }
        if self.crypto.kdf != self.crypto.kdfparams.name() {
            return Err(malformed(format!(
                "kdf {:?} does not match its parameters",
                self.crypto.kdf
            )));
        }

        let iv = decode_hex("iv", &self.crypto.cipherparams.iv)?;
        if iv.len() != IV_LEN {
            return Err(malformed(format!("iv must be {IV_LEN} bytes")));
        }
        let ciphertext = decode_hex("ciphertext", &self.crypto.ciphertext)?;
        if ciphertext.len() != KEY_LEN {
            return Err(malformed(format!("ciphertext must be {KEY_LEN} bytes")));
        }
        let expected_mac = decode_hex("mac", &self.crypto.mac)?;

        let mut derived = self.crypto.kdfparams.derive(password)?;
        if compute_mac(&derived, &ciphertext).as_slice() != expected_mac.as_slice() {
            derived.zeroize();
            return Err(WalletError::Auth);
        }

        let mut plaintext = [0u8; KEY_LEN];
        plaintext.copy_from_slice(&ciphertext);
        let applied = apply_cipher(&derived, &iv, &mut plaintext);
        derived.zeroize();
        applied?;

        let key = RawKey::from_bytes(plaintext);
        plaintext.zeroize();
        key
    }

    /// Decrypt and check the key against the declared address.
    pub fn unlock(&self, password: &str) -> Result<(RawKey, Address), WalletError> {
        let key = self.decrypt(password)?;
        let address = key.address()?;
        if let Some(declared) = self.declared_address()? {
            if declared != address {
                return Err(malformed(format!(
                    "record declares {declared} but its key controls {address}"
                )));
            }
        }
        Ok((key, address))
    }

    /// Re-encrypt under a new password, keeping `id` and any extra fields.
    pub fn reencrypt(&self, old: &str, new: &str, kdf: KdfParams) -> Result<Self, WalletError> {
        let (key, _) = self.unlock(old)?;
        let mut fresh = Self::encrypt(&key, new, kdf)?;
        if !self.id.is_empty() {
            fresh.id = self.id.clone();
        }
        fresh.extra = self.extra.clone();
        Ok(fresh)
    }
}

fn apply_cipher(derived: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), WalletError> {
    let mut cipher = Aes128Ctr::new_from_slices(&derived[..16], iv)
        .map_err(|e| malformed(format!("cipher init: {e}")))?;
    cipher.apply_keystream(buf);
    Ok(())
}

fn compute_mac(derived: &[u8], ciphertext: &[u8]) -> B256 {
    let mut input = Vec::with_capacity(16 + ciphertext.len());
    input.extend_from_slice(&derived[16..32]);
    input.extend_from_slice(ciphertext);
    keccak256(&input)
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, WalletError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|_| malformed(format!("{field} is not hex")))
}

fn malformed(msg: impl Into<String>) -> WalletError {
    WalletError::MalformedRecord(msg.into())
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}
