//! # keyport-keystore
//! Encrypted key records in the Web3 Secret Storage format and the
//! single-file keystore that holds them.

pub mod record;
pub mod store;

pub use record::{DEFAULT_PBKDF2_ROUNDS, KdfParams, KeyRecord};
pub use store::KeyStore;
