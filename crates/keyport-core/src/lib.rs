//! # keyport-core
//! Shared types for Keyport: addresses, amounts, raw keys, account
//! locations, configuration and the error taxonomy.

pub mod address;
pub mod amount;
pub mod config;
pub mod error;
pub mod intent;
pub mod key;
pub mod location;

pub use address::{Address, normalize, parse_address, to_checksum};
pub use amount::Amount;
pub use config::{NetworkRegistry, NetworkSpec, RetryPolicy, WalletConfig};
pub use error::{Result, WalletError};
pub use intent::TransactionIntent;
pub use key::RawKey;
pub use location::{Endpoint, LocationRef};
