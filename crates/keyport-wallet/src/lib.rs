//! # keyport-wallet
//! One address-keyed account API over a local encrypted keystore and a
//! remote node's account registry, including the local signing path and
//! faucet funding.

pub mod funding;
pub mod send;
pub mod service;
pub mod signer;

pub use funding::{backoff_delay, wait_for_balance};
pub use send::{SendRequest, SendStage, SendTiming, SigningPath, pending_hash, send_value};
pub use service::AccountService;
pub use signer::{SignedTransaction, UnsignedTransfer, sign_transfer};
