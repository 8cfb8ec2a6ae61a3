//! # keyport-node
//! Clients for the two remote collaborators: a Parity-style JSON-RPC node
//! and an HTTP faucet.

pub mod client;
pub mod faucet;
pub mod types;

pub use client::NodeClient;
pub use faucet::FaucetClient;
pub use types::{ChainStatus, TransactionReceipt, TransactionRequest};
