//! Error types shared by every Keyport crate.

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

/// Errors that can occur in account, keystore, node and faucet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The password could not decrypt the key, or the node rejected it.
    #[error("authentication failed: wrong password or corrupt key material")]
    Auth,

    /// The address is unknown to the backend that was asked.
    #[error("unknown address: {0}")]
    NotFound(Address),

    /// A key record could not be parsed or has an unsupported shape.
    #[error("malformed key record: {0}")]
    MalformedRecord(String),

    /// An amount was zero, negative or not a decimal number.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The keystore file exists but could not be read as a keystore.
    #[error("corrupt keystore: {0}")]
    CorruptStore(String),

    /// The node answered with a JSON-RPC error object.
    #[error("node error {code}: {message}")]
    Node {
        /// JSON-RPC error code.
        code: i32,
        /// Error message reported by the node.
        message: String,
    },

    /// The faucet answered with anything other than HTTP 200.
    #[error("faucet returned status {status}: {body}")]
    Faucet {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// A bounded wait ran out. Carries the transaction hash when one was
    /// submitted, so the caller can check for it later.
    #[error("timed out waiting{}", timeout_suffix(.tx_hash))]
    Timeout {
        /// Hash of the submitted transaction, if any.
        tx_hash: Option<TxHash>,
    },

    /// A transaction was broadcast but watching for its receipt failed. The
    /// transaction may still confirm.
    #[error("transaction {tx_hash} was submitted but its receipt is unknown: {reason}")]
    Unconfirmed {
        /// Hash of the submitted transaction.
        tx_hash: TxHash,
        /// What went wrong while polling.
        reason: String,
    },

    /// The node did not list an account it claimed to have created.
    #[error("remote account error: {0}")]
    RemoteAccount(String),

    /// A string could not be parsed as a 20-byte hex address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The endpoint was unreachable or returned an undecodable response.
    #[error("transport: {0}")]
    Transport(String),

    /// Local file I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Building or signing a transaction failed.
    #[error("signing: {0}")]
    Signing(String),

    /// The node is still syncing (`blockGap` is set).
    #[error("node is not yet in sync (block gap {from}..{to})")]
    NotSynced {
        /// First missing block.
        from: u64,
        /// Last missing block.
        to: u64,
    },

    /// The network has neither a faucet URL nor a faucet account.
    #[error("network {0} does not have a faucet")]
    NoFaucet(String),

    /// Configuration could not be loaded or a network name did not resolve.
    #[error("config: {0}")]
    Config(String),
}

impl From<std::io::Error> for WalletError {
    fn from(e: std::io::Error) -> Self {
        WalletError::Io(e.to_string())
    }
}

fn timeout_suffix(tx_hash: &Option<TxHash>) -> String {
    match tx_hash {
        Some(hash) => format!(" for transaction {hash}"),
        None => String::new(),
    }
}

/// Result alias used throughout Keyport.
pub type Result<T, E = WalletError> = std::result::Result<T, E>;
