//! Value transfer requests.

use std::time::Duration;

use alloy::primitives::Address;

use crate::amount::Amount;

/// Gas limit for a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// What the caller wants sent. Optional fields are filled from the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub from: Address,
    pub to: Address,
    pub value: Amount,
    /// Wei per gas. Queried from the node when absent.
    pub gas_price: Option<Amount>,
    /// Defaults to [`TRANSFER_GAS_LIMIT`].
    pub gas_limit: Option<u64>,
    /// Queried from the node's pending count when absent.
    pub nonce: Option<u64>,
    /// Receipt wait bound. Falls back to the configured send timeout.
    pub timeout: Option<Duration>,
}

impl TransactionIntent {
    pub fn new(from: Address, to: Address, value: Amount) -> Self {
        Self {
            from,
            to,
            value,
            gas_price: None,
            gas_limit: None,
            nonce: None,
            timeout: None,
        }
    }

    pub fn with_gas_price(mut self, gas_price: Amount) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn gas_limit_or_default(&self) -> u64 {
        self.gas_limit.unwrap_or(TRANSFER_GAS_LIMIT)
    }
}
