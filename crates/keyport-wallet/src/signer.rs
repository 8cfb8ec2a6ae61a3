//! Local (non-custodial) transaction signing.
//!
//! Transfers are legacy transactions with EIP-155 replay protection. The
//! chain id always comes from the node being sent to; the nonce comes from
//! the node's pending transaction count unless the caller pinned one.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy::signers::SignerSync;
use tracing::debug;

use keyport_core::{RawKey, TransactionIntent, WalletError};
use keyport_node::NodeClient;

/// Every field of a transfer, ready to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransfer {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
}

impl UnsignedTransfer {
    /// Fill the fields the intent leaves open by asking the node.
    pub async fn resolve(node: &NodeClient, intent: &TransactionIntent) -> Result<Self, WalletError> {
        let chain_id = node.chain_id().await?;
        let nonce = match intent.nonce {
            Some(nonce) => nonce,
            None => node.pending_nonce(&intent.from).await?,
        };
        let gas_price = match intent.gas_price {
            Some(price) => price,
            None => node.gas_price().await?,
        };
        let gas_price = u128::try_from(gas_price.wei())
            .map_err(|_| WalletError::InvalidAmount(format!("gas price {gas_price} is too large")))?;

        debug!(chain_id, nonce, gas_price, from = %intent.from, "transfer resolved");
        Ok(Self {
            chain_id,
            nonce,
            gas_price,
            gas_limit: intent.gas_limit_or_default(),
            to: intent.to,
            value: intent.value.wei(),
        })
    }

    fn to_legacy(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: TxKind::Call(self.to),
            value: self.value,
            input: Bytes::new(),
        }
    }
}

/// Raw bytes ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: TxHash,
    pub nonce: u64,
}

/// Sign `transfer` with `key`. Signing is deterministic (RFC 6979), so the
/// same key and fields always give the same bytes.
pub fn sign_transfer(key: &RawKey, transfer: &UnsignedTransfer) -> Result<SignedTransaction, WalletError> {
    let signer = key.signer()?;
    let tx = transfer.to_legacy();
    let signature = signer
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| WalletError::Signing(e.to_string()))?;

    let envelope = TxEnvelope::from(tx.into_signed(signature));
    let hash = *envelope.tx_hash();
    Ok(SignedTransaction {
        raw: Bytes::from(envelope.encoded_2718()),
        hash,
        nonce: transfer.nonce,
    })
}
