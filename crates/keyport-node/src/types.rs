//! Wire types for the node's JSON-RPC API.

use alloy::primitives::{Address, B256, TxHash, U64, U256};
use serde::{Deserialize, Serialize};

use keyport_core::TransactionIntent;

/// Result of `parity_chainStatus`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatus {
    /// Missing block range while the node is still syncing.
    #[serde(default)]
    pub block_gap: Option<(U64, U64)>,
}

impl ChainStatus {
    /// True once the node reports no missing blocks.
    pub fn is_synced(&self) -> bool {
        self.block_gap.is_none()
    }

    /// The missing range as plain integers.
    pub fn gap(&self) -> Option<(u64, u64)> {
        self.block_gap.map(|(from, to)| (from.to::<u64>(), to.to::<u64>()))
    }
}

/// The subset of `eth_getTransactionReceipt` that Keyport reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    /// `0x1` success, `0x0` reverted. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U64>,
}

impl TransactionReceipt {
    pub fn is_mined(&self) -> bool {
        self.block_number.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|s| !s.is_zero())
    }
}

/// Transaction object for `personal_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U256>,
}

impl From<&TransactionIntent> for TransactionRequest {
    fn from(intent: &TransactionIntent) -> Self {
        Self {
            from: intent.from,
            to: intent.to,
            value: intent.value.wei(),
            gas: intent.gas_limit.map(U256::from),
            gas_price: intent.gas_price.map(|p| p.wei()),
            nonce: intent.nonce.map(U256::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyport_core::Amount;

    #[test]
    fn chain_status_synced_and_gap() {
        let synced: ChainStatus = serde_json::from_str(r#"{"blockGap":null}"#).unwrap();
        assert!(synced.is_synced());

        let syncing: ChainStatus =
            serde_json::from_str(r#"{"blockGap":["0x10","0x20"]}"#).unwrap();
        assert!(!syncing.is_synced());
        assert_eq!(syncing.gap(), Some((16, 32)));
    }

    #[test]
    fn receipt_parses_camel_case() {
        let json = r#"{
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "blockNumber": "0x5",
            "status": "0x1",
            "gasUsed": "0x5208",
            "logs": []
        }"#;
        let receipt: TransactionReceipt = serde_json::from_str(json).unwrap();
        assert!(receipt.is_mined());
        assert!(receipt.succeeded());
        assert_eq!(receipt.gas_used, Some(U256::from(21_000u64)));
    }

    #[test]
    fn reverted_receipt_is_not_success() {
        let json = r#"{
            "transactionHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "blockNumber": "0x9",
            "status": "0x0"
        }"#;
        let receipt: TransactionReceipt = serde_json::from_str(json).unwrap();
        assert!(!receipt.succeeded());
    }

    #[test]
    fn request_omits_unset_fields() {
        let intent = TransactionIntent::new(Address::ZERO, Address::repeat_byte(1), Amount::from_ether(1));
        let value = serde_json::to_value(TransactionRequest::from(&intent)).unwrap();
        assert_eq!(value["value"], "0xde0b6b3a7640000");
        assert!(value.get("gasPrice").is_none());
        assert!(value.get("nonce").is_none());
    }
}
