//! The send-value state machine.
//!
//! ```text
//! BuildIntent -> ResolveSigningPath -> SignLocal | DelegateRemote
//!             -> Submit -> AwaitReceipt -> Confirmed | TimedOut
//! ```
//!
//! Each call runs the machine from the start; nothing carries over between
//! sends. Input validation happens in `BuildIntent`, before any request
//! reaches the node.

use std::fmt;
use std::time::Duration;

use alloy::primitives::TxHash;
use tracing::{debug, info, warn};

use keyport_core::{Amount, TransactionIntent, WalletError, parse_address};
use keyport_keystore::KeyStore;
use keyport_node::{NodeClient, TransactionReceipt};

use crate::signer::{UnsignedTransfer, sign_transfer};

/// Who signs the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningPath {
    /// Decrypt the key from the local keystore and sign in-process.
    Local,
    /// Let the node sign with the key it custodies.
    Custodial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    BuildIntent,
    ResolveSigningPath,
    SignLocal,
    DelegateRemote,
    Submit,
    AwaitReceipt,
    Confirmed,
    TimedOut,
}

impl fmt::Display for SendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BuildIntent => "build_intent",
            Self::ResolveSigningPath => "resolve_signing_path",
            Self::SignLocal => "sign_local",
            Self::DelegateRemote => "delegate_remote",
            Self::Submit => "submit",
            Self::AwaitReceipt => "await_receipt",
            Self::Confirmed => "confirmed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// A value transfer as the caller describes it, in text form.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    /// Decimal ether.
    pub amount: String,
    pub path: SigningPath,
    pub timeout: Option<Duration>,
    pub gas_price: Option<Amount>,
    pub gas_limit: Option<u64>,
    pub nonce: Option<u64>,
}

impl SendRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: impl Into<String>, path: SigningPath) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount: amount.into(),
            path,
            timeout: None,
            gas_price: None,
            gas_limit: None,
            nonce: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Normalize addresses and scale the amount. Zero and negative amounts
    /// are rejected here.
    pub fn build_intent(&self) -> Result<TransactionIntent, WalletError> {
        let from = parse_address(&self.from)?;
        let to = parse_address(&self.to)?;
        let value = Amount::from_ether_str(&self.amount)?.ensure_positive()?;

        let mut intent = TransactionIntent::new(from, to, value);
        intent.gas_price = self.gas_price;
        intent.gas_limit = self.gas_limit;
        intent.nonce = self.nonce;
        intent.timeout = self.timeout;
        Ok(intent)
    }
}

/// Tracks the current stage for log output.
struct Machine {
    stage: SendStage,
}

impl Machine {
    fn start() -> Self {
        debug!(stage = %SendStage::BuildIntent, "send");
        Self {
            stage: SendStage::BuildIntent,
        }
    }

    fn advance(&mut self, next: SendStage) {
        debug!(from = %self.stage, to = %next, "send stage");
        self.stage = next;
    }
}

/// Timing knobs for one send.
#[derive(Debug, Clone, Copy)]
pub struct SendTiming {
    pub default_timeout: Duration,
    pub poll_interval: Duration,
}

/// Run one send to completion.
pub async fn send_value(
    keystore: &KeyStore,
    node: &NodeClient,
    request: &SendRequest,
    password: &str,
    timing: SendTiming,
) -> Result<TransactionReceipt, WalletError> {
    let mut machine = Machine::start();
    let intent = request.build_intent()?;

    machine.advance(SendStage::ResolveSigningPath);
    let tx_hash = match request.path {
        SigningPath::Local => {
            let record = keystore
                .get(&intent.from)
                .ok_or(WalletError::NotFound(intent.from))?;

            machine.advance(SendStage::SignLocal);
            let (key, controls) = record.unlock(password)?;
            if controls != intent.from {
                return Err(WalletError::MalformedRecord(format!(
                    "record stored for {} holds the key for {controls}",
                    intent.from
                )));
            }
            let transfer = UnsignedTransfer::resolve(node, &intent).await?;
            let signed = sign_transfer(&key, &transfer)?;
            drop(key);

            machine.advance(SendStage::Submit);
            let hash = node.send_raw_transaction(&signed.raw).await?;
            if hash != signed.hash {
                warn!(local = %signed.hash, node = %hash, "node reported a different transaction hash");
            }
            hash
        }
        SigningPath::Custodial => {
            machine.advance(SendStage::DelegateRemote);
            let hash = node.send_custodial_transaction(&intent, password).await?;
            machine.advance(SendStage::Submit);
            hash
        }
    };

    machine.advance(SendStage::AwaitReceipt);
    let timeout = intent.timeout.unwrap_or(timing.default_timeout);
    match node
        .wait_for_receipt(&tx_hash, timeout, timing.poll_interval)
        .await
    {
        Ok(receipt) => {
            machine.advance(SendStage::Confirmed);
            info!(
                tx_hash = %tx_hash,
                from = %intent.from,
                to = %intent.to,
                value = %intent.value,
                "transfer confirmed"
            );
            Ok(receipt)
        }
        Err(e @ WalletError::Timeout { .. }) => {
            machine.advance(SendStage::TimedOut);
            Err(e)
        }
        Err(e) => {
            warn!(tx_hash = %tx_hash, error = %e, "lost track of submitted transaction");
            Err(WalletError::Unconfirmed {
                tx_hash,
                reason: e.to_string(),
            })
        }
    }
}

/// The hash a send left behind when it failed after submission, if any.
pub fn pending_hash(err: &WalletError) -> Option<TxHash> {
    match err {
        WalletError::Timeout { tx_hash } => *tx_hash,
        WalletError::Unconfirmed { tx_hash, .. } => Some(*tx_hash),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyport_core::Endpoint;

    const A: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const B: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    #[test]
    fn intent_truncates_amount() {
        let intent = SendRequest::new(A, B, "1.000000000000000001", SigningPath::Local)
            .build_intent()
            .unwrap();
        assert_eq!(intent.value.wei().to::<u128>(), 1_000_000_000_000_000_001);
        assert_eq!(intent.from.to_string(), "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    }

    #[test]
    fn zero_and_negative_rejected() {
        for amount in ["0", "0.0", "-1"] {
            let err = SendRequest::new(A, B, amount, SigningPath::Custodial)
                .build_intent()
                .unwrap_err();
            assert!(matches!(err, WalletError::InvalidAmount(_)), "{amount}");
        }
    }

    #[test]
    fn bad_address_rejected() {
        let err = SendRequest::new("0x1234", B, "1", SigningPath::Local)
            .build_intent()
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn invalid_amount_fails_before_network() {
        // Nothing listens on port 9; reaching the node would be a transport error.
        let dir = tempfile::tempdir().unwrap();
        let keystore = KeyStore::open(dir.path().join("keys.json")).unwrap();
        let node = NodeClient::new(&Endpoint::new("http://127.0.0.1:9"), Duration::from_secs(1)).unwrap();
        let timing = SendTiming {
            default_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        };

        let request = SendRequest::new(A, B, "0", SigningPath::Local);
        let err = send_value(&keystore, &node, &request, "pw", timing).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn local_send_without_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let keystore = KeyStore::open(dir.path().join("keys.json")).unwrap();
        let node = NodeClient::new(&Endpoint::new("http://127.0.0.1:9"), Duration::from_secs(1)).unwrap();
        let timing = SendTiming {
            default_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        };

        let request = SendRequest::new(A, B, "1", SigningPath::Local);
        let err = send_value(&keystore, &node, &request, "pw", timing).await.unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
    }

    #[test]
    fn pending_hash_only_after_submission() {
        let hash = TxHash::repeat_byte(1);
        assert_eq!(pending_hash(&WalletError::Timeout { tx_hash: Some(hash) }), Some(hash));
        assert_eq!(
            pending_hash(&WalletError::Unconfirmed {
                tx_hash: hash,
                reason: "gone".into()
            }),
            Some(hash)
        );
        assert_eq!(pending_hash(&WalletError::Auth), None);
    }
}
