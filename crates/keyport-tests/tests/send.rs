//! Value transfers through the send state machine against a mock node.

use std::time::Duration;

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::U256;

use keyport_core::{Amount, LocationRef, RawKey, WalletError, to_checksum};
use keyport_keystore::{KdfParams, KeyRecord};
use keyport_tests::helpers::test_config;
use keyport_tests::{Mining, MockNode};
use keyport_wallet::{AccountService, SendRequest, SigningPath, pending_hash};

const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

async fn funded_local(svc: &mut AccountService, node: &MockNode, ether: u64) -> keyport_core::Address {
    let address = svc.new_account("pw", &LocationRef::Local).await.unwrap();
    node.fund(&address, Amount::from_ether(ether));
    address
}

// ======================================================================
// Local signing
// ======================================================================

#[tokio::test]
async fn local_send_moves_exact_truncated_amount() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 5).await;

    let request = SendRequest::new(
        to_checksum(&from),
        RECIPIENT,
        "1.0000000000000000019",
        SigningPath::Local,
    );
    let receipt = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap();
    assert!(receipt.is_mined());
    assert!(receipt.succeeded());

    let to = keyport_core::parse_address(RECIPIENT).unwrap();
    assert_eq!(node.balance_of(&to), U256::from(1_000_000_000_000_000_001u128));
}

#[tokio::test]
async fn local_sends_use_the_pending_nonce() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 5).await;

    for _ in 0..3 {
        let request = SendRequest::new(to_checksum(&from), RECIPIENT, "0.1", SigningPath::Local);
        svc.send_value(&request, "pw", &node.endpoint()).await.unwrap();
    }
    assert_eq!(node.nonce_of(&from), 3);

    let nonces: Vec<u64> = node
        .raw_transactions()
        .iter()
        .map(|raw| {
            let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
            envelope.as_legacy().unwrap().tx().nonce
        })
        .collect();
    assert_eq!(nonces, vec![0, 1, 2]);
}

#[tokio::test]
async fn raw_transaction_carries_node_chain_id() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 1).await;

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "0.5", SigningPath::Local);
    svc.send_value(&request, "pw", &node.endpoint()).await.unwrap();

    let raw = node.raw_transactions().pop().unwrap();
    let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
    assert_eq!(envelope.as_legacy().unwrap().tx().chain_id, Some(node.chain_id()));
}

#[tokio::test]
async fn local_send_with_wrong_password_never_reaches_node() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 1).await;

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "0.5", SigningPath::Local);
    assert_eq!(
        svc.send_value(&request, "wrong", &node.endpoint()).await.unwrap_err(),
        WalletError::Auth
    );
    assert!(node.raw_transactions().is_empty());
}

#[tokio::test]
async fn insufficient_funds_is_node_error() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 1).await;

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "2", SigningPath::Local);
    let err = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap_err();
    assert!(matches!(err, WalletError::Node { code: -32010, .. }));
}

#[tokio::test]
async fn local_send_refuses_record_stored_under_another_address() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");

    let x = RawKey::generate().address().unwrap();
    let y_key = RawKey::generate();
    let y = y_key.address().unwrap();
    let mut y_record = KeyRecord::encrypt(&y_key, "pw", KdfParams::pbkdf2(2)).unwrap();
    y_record.address = None;

    let mut doc = serde_json::Map::new();
    doc.insert(to_checksum(&x), serde_json::to_value(&y_record).unwrap());
    std::fs::write(&path, serde_json::Value::Object(doc).to_string()).unwrap();

    let svc = AccountService::new(test_config(&path)).unwrap();
    node.fund(&x, Amount::from_ether(1));
    node.fund(&y, Amount::from_ether(1));

    let request = SendRequest::new(to_checksum(&x), RECIPIENT, "0.5", SigningPath::Local);
    let err = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap_err();
    assert!(matches!(err, WalletError::MalformedRecord(_)), "{err:?}");
    assert!(node.raw_transactions().is_empty());
    assert_eq!(node.balance_of(&y), Amount::from_ether(1).wei());
}

// ======================================================================
// Amount validation
// ======================================================================

#[tokio::test]
async fn zero_and_negative_amounts_rejected_before_network() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 1).await;

    for amount in ["0", "-1", "0.0000000000000000001"] {
        for path in [SigningPath::Local, SigningPath::Custodial] {
            let request = SendRequest::new(to_checksum(&from), RECIPIENT, amount, path);
            let err = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap_err();
            assert!(matches!(err, WalletError::InvalidAmount(_)), "{amount} {path:?}");
        }
    }
    assert_eq!(node.nonce_of(&from), 0);
}

// ======================================================================
// Custodial signing
// ======================================================================

#[tokio::test]
async fn custodial_send_is_signed_by_node() {
    let node = MockNode::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let remote = LocationRef::Remote(node.endpoint());

    let from = svc.new_account("node-pw", &remote).await.unwrap();
    node.fund(&from, Amount::from_ether(3));

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "1.5", SigningPath::Custodial);
    let receipt = svc.send_value(&request, "node-pw", &node.endpoint()).await.unwrap();
    assert!(receipt.is_mined());
    assert!(node.raw_transactions().is_empty());

    let to = keyport_core::parse_address(RECIPIENT).unwrap();
    assert_eq!(node.balance_of(&to), Amount::from_ether_str("1.5").unwrap().wei());

    let err = svc
        .send_value(&request, "bad", &node.endpoint())
        .await
        .unwrap_err();
    assert_eq!(err, WalletError::Auth);
}

// ======================================================================
// Timeout propagation
// ======================================================================

#[tokio::test]
async fn unmined_transaction_times_out_with_its_hash() {
    let node = MockNode::start().await;
    node.set_mining(Mining::Never);
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 1).await;

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "0.25", SigningPath::Local)
        .with_timeout(Duration::from_millis(200));
    let err = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap_err();

    let hash = pending_hash(&err).expect("timeout carries the submitted hash");
    let raw = node.raw_transactions().pop().unwrap();
    assert_eq!(hash, alloy::primitives::keccak256(&raw));
    assert_eq!(node.pending_count(), 1);
}

#[tokio::test]
async fn receipt_failure_after_broadcast_keeps_the_hash() {
    let node = MockNode::start().await;
    node.fail_receipts(true);
    let dir = tempfile::tempdir().unwrap();
    let mut svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();
    let from = funded_local(&mut svc, &node, 1).await;

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "0.25", SigningPath::Local);
    let err = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap_err();

    let raw = node.raw_transactions().pop().unwrap();
    let hash = alloy::primitives::keccak256(&raw);
    match &err {
        WalletError::Unconfirmed { tx_hash, reason } => {
            assert_eq!(*tx_hash, hash);
            assert!(reason.contains("receipt index unavailable"), "{reason}");
        }
        other => panic!("expected Unconfirmed, got {other:?}"),
    }
    assert_eq!(pending_hash(&err), Some(hash));
    assert_eq!(node.nonce_of(&from), 1);
}

#[tokio::test]
async fn custodial_receipt_failure_keeps_the_hash() {
    let node = MockNode::start().await;
    node.fail_receipts(true);
    let dir = tempfile::tempdir().unwrap();
    let svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();

    let from = node.add_account(&RawKey::generate(), "pw");
    node.fund(&from, Amount::from_ether(1));

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "0.25", SigningPath::Custodial);
    let err = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap_err();
    assert!(matches!(err, WalletError::Unconfirmed { .. }), "{err:?}");
    assert!(pending_hash(&err).is_some());
}

#[tokio::test]
async fn custodial_timeout_also_carries_hash() {
    let node = MockNode::start().await;
    node.set_mining(Mining::Never);
    let dir = tempfile::tempdir().unwrap();
    let svc = AccountService::new(test_config(&dir.path().join("keys.json"))).unwrap();

    let from = node.add_account(&RawKey::generate(), "pw");
    node.fund(&from, Amount::from_ether(1));

    let request = SendRequest::new(to_checksum(&from), RECIPIENT, "0.25", SigningPath::Custodial)
        .with_timeout(Duration::from_millis(200));
    let err = svc.send_value(&request, "pw", &node.endpoint()).await.unwrap_err();
    assert!(matches!(err, WalletError::Timeout { tx_hash: Some(_) }));
}
