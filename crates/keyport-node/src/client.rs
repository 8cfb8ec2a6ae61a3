//! JSON-RPC client for a Parity-compatible node.
//!
//! Every method is one request/response round trip bounded by the client's
//! request timeout. Nothing is retried here; retry policy belongs to callers.
//! The client holds no account state and can be cloned and shared freely.

use std::time::Duration;

use alloy::primitives::{Address, TxHash, U64, U256};
use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use keyport_core::{Amount, Endpoint, RawKey, TransactionIntent, WalletError};

use crate::types::{ChainStatus, TransactionReceipt, TransactionRequest};

macro_rules! params {
    ($($p:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut params = ArrayParams::new();
        $(
            params
                .insert($p)
                .map_err(|e| WalletError::Transport(format!("encoding params: {e}")))?;
        )*
        params
    }};
}

/// Client for one node endpoint.
#[derive(Debug, Clone)]
pub struct NodeClient {
    endpoint: Endpoint,
    client: HttpClient,
}

impl NodeClient {
    /// Build a client; no request is sent until the first call.
    pub fn new(endpoint: &Endpoint, request_timeout: Duration) -> Result<Self, WalletError> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(endpoint.as_str())
            .map_err(|e| WalletError::Transport(format!("{endpoint}: {e}")))?;
        Ok(Self {
            endpoint: endpoint.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: ArrayParams,
    ) -> Result<R, WalletError> {
        debug!(endpoint = %self.endpoint, method, "rpc request");
        self.client
            .request(method, params)
            .await
            .map_err(|e| map_client_error(method, e))
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Ask the node to create and custody a new key.
    ///
    /// The node's account list is checked afterwards; an address it does not
    /// list is reported as [`WalletError::RemoteAccount`].
    pub async fn create_account(&self, password: &str) -> Result<Address, WalletError> {
        let address: Address = self.call("personal_newAccount", params![password]).await?;
        if !self.list_accounts().await?.contains(&address) {
            return Err(WalletError::RemoteAccount(format!(
                "node created {address} but does not list it"
            )));
        }
        info!(endpoint = %self.endpoint, %address, "remote account created");
        Ok(address)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.call("personal_listAccounts", params![]).await
    }

    async fn ensure_listed(&self, address: &Address) -> Result<(), WalletError> {
        if self.list_accounts().await?.contains(address) {
            Ok(())
        } else {
            Err(WalletError::NotFound(*address))
        }
    }

    /// Export the node's key record for `address` as JSON.
    pub async fn export_account(
        &self,
        address: &Address,
        password: &str,
    ) -> Result<serde_json::Value, WalletError> {
        self.ensure_listed(address).await?;
        self.call("parity_exportAccount", params![address, password])
            .await
            .map_err(password_error)
    }

    /// Hand a key record to the node. Returns the address the node stored.
    pub async fn import_account(
        &self,
        record_json: &str,
        password: &str,
    ) -> Result<Address, WalletError> {
        let address: Address = self
            .call("parity_newAccountFromWallet", params![record_json, password])
            .await
            .map_err(password_error)?;
        info!(endpoint = %self.endpoint, %address, "remote account imported");
        Ok(address)
    }

    /// Hand a raw private key to the node.
    pub async fn import_secret(&self, key: &RawKey, password: &str) -> Result<Address, WalletError> {
        let secret = format!("0x{}", key.to_hex());
        let address: Address = self
            .call("parity_newAccountFromSecret", params![secret, password])
            .await?;
        info!(endpoint = %self.endpoint, %address, "remote secret imported");
        Ok(address)
    }

    pub async fn delete_account(&self, address: &Address, password: &str) -> Result<(), WalletError> {
        self.ensure_listed(address).await?;
        let killed: bool = self
            .call("parity_killAccount", params![address, password])
            .await
            .map_err(password_error)?;
        if !killed {
            return Err(WalletError::Auth);
        }
        info!(endpoint = %self.endpoint, %address, "remote account deleted");
        Ok(())
    }

    pub async fn change_password(
        &self,
        address: &Address,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), WalletError> {
        self.ensure_listed(address).await?;
        let changed: bool = self
            .call(
                "parity_changePassword",
                params![address, old_password, new_password],
            )
            .await
            .map_err(password_error)?;
        if !changed {
            return Err(WalletError::Auth);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chain state
    // ------------------------------------------------------------------

    pub async fn balance(&self, address: &Address) -> Result<Amount, WalletError> {
        let wei: U256 = self.call("eth_getBalance", params![address, "latest"]).await?;
        Ok(Amount::from_wei(wei))
    }

    pub async fn gas_price(&self) -> Result<Amount, WalletError> {
        let wei: U256 = self.call("eth_gasPrice", params![]).await?;
        Ok(Amount::from_wei(wei))
    }

    /// Next nonce for `address`, counting transactions still in the pool.
    pub async fn pending_nonce(&self, address: &Address) -> Result<u64, WalletError> {
        let count: U64 = self
            .call("eth_getTransactionCount", params![address, "pending"])
            .await?;
        Ok(count.to::<u64>())
    }

    pub async fn chain_id(&self) -> Result<u64, WalletError> {
        let id: U64 = self.call("eth_chainId", params![]).await?;
        Ok(id.to::<u64>())
    }

    pub async fn chain_status(&self) -> Result<ChainStatus, WalletError> {
        self.call("parity_chainStatus", params![]).await
    }

    /// Chain name as the node reports it, e.g. `"nile"`.
    pub async fn chain_name(&self) -> Result<String, WalletError> {
        self.call("parity_chain", params![]).await
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, WalletError> {
        let encoded = format!("0x{}", hex::encode(raw));
        let hash: TxHash = self.call("eth_sendRawTransaction", params![encoded]).await?;
        info!(endpoint = %self.endpoint, tx_hash = %hash, "raw transaction submitted");
        Ok(hash)
    }

    /// Let the node sign with its own custody of `intent.from`.
    pub async fn send_custodial_transaction(
        &self,
        intent: &TransactionIntent,
        password: &str,
    ) -> Result<TxHash, WalletError> {
        let request = TransactionRequest::from(intent);
        let hash: TxHash = self
            .call("personal_sendTransaction", params![request, password])
            .await
            .map_err(password_error)?;
        info!(endpoint = %self.endpoint, tx_hash = %hash, from = %intent.from, "custodial transaction submitted");
        Ok(hash)
    }

    /// Receipt for `hash`, or `None` while it is still pending.
    pub async fn transaction_receipt(
        &self,
        hash: &TxHash,
    ) -> Result<Option<TransactionReceipt>, WalletError> {
        self.call("eth_getTransactionReceipt", params![hash]).await
    }

    /// Poll for a mined receipt until `timeout` elapses.
    ///
    /// Expiry is [`WalletError::Timeout`] carrying `hash`; RPC failures while
    /// polling end the wait immediately.
    pub async fn wait_for_receipt(
        &self,
        hash: &TxHash,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<TransactionReceipt, WalletError> {
        let poll = async {
            loop {
                if let Some(receipt) = self.transaction_receipt(hash).await? {
                    if receipt.is_mined() {
                        return Ok::<_, WalletError>(receipt);
                    }
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                debug!(tx_hash = %hash, ?timeout, "receipt wait timed out");
                Err(WalletError::Timeout {
                    tx_hash: Some(*hash),
                })
            }
        }
    }
}

fn map_client_error(method: &str, err: ClientError) -> WalletError {
    match err {
        ClientError::Call(obj) => WalletError::Node {
            code: obj.code(),
            message: obj.message().to_string(),
        },
        other => WalletError::Transport(format!("{method}: {other}")),
    }
}

/// Node errors that complain about the password become [`WalletError::Auth`].
fn password_error(err: WalletError) -> WalletError {
    match &err {
        WalletError::Node { message, .. } => {
            let lower = message.to_lowercase();
            if lower.contains("password") || lower.contains("decrypt") {
                WalletError::Auth
            } else {
                err
            }
        }
        _ => err,
    }
}
