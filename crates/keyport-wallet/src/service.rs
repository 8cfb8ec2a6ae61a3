//! Address-oriented account operations over both backends.
//!
//! Every operation that can run against either the local keystore or a node
//! takes a [`LocationRef`] and dispatches on it exhaustively. Secrets are
//! only held for the duration of the call that needs them.

use tracing::{debug, info};

use keyport_core::{
    Address, Amount, Endpoint, LocationRef, RawKey, RetryPolicy, WalletConfig, WalletError,
};
use keyport_keystore::{KdfParams, KeyRecord, KeyStore};
use keyport_node::{ChainStatus, FaucetClient, NodeClient, TransactionReceipt};

use crate::funding;
use crate::send::{self, SendRequest, SendTiming, SigningPath};

/// The unified account API.
#[derive(Debug)]
pub struct AccountService {
    keystore: KeyStore,
    config: WalletConfig,
    faucet: FaucetClient,
}

impl AccountService {
    /// Open the keystore named in `config`.
    pub fn new(config: WalletConfig) -> Result<Self, WalletError> {
        let keystore = KeyStore::open(config.keystore_path())?;
        Self::with_keystore(keystore, config)
    }

    pub fn with_keystore(keystore: KeyStore, config: WalletConfig) -> Result<Self, WalletError> {
        let faucet = FaucetClient::new(config.faucet_agent.clone(), config.rpc_timeout())?;
        Ok(Self {
            keystore,
            config,
            faucet,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    /// A client for `endpoint` with the configured request timeout.
    pub fn node(&self, endpoint: &Endpoint) -> Result<NodeClient, WalletError> {
        NodeClient::new(endpoint, self.config.rpc_timeout())
    }

    fn kdf(&self) -> KdfParams {
        KdfParams::pbkdf2(self.config.kdf_iterations)
    }

    fn local_record(&self, address: &Address) -> Result<&KeyRecord, WalletError> {
        self.keystore
            .get(address)
            .ok_or(WalletError::NotFound(*address))
    }

    // ------------------------------------------------------------------
    // Account lifecycle
    // ------------------------------------------------------------------

    /// Create an account. The address is present in its backend when this
    /// returns.
    pub async fn new_account(
        &mut self,
        password: &str,
        location: &LocationRef,
    ) -> Result<Address, WalletError> {
        match location {
            LocationRef::Local => {
                let key = RawKey::generate();
                let address = key.address()?;
                let record = KeyRecord::encrypt(&key, password, self.kdf())?;
                self.keystore.set(address, record)?;
                info!(%address, "local account created");
                Ok(address)
            }
            LocationRef::Remote(endpoint) => self.node(endpoint)?.create_account(password).await,
        }
    }

    /// Delete an account. The password must unlock it.
    pub async fn delete_account(
        &mut self,
        address: &Address,
        password: &str,
        location: &LocationRef,
    ) -> Result<(), WalletError> {
        match location {
            LocationRef::Local => {
                self.local_record(address)?.decrypt(password)?;
                self.keystore.delete(address)?;
                info!(%address, "local account deleted");
                Ok(())
            }
            LocationRef::Remote(endpoint) => {
                self.node(endpoint)?
                    .delete_account(address, password)
                    .await
            }
        }
    }

    pub async fn list_accounts(&self, location: &LocationRef) -> Result<Vec<Address>, WalletError> {
        match location {
            LocationRef::Local => Ok(self.keystore.addresses()),
            LocationRef::Remote(endpoint) => self.node(endpoint)?.list_accounts().await,
        }
    }

    /// The account's key record as JSON. The password must unlock it.
    pub async fn export_account_record(
        &self,
        address: &Address,
        password: &str,
        location: &LocationRef,
    ) -> Result<serde_json::Value, WalletError> {
        match location {
            LocationRef::Local => {
                let record = self.local_record(address)?;
                record.decrypt(password)?;
                serde_json::to_value(record).map_err(|e| WalletError::MalformedRecord(e.to_string()))
            }
            LocationRef::Remote(endpoint) => {
                self.node(endpoint)?
                    .export_account(address, password)
                    .await
            }
        }
    }

    /// The account's raw private key.
    pub async fn export_private_key(
        &self,
        address: &Address,
        password: &str,
        location: &LocationRef,
    ) -> Result<RawKey, WalletError> {
        let value = self
            .export_account_record(address, password, location)
            .await?;
        let record = KeyRecord::from_value(value)?;
        let key = record.decrypt(password)?;
        if key.address()? != *address {
            return Err(WalletError::MalformedRecord(format!(
                "exported record does not belong to {address}"
            )));
        }
        Ok(key)
    }

    /// Import a key record given as JSON text.
    ///
    /// The JSON shape is checked before anything else. Locally the record
    /// must decrypt under `password` and is stored under the address its key
    /// controls.
    pub async fn import_account_record(
        &mut self,
        record_json: &str,
        password: &str,
        location: &LocationRef,
    ) -> Result<Address, WalletError> {
        let record = KeyRecord::from_json(record_json)?;
        match location {
            LocationRef::Local => {
                let (_, address) = record.unlock(password)?;
                self.keystore.set(address, record)?;
                info!(%address, "local account imported");
                Ok(address)
            }
            LocationRef::Remote(endpoint) => {
                let node = self.node(endpoint)?;
                node.import_account(&record.to_json()?, password).await
            }
        }
    }

    /// Import a raw private key. When `expected` is given the key must
    /// control that address.
    pub async fn import_private_key(
        &mut self,
        expected: Option<&Address>,
        key: &RawKey,
        password: &str,
        location: &LocationRef,
    ) -> Result<Address, WalletError> {
        let address = key.address()?;
        if let Some(expected) = expected {
            if *expected != address {
                return Err(WalletError::MalformedRecord(format!(
                    "key controls {address}, not {expected}"
                )));
            }
        }
        match location {
            LocationRef::Local => {
                let record = KeyRecord::encrypt(key, password, self.kdf())?;
                self.keystore.set(address, record)?;
                info!(%address, "local key imported");
                Ok(address)
            }
            LocationRef::Remote(endpoint) => {
                self.node(endpoint)?
                    .import_secret(key, password)
                    .await
            }
        }
    }

    pub async fn change_password(
        &mut self,
        address: &Address,
        old_password: &str,
        new_password: &str,
        location: &LocationRef,
    ) -> Result<(), WalletError> {
        match location {
            LocationRef::Local => {
                let updated = self
                    .local_record(address)?
                    .reencrypt(old_password, new_password, self.kdf())?;
                self.keystore.set(*address, updated)?;
                info!(%address, "local password changed");
                Ok(())
            }
            LocationRef::Remote(endpoint) => {
                self.node(endpoint)?
                    .change_password(address, old_password, new_password)
                    .await
            }
        }
    }

    /// Copy an account's key record from one backend to another.
    pub async fn copy_account(
        &mut self,
        address: &Address,
        password: &str,
        from: &LocationRef,
        to: &LocationRef,
    ) -> Result<Address, WalletError> {
        if from == to {
            return Err(WalletError::Config(format!(
                "cannot copy {address} onto the same location {from}"
            )));
        }
        let record = self.export_account_record(address, password, from).await?;
        let text = record.to_string();
        let copied = self.import_account_record(&text, password, to).await?;
        info!(%address, %from, %to, "account copied");
        Ok(copied)
    }

    // ------------------------------------------------------------------
    // Chain
    // ------------------------------------------------------------------

    pub async fn balance(&self, address: &Address, endpoint: &Endpoint) -> Result<Amount, WalletError> {
        self.node(endpoint)?.balance(address).await
    }

    pub async fn chain_status(&self, endpoint: &Endpoint) -> Result<ChainStatus, WalletError> {
        self.node(endpoint)?.chain_status().await
    }

    pub async fn chain_name(&self, endpoint: &Endpoint) -> Result<String, WalletError> {
        self.node(endpoint)?.chain_name().await
    }

    /// Sign (locally or on the node), submit and wait for the receipt.
    pub async fn send_value(
        &self,
        request: &SendRequest,
        password: &str,
        endpoint: &Endpoint,
    ) -> Result<TransactionReceipt, WalletError> {
        let node = self.node(endpoint)?;
        let timing = SendTiming {
            default_timeout: self.config.send_timeout(),
            poll_interval: self.config.receipt_poll_interval(),
        };
        send::send_value(&self.keystore, &node, request, password, timing).await
    }

    // ------------------------------------------------------------------
    // Funding
    // ------------------------------------------------------------------

    /// One faucet request. Does not wait for the funds.
    pub async fn request_faucet_funds(&self, address: &Address, faucet_url: &str) -> Result<(), WalletError> {
        self.faucet.request_funds(address, faucet_url).await
    }

    /// Poll until `address` holds a non-zero balance, within `policy`.
    pub async fn wait_for_balance(
        &self,
        address: &Address,
        endpoint: &Endpoint,
        policy: &RetryPolicy,
    ) -> Result<Amount, WalletError> {
        let node = self.node(endpoint)?;
        funding::wait_for_balance(&node, address, policy).await
    }

    /// Get test ether for `address` on `network` (a registry name or URL).
    ///
    /// Refuses while the node is syncing. Uses the network's HTTP faucet when
    /// it has one, otherwise a transfer from its faucet account. Returns the
    /// balance afterwards.
    pub async fn request_ether(
        &self,
        address: &Address,
        network: &str,
        amount: Option<Amount>,
    ) -> Result<Amount, WalletError> {
        let networks = &self.config.networks;
        let endpoint = match networks.resolve(network)? {
            LocationRef::Remote(endpoint) => endpoint,
            LocationRef::Local => return Err(WalletError::NoFaucet(network.to_string())),
        };
        let node = self.node(&endpoint)?;

        let status = node.chain_status().await?;
        if let Some((from, to)) = status.gap() {
            return Err(WalletError::NotSynced { from, to });
        }

        let chain_name = node.chain_name().await?;
        debug!(%chain_name, network, "resolving faucet");

        if let Some(faucet_url) = networks
            .faucet_url(&chain_name)
            .or_else(|| networks.faucet_url(network))
        {
            self.faucet.request_funds(address, faucet_url).await?;
            return funding::wait_for_balance(&node, address, &self.config.funding).await;
        }

        if let Some(account) = networks
            .faucet_account(network)
            .or_else(|| networks.faucet_account(&chain_name))
        {
            let amount = match amount {
                Some(a) => a,
                None => self.config.request_amount()?,
            };
            let request = SendRequest::new(
                account.address.clone(),
                address.to_checksum(None),
                amount.to_string(),
                SigningPath::Custodial,
            )
            .with_timeout(self.config.send_timeout());
            self.send_value(&request, &account.password, &endpoint).await?;
            return node.balance(address).await;
        }

        Err(WalletError::NoFaucet(network.to_string()))
    }
}
