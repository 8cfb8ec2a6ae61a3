//! In-memory Parity-style node.
//!
//! Accounts are held as encrypted key records, exactly as a real node would
//! custody them, so records exported here can be imported by the local
//! keystore and the other way round. Transfers move balances immediately;
//! whether a receipt appears is controlled by [`Mining`].

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, TxHash, U64, U256, keccak256};
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::Mutex;
use tracing::debug;

use keyport_core::{Amount, Endpoint, RawKey, WalletError};
use keyport_keystore::{KdfParams, KeyRecord};
use keyport_node::{ChainStatus, TransactionReceipt, TransactionRequest};

const MOCK_KDF_ROUNDS: u32 = 2;
const TRANSFER_GAS: u64 = 21_000;

/// Whether submitted transactions get mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mining {
    /// Every transaction is mined in its own block as soon as it arrives.
    Instant,
    /// Transactions stay pending forever; receipts are never returned.
    Never,
}

struct Ledger {
    accounts: BTreeMap<Address, KeyRecord>,
    list_new_accounts: bool,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    pending: Vec<TxHash>,
    raw: Vec<Bytes>,
    block_number: u64,
    chain_id: u64,
    chain_name: String,
    block_gap: Option<(u64, u64)>,
    gas_price: U256,
    mining: Mining,
    receipts_fail: bool,
}

impl Ledger {
    fn new() -> Self {
        Self {
            accounts: BTreeMap::new(),
            list_new_accounts: true,
            balances: HashMap::new(),
            nonces: HashMap::new(),
            receipts: HashMap::new(),
            pending: Vec::new(),
            raw: Vec::new(),
            block_number: 0,
            chain_id: 8995,
            chain_name: "spree".into(),
            block_gap: None,
            gas_price: U256::from(1_000_000_000u64),
            mining: Mining::Instant,
            receipts_fail: false,
        }
    }

    fn store(&mut self, key: &RawKey, password: &str) -> Result<Address, ErrorObjectOwned> {
        let address = key.address().map_err(wallet_error)?;
        let record = KeyRecord::encrypt(key, password, KdfParams::pbkdf2(MOCK_KDF_ROUNDS))
            .map_err(wallet_error)?;
        self.accounts.insert(address, record);
        Ok(address)
    }

    fn unlock(&self, address: &Address, password: &str) -> Result<&KeyRecord, ErrorObjectOwned> {
        let record = self
            .accounts
            .get(address)
            .ok_or_else(|| rpc_error(-32000, "account not found"))?;
        record.decrypt(password).map_err(wallet_error)?;
        Ok(record)
    }

    fn nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
        hash: TxHash,
    ) -> Result<(), ErrorObjectOwned> {
        let from_balance = self.balances.get(&from).copied().unwrap_or_default();
        if from_balance < value {
            return Err(rpc_error(-32010, "Insufficient funds"));
        }
        self.balances.insert(from, from_balance - value);
        *self.balances.entry(to).or_default() += value;
        *self.nonces.entry(from).or_default() += 1;

        match self.mining {
            Mining::Instant => {
                self.block_number += 1;
                self.receipts.insert(
                    hash,
                    TransactionReceipt {
                        transaction_hash: hash,
                        block_hash: Some(keccak256(self.block_number.to_be_bytes())),
                        block_number: Some(U64::from(self.block_number)),
                        from: Some(from),
                        to: Some(to),
                        gas_used: Some(U256::from(TRANSFER_GAS)),
                        status: Some(U64::from(1)),
                    },
                );
            }
            Mining::Never => self.pending.push(hash),
        }
        debug!(%from, %to, %value, tx_hash = %hash, "mock transfer");
        Ok(())
    }
}

fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

fn wallet_error(err: WalletError) -> ErrorObjectOwned {
    match err {
        WalletError::Auth => rpc_error(-32021, "Could not decrypt key: invalid password"),
        other => rpc_error(-32602, &other.to_string()),
    }
}

/// The part of the Parity JSON-RPC API the node client talks to.
#[rpc(server)]
pub trait ParityApi {
    #[method(name = "personal_newAccount")]
    async fn new_account(&self, password: String) -> Result<Address, ErrorObjectOwned>;

    #[method(name = "personal_listAccounts")]
    async fn list_accounts(&self) -> Result<Vec<Address>, ErrorObjectOwned>;

    #[method(name = "parity_exportAccount")]
    async fn export_account(
        &self,
        address: Address,
        password: String,
    ) -> Result<serde_json::Value, ErrorObjectOwned>;

    #[method(name = "parity_newAccountFromWallet")]
    async fn new_account_from_wallet(
        &self,
        record_json: String,
        password: String,
    ) -> Result<Address, ErrorObjectOwned>;

    #[method(name = "parity_newAccountFromSecret")]
    async fn new_account_from_secret(
        &self,
        secret: String,
        password: String,
    ) -> Result<Address, ErrorObjectOwned>;

    #[method(name = "parity_killAccount")]
    async fn kill_account(&self, address: Address, password: String) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "parity_changePassword")]
    async fn change_password(
        &self,
        address: Address,
        old_password: String,
        new_password: String,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "eth_getBalance")]
    async fn get_balance(&self, address: Address, block: String) -> Result<U256, ErrorObjectOwned>;

    #[method(name = "eth_gasPrice")]
    async fn gas_price(&self) -> Result<U256, ErrorObjectOwned>;

    #[method(name = "eth_getTransactionCount")]
    async fn get_transaction_count(
        &self,
        address: Address,
        block: String,
    ) -> Result<U64, ErrorObjectOwned>;

    #[method(name = "eth_chainId")]
    async fn chain_id(&self) -> Result<U64, ErrorObjectOwned>;

    #[method(name = "parity_chainStatus")]
    async fn chain_status(&self) -> Result<ChainStatus, ErrorObjectOwned>;

    #[method(name = "parity_chain")]
    async fn chain(&self) -> Result<String, ErrorObjectOwned>;

    #[method(name = "eth_sendRawTransaction")]
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, ErrorObjectOwned>;

    #[method(name = "personal_sendTransaction")]
    async fn send_transaction(
        &self,
        request: TransactionRequest,
        password: String,
    ) -> Result<TxHash, ErrorObjectOwned>;

    #[method(name = "eth_getTransactionReceipt")]
    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ErrorObjectOwned>;
}

struct MockRpc {
    ledger: Arc<Mutex<Ledger>>,
}

#[async_trait]
impl ParityApiServer for MockRpc {
    async fn new_account(&self, password: String) -> Result<Address, ErrorObjectOwned> {
        let mut ledger = self.ledger.lock();
        let address = ledger.store(&RawKey::generate(), &password)?;
        if !ledger.list_new_accounts {
            // Simulates a node that loses the account straight after creating it.
            ledger.accounts.remove(&address);
        }
        Ok(address)
    }

    async fn list_accounts(&self) -> Result<Vec<Address>, ErrorObjectOwned> {
        Ok(self.ledger.lock().accounts.keys().copied().collect())
    }

    async fn export_account(
        &self,
        address: Address,
        password: String,
    ) -> Result<serde_json::Value, ErrorObjectOwned> {
        let ledger = self.ledger.lock();
        let record = ledger.unlock(&address, &password)?;
        serde_json::to_value(record).map_err(|e| rpc_error(-32603, &e.to_string()))
    }

    async fn new_account_from_wallet(
        &self,
        record_json: String,
        password: String,
    ) -> Result<Address, ErrorObjectOwned> {
        let record = KeyRecord::from_json(&record_json).map_err(wallet_error)?;
        let (_, address) = record.unlock(&password).map_err(wallet_error)?;
        self.ledger.lock().accounts.insert(address, record);
        Ok(address)
    }

    async fn new_account_from_secret(
        &self,
        secret: String,
        password: String,
    ) -> Result<Address, ErrorObjectOwned> {
        let key = RawKey::from_hex(&secret).map_err(wallet_error)?;
        self.ledger.lock().store(&key, &password)
    }

    async fn kill_account(&self, address: Address, password: String) -> Result<bool, ErrorObjectOwned> {
        let mut ledger = self.ledger.lock();
        ledger.unlock(&address, &password)?;
        Ok(ledger.accounts.remove(&address).is_some())
    }

    async fn change_password(
        &self,
        address: Address,
        old_password: String,
        new_password: String,
    ) -> Result<bool, ErrorObjectOwned> {
        let mut ledger = self.ledger.lock();
        let updated = ledger
            .unlock(&address, &old_password)?
            .reencrypt(&old_password, &new_password, KdfParams::pbkdf2(MOCK_KDF_ROUNDS))
            .map_err(wallet_error)?;
        ledger.accounts.insert(address, updated);
        Ok(true)
    }

    async fn get_balance(&self, address: Address, _block: String) -> Result<U256, ErrorObjectOwned> {
        Ok(self
            .ledger
            .lock()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<U256, ErrorObjectOwned> {
        Ok(self.ledger.lock().gas_price)
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        _block: String,
    ) -> Result<U64, ErrorObjectOwned> {
        Ok(U64::from(self.ledger.lock().nonce(&address)))
    }

    async fn chain_id(&self) -> Result<U64, ErrorObjectOwned> {
        Ok(U64::from(self.ledger.lock().chain_id))
    }

    async fn chain_status(&self) -> Result<ChainStatus, ErrorObjectOwned> {
        let gap = self.ledger.lock().block_gap;
        Ok(ChainStatus {
            block_gap: gap.map(|(from, to)| (U64::from(from), U64::from(to))),
        })
    }

    async fn chain(&self) -> Result<String, ErrorObjectOwned> {
        Ok(self.ledger.lock().chain_name.clone())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, ErrorObjectOwned> {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|e| rpc_error(-32602, &format!("invalid transaction: {e}")))?;
        let legacy = envelope
            .as_legacy()
            .ok_or_else(|| rpc_error(-32602, "only legacy transactions are accepted"))?;
        let from = legacy
            .signature()
            .recover_address_from_prehash(&legacy.signature_hash())
            .map_err(|e| rpc_error(-32602, &format!("invalid signature: {e}")))?;
        let tx = legacy.tx();
        let to = tx
            .to
            .to()
            .copied()
            .ok_or_else(|| rpc_error(-32602, "contract creation not supported"))?;

        let mut ledger = self.ledger.lock();
        if tx.chain_id != Some(ledger.chain_id) {
            return Err(rpc_error(-32000, "invalid chain id"));
        }
        let expected = ledger.nonce(&from);
        if tx.nonce != expected {
            return Err(rpc_error(
                -32010,
                &format!("Transaction nonce {} does not match expected {expected}", tx.nonce),
            ));
        }
        let hash = *envelope.tx_hash();
        ledger.transfer(from, to, tx.value, hash)?;
        ledger.raw.push(raw);
        Ok(hash)
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
        password: String,
    ) -> Result<TxHash, ErrorObjectOwned> {
        let mut ledger = self.ledger.lock();
        ledger.unlock(&request.from, &password)?;
        let nonce = ledger.nonce(&request.from);
        let mut preimage = request.from.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let hash = keccak256(&preimage);
        ledger.transfer(request.from, request.to, request.value, hash)?;
        Ok(hash)
    }

    async fn get_transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ErrorObjectOwned> {
        let ledger = self.ledger.lock();
        if ledger.receipts_fail {
            return Err(rpc_error(-32603, "receipt index unavailable"));
        }
        Ok(ledger.receipts.get(&hash).cloned())
    }
}

/// Credits balances on a [`MockNode`].
#[derive(Clone)]
pub struct Funder(Arc<Mutex<Ledger>>);

impl Funder {
    pub fn fund(&self, address: &Address, amount: Amount) {
        *self.0.lock().balances.entry(*address).or_default() += amount.wei();
    }
}

/// A running mock node. Stops when dropped.
pub struct MockNode {
    ledger: Arc<Mutex<Ledger>>,
    addr: SocketAddr,
    _handle: ServerHandle,
}

impl MockNode {
    /// Start on an ephemeral localhost port.
    pub async fn start() -> Self {
        let ledger = Arc::new(Mutex::new(Ledger::new()));
        let server = Server::builder()
            .build("127.0.0.1:0")
            .await
            .expect("bind mock node");
        let addr = server.local_addr().expect("mock node address");
        let rpc = MockRpc {
            ledger: ledger.clone(),
        };
        let handle = server.start(rpc.into_rpc());
        Self {
            ledger,
            addr,
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.url())
    }

    /// Credit `address` out of thin air.
    pub fn fund(&self, address: &Address, amount: Amount) {
        self.funder().fund(address, amount);
    }

    /// A handle that can credit balances from another task.
    pub fn funder(&self) -> Funder {
        Funder(self.ledger.clone())
    }

    pub fn balance_of(&self, address: &Address) -> U256 {
        self.ledger
            .lock()
            .balances
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.ledger.lock().nonce(address)
    }

    /// Custody `key` on the node under `password`.
    pub fn add_account(&self, key: &RawKey, password: &str) -> Address {
        self.ledger
            .lock()
            .store(key, password)
            .expect("store mock account")
    }

    pub fn has_account(&self, address: &Address) -> bool {
        self.ledger.lock().accounts.contains_key(address)
    }

    pub fn set_mining(&self, mining: Mining) {
        self.ledger.lock().mining = mining;
    }

    /// Make every `eth_getTransactionReceipt` call fail with an RPC error.
    pub fn fail_receipts(&self, fail: bool) {
        self.ledger.lock().receipts_fail = fail;
    }

    pub fn set_block_gap(&self, gap: Option<(u64, u64)>) {
        self.ledger.lock().block_gap = gap;
    }

    pub fn set_chain_name(&self, name: &str) {
        self.ledger.lock().chain_name = name.to_string();
    }

    pub fn chain_id(&self) -> u64 {
        self.ledger.lock().chain_id
    }

    /// Make `personal_newAccount` forget the account it just created.
    pub fn drop_new_accounts(&self) {
        self.ledger.lock().list_new_accounts = false;
    }

    /// Raw transactions accepted so far, in arrival order.
    pub fn raw_transactions(&self) -> Vec<Bytes> {
        self.ledger.lock().raw.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.lock().pending.len()
    }
}
