//! Wallet configuration.
//!
//! [`WalletConfig`] is assembled from three layers, later ones winning:
//! the built-in defaults below, an optional TOML file, then `KEYPORT__*`
//! environment variables (`KEYPORT__RPC_TIMEOUT_SECS=10`,
//! `KEYPORT__FUNDING__MAX_ATTEMPTS=5`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::WalletError;
use crate::location::LocationRef;

/// Name of the network that means "no node, local keystore only".
pub const LOCAL_NETWORK: &str = "local";

const DEFAULTS: &str = r#"
rpc_timeout_secs = 30
receipt_poll_interval_ms = 1000
send_timeout_secs = 120
faucet_agent = "keyport"
kdf_iterations = 262144
request_amount = "10"

[funding]
max_attempts = 30
base_delay_ms = 1000
max_delay_ms = 10000

[networks.local]
description = "No network, only access to local account setup"

[networks.spree]
description = "Spree network running on a local barge"
url = "http://localhost:8545"
faucet_account = { address = "0x068Ed00cF0441e4829D9784fCBe7b9e26D4BD8d0", password = "secret" }

[networks.nile]
description = "Nile network access to remote network node"
url = "https://nile.dev-ocean.com"
faucet_url = "https://faucet.nile.dev-ocean.com/faucet"

[networks.pacific]
description = "Pacific network access to remote network node"
url = "https://pacific.oceanprotocol.com"
faucet_url = "https://faucet.oceanprotocol.com/faucet"

[networks.duero]
description = "Duero network access to remote network node"
url = "https://duero.dev-ocean.com"
faucet_url = "https://faucet.duero.dev-ocean.com/faucet"

[networks.host]
description = "Local node running on barge"
url = "http://localhost:8545"
"#;

/// Bounded retry schedule for polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before giving up. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

/// A development account on a node that hands out ether.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetAccount {
    pub address: String,
    pub password: String,
}

/// One entry of the network registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default)]
    pub description: String,
    /// Node JSON-RPC URL. Absent for the local-only network.
    #[serde(default)]
    pub url: Option<String>,
    /// HTTP faucet endpoint.
    #[serde(default)]
    pub faucet_url: Option<String>,
    /// Funded node account used where no HTTP faucet exists.
    #[serde(default)]
    pub faucet_account: Option<FaucetAccount>,
}

/// Named networks, keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkRegistry(BTreeMap<String, NetworkSpec>);

impl NetworkRegistry {
    /// Look up a network by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&NetworkSpec> {
        self.0.get(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NetworkSpec)> {
        self.0.iter()
    }

    pub fn insert(&mut self, name: &str, spec: NetworkSpec) {
        self.0.insert(name.to_lowercase(), spec);
    }

    /// Turn a network name or URL into a location.
    ///
    /// `local` is the keystore; a known name with a URL is that node; anything
    /// starting with `http` is taken as a node URL verbatim.
    pub fn resolve(&self, name_or_url: &str) -> Result<LocationRef, WalletError> {
        let trimmed = name_or_url.trim();
        if trimmed.eq_ignore_ascii_case(LOCAL_NETWORK) {
            return Ok(LocationRef::Local);
        }
        if trimmed.starts_with("http") {
            return Ok(LocationRef::remote(trimmed));
        }
        match self.get(trimmed).and_then(|n| n.url.as_deref()) {
            Some(url) => Ok(LocationRef::remote(url)),
            None => Err(WalletError::Config(format!(
                "cannot resolve network {trimmed:?} to a node url"
            ))),
        }
    }

    /// Faucet URL registered for a network or chain name.
    pub fn faucet_url(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|n| n.faucet_url.as_deref())
    }

    /// Faucet account registered for a network name.
    pub fn faucet_account(&self, name: &str) -> Option<&FaucetAccount> {
        self.get(name).and_then(|n| n.faucet_account.as_ref())
    }
}

/// Settings shared by the wallet library and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Keystore file. Defaults to `~/.keyport/key_chain.json`.
    #[serde(default)]
    pub keystore_path: Option<PathBuf>,
    pub rpc_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub send_timeout_secs: u64,
    /// `agent` field sent with faucet requests.
    pub faucet_agent: String,
    /// PBKDF2 rounds used when encrypting new key records.
    pub kdf_iterations: u32,
    /// Ether requested from faucet accounts when no amount is given.
    pub request_amount: String,
    pub funding: RetryPolicy,
    pub networks: NetworkRegistry,
}

impl Default for WalletConfig {
    fn default() -> Self {
        // DEFAULTS is covered by `embedded_defaults_parse`.
        Self::from_layers(None, false).unwrap_or_else(|_| Self {
            keystore_path: None,
            rpc_timeout_secs: 30,
            receipt_poll_interval_ms: 1000,
            send_timeout_secs: 120,
            faucet_agent: "keyport".into(),
            kdf_iterations: 262_144,
            request_amount: "10".into(),
            funding: RetryPolicy::default(),
            networks: NetworkRegistry::default(),
        })
    }
}

impl WalletConfig {
    /// Load defaults, then `path` (or `~/.keyport/config.toml` if present),
    /// then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, WalletError> {
        let file = path.map(Path::to_path_buf).or_else(default_config_path);
        Self::from_layers(file.as_deref(), true)
    }

    fn from_layers(file: Option<&Path>, with_env: bool) -> Result<Self, WalletError> {
        let mut builder = Config::builder().add_source(File::from_str(DEFAULTS, FileFormat::Toml));
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix("KEYPORT")
                    .separator("__")
                    .try_parsing(true),
            );
        }
        builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| WalletError::Config(e.to_string()))
    }

    /// Resolved keystore file path.
    pub fn keystore_path(&self) -> PathBuf {
        self.keystore_path
            .clone()
            .unwrap_or_else(|| keyport_dir().join("key_chain.json"))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Default faucet-account transfer amount.
    pub fn request_amount(&self) -> Result<Amount, WalletError> {
        Amount::from_ether_str(&self.request_amount)
    }
}

fn keyport_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".keyport")
}

fn default_config_path() -> Option<PathBuf> {
    let path = keyport_dir().join("config.toml");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_defaults_parse() {
        let cfg = WalletConfig::from_layers(None, false).unwrap();
        assert_eq!(cfg.rpc_timeout_secs, 30);
        assert_eq!(cfg.receipt_poll_interval_ms, 1000);
        assert_eq!(cfg.faucet_agent, "keyport");
        assert_eq!(cfg.kdf_iterations, 262_144);
        assert_eq!(cfg.funding, RetryPolicy::default());
        assert_eq!(cfg.request_amount().unwrap(), Amount::from_ether(10));
    }

    #[test]
    fn default_keystore_path_ends_with_key_chain() {
        let cfg = WalletConfig::default();
        assert!(cfg.keystore_path().ends_with(".keyport/key_chain.json"));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rpc_timeout_secs = 5\nkeystore_path = \"/tmp/ks.json\"\n[funding]\nmax_attempts = 3\nbase_delay_ms = 10\nmax_delay_ms = 20\n[networks.mine]\nurl = \"http://10.0.0.1:8545\""
        )
        .unwrap();

        let cfg = WalletConfig::from_layers(Some(file.path()), false).unwrap();
        assert_eq!(cfg.rpc_timeout_secs, 5);
        assert_eq!(cfg.keystore_path(), PathBuf::from("/tmp/ks.json"));
        assert_eq!(cfg.funding.max_attempts, 3);
        // Defaults still present alongside the new network.
        assert!(cfg.networks.get("nile").is_some());
        assert_eq!(
            cfg.networks.resolve("mine").unwrap(),
            LocationRef::remote("http://10.0.0.1:8545")
        );
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg =
            WalletConfig::from_layers(Some(Path::new("/nonexistent/keyport.toml")), false).unwrap();
        assert_eq!(cfg.send_timeout_secs, 120);
    }

    #[test]
    fn resolve_rules() {
        let reg = WalletConfig::default().networks;
        assert_eq!(reg.resolve("local").unwrap(), LocationRef::Local);
        assert_eq!(reg.resolve("LOCAL").unwrap(), LocationRef::Local);
        assert_eq!(
            reg.resolve("Nile").unwrap(),
            LocationRef::remote("https://nile.dev-ocean.com")
        );
        assert_eq!(
            reg.resolve("http://127.0.0.1:9000").unwrap(),
            LocationRef::remote("http://127.0.0.1:9000")
        );
        assert!(matches!(reg.resolve("atlantis"), Err(WalletError::Config(_))));
    }

    #[test]
    fn faucet_lookups() {
        let reg = WalletConfig::default().networks;
        assert_eq!(
            reg.faucet_url("pacific"),
            Some("https://faucet.oceanprotocol.com/faucet")
        );
        assert!(reg.faucet_url("spree").is_none());
        let acct = reg.faucet_account("spree").unwrap();
        assert_eq!(acct.password, "secret");
        assert!(reg.faucet_account("host").is_none());
    }
}
