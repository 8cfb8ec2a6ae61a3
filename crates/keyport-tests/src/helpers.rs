//! Shared configuration for integration tests.

use std::path::Path;

use keyport_core::config::{FaucetAccount, NetworkSpec};
use keyport_core::{Address, RetryPolicy, WalletConfig};

/// Defaults tuned for tests: cheap KDF, fast polling, short timeouts.
pub fn test_config(keystore: &Path) -> WalletConfig {
    let mut config = WalletConfig::default();
    config.keystore_path = Some(keystore.to_path_buf());
    config.kdf_iterations = 2;
    config.rpc_timeout_secs = 5;
    config.receipt_poll_interval_ms = 20;
    config.send_timeout_secs = 5;
    config.funding = quick_retry(5);
    config
}

pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 10,
        max_delay_ms: 50,
    }
}

/// Add (or replace) a named network pointing at `url`.
pub fn register_network(
    config: &mut WalletConfig,
    name: &str,
    url: &str,
    faucet_url: Option<String>,
    faucet_account: Option<(Address, &str)>,
) {
    config.networks.insert(
        name,
        NetworkSpec {
            description: format!("test network {name}"),
            url: Some(url.to_string()),
            faucet_url,
            faucet_account: faucet_account.map(|(address, password)| FaucetAccount {
                address: address.to_checksum(None),
                password: password.to_string(),
            }),
        },
    );
}
