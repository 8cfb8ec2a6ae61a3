//! HTTP faucet client.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tracing::info;

use keyport_core::{Address, WalletError};

#[derive(Serialize)]
struct FaucetRequest<'a> {
    address: String,
    agent: &'a str,
}

/// Posts funding requests to faucet endpoints.
#[derive(Debug, Clone)]
pub struct FaucetClient {
    http: reqwest::Client,
    agent: String,
}

impl FaucetClient {
    /// `agent` is sent with every request to identify this client.
    pub fn new(agent: impl Into<String>, timeout: Duration) -> Result<Self, WalletError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            agent: agent.into(),
        })
    }

    /// Ask the faucet at `faucet_url` to credit `address`.
    ///
    /// Only HTTP 200 counts as success. Funds may arrive later; this call does
    /// not wait for them.
    pub async fn request_funds(&self, address: &Address, faucet_url: &str) -> Result<(), WalletError> {
        let body = FaucetRequest {
            address: address.to_checksum(None),
            agent: &self.agent,
        };
        let response = self
            .http
            .post(faucet_url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("{faucet_url}: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => format!("<unreadable response body: {e}>"),
            };
            return Err(WalletError::Faucet {
                status: status.as_u16(),
                body,
            });
        }

        info!(%address, faucet = faucet_url, "faucet request accepted");
        Ok(())
    }
}
