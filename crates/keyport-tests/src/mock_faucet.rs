//! HTTP faucet double that credits a [`MockNode`](crate::MockNode).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;

use keyport_core::{Amount, parse_address};

use crate::mock_node::Funder;

#[derive(Clone)]
struct FaucetState {
    funder: Funder,
    grant: Amount,
    reject: Option<(StatusCode, &'static str)>,
    credit: bool,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn handle(State(state): State<FaucetState>, Json(body): Json<Value>) -> (StatusCode, String) {
    state.requests.lock().push(body.clone());
    if let Some((status, message)) = state.reject {
        return (status, message.to_string());
    }
    let Some(address) = body["address"].as_str().and_then(|a| parse_address(a).ok()) else {
        return (StatusCode::BAD_REQUEST, "missing address".into());
    };
    if state.credit {
        state.funder.fund(&address, state.grant);
    }
    (StatusCode::OK, format!("{{\"success\": true, \"amount\": \"{}\"}}", state.grant))
}

/// A running faucet on an ephemeral localhost port.
pub struct MockFaucet {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockFaucet {
    /// Grants `grant` to every address that asks.
    pub async fn start(funder: Funder, grant: Amount) -> Self {
        Self::serve(funder, grant, None, true).await
    }

    /// Answers every request with `status`.
    pub async fn rejecting(funder: Funder, status: StatusCode, message: &'static str) -> Self {
        Self::serve(funder, Amount::ZERO, Some((status, message)), false).await
    }

    /// Accepts requests but never pays out.
    pub async fn stingy(funder: Funder) -> Self {
        Self::serve(funder, Amount::ZERO, None, false).await
    }

    async fn serve(
        funder: Funder,
        grant: Amount,
        reject: Option<(StatusCode, &'static str)>,
        credit: bool,
    ) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = FaucetState {
            funder,
            grant,
            reject,
            credit,
            requests: requests.clone(),
        };
        let router = Router::new()
            .route("/faucet", post(handle))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock faucet");
        let addr = listener.local_addr().expect("mock faucet address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}/faucet", self.addr)
    }

    /// Request bodies received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }
}
