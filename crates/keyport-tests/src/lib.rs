//! Test doubles for Keyport's remote collaborators.
//!
//! [`MockNode`] speaks the subset of the Parity JSON-RPC API the node client
//! uses, with an in-memory account registry and ledger. [`MockFaucet`] credits
//! that ledger when it receives a funding request. Both bind to an ephemeral
//! localhost port.

pub mod helpers;
pub mod mock_faucet;
pub mod mock_node;

pub use mock_faucet::MockFaucet;
pub use mock_node::{Funder, Mining, MockNode};
