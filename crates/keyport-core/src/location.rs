//! Where an account lives.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A JSON-RPC endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Wrap a URL string.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The backend an account operation runs against.
///
/// Always chosen explicitly by the caller; nothing in Keyport guesses the
/// location of an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationRef {
    /// The local encrypted keystore file.
    Local,
    /// A node that custodies keys itself.
    Remote(Endpoint),
}

impl LocationRef {
    /// Shorthand for a remote location.
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote(Endpoint::new(url))
    }

    /// The endpoint, if remote.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            Self::Local => None,
            Self::Remote(e) => Some(e),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for LocationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_exposes_endpoint() {
        let loc = LocationRef::remote("http://localhost:8545");
        assert_eq!(loc.endpoint().map(Endpoint::as_str), Some("http://localhost:8545"));
        assert!(!loc.is_local());
    }

    #[test]
    fn local_has_no_endpoint() {
        assert!(LocationRef::Local.endpoint().is_none());
        assert_eq!(LocationRef::Local.to_string(), "local");
    }
}
