//! Monetary amounts in the chain's base unit and its smallest unit (wei).
//!
//! Amounts cross the API boundary as decimal ether strings and are converted
//! to an exact integer count of wei with a fixed 18-decimal scale. Fractional
//! digits beyond the eighteenth are truncated, never rounded, so a conversion
//! can never spend more than the caller asked for.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Number of decimal places between ether and wei.
pub const DECIMALS: usize = 18;

/// Wei in one ether.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// An amount of the native currency, held as an integer number of wei.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(U256);

impl Amount {
    /// Zero wei.
    pub const ZERO: Amount = Amount(U256::ZERO);

    /// Wrap a raw wei value.
    pub const fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    /// Whole ether.
    pub fn from_ether(ether: u64) -> Self {
        Self(U256::from(ether) * U256::from(WEI_PER_ETHER))
    }

    /// The amount in wei.
    pub const fn wei(&self) -> U256 {
        self.0
    }

    /// True when the amount is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse a decimal ether string into wei, truncating past 18 decimals.
    ///
    /// Accepts `"1"`, `"1.5"`, `".5"` and `"1."`. Rejects signs other than a
    /// leading `+`, exponents, separators and empty input.
    pub fn from_ether_str(s: &str) -> Result<Self, WalletError> {
        let trimmed = s.trim();
        if trimmed.starts_with('-') {
            return Err(WalletError::InvalidAmount(format!("{s:?} is negative")));
        }
        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(WalletError::InvalidAmount(format!(
                "{s:?} is not a decimal number"
            )));
        }

        let overflow = || WalletError::InvalidAmount(format!("{s:?} is too large"));

        let whole = if int_part.is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(int_part, 10).map_err(|_| overflow())?
        };

        let kept = &frac_part[..frac_part.len().min(DECIMALS)];
        let padded = format!("{kept:0<width$}", width = DECIMALS);
        let fraction = U256::from_str_radix(&padded, 10).map_err(|_| overflow())?;

        let wei = whole
            .checked_mul(U256::from(WEI_PER_ETHER))
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(overflow)?;

        Ok(Self(wei))
    }

    /// Reject zero; used before any transfer touches the network.
    pub fn ensure_positive(self) -> Result<Self, WalletError> {
        if self.is_zero() {
            return Err(WalletError::InvalidAmount("amount must be greater than zero".into()));
        }
        Ok(self)
    }
}

impl FromStr for Amount {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_ether_str(s)
    }
}

impl From<U256> for Amount {
    fn from(wei: U256) -> Self {
        Self(wei)
    }
}

impl fmt::Display for Amount {
    /// Ether with trailing fractional zeros trimmed, e.g. `1.5` or `3`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = U256::from(WEI_PER_ETHER);
        let whole = self.0 / unit;
        let fraction = self.0 % unit;
        if fraction.is_zero() {
            return write!(f, "{whole}");
        }
        let digits = format!("{fraction:0>width$}", width = DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}
