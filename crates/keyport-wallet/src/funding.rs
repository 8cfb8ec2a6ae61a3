//! Bounded polling for funds to arrive.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use keyport_core::{Address, Amount, RetryPolicy, WalletError};
use keyport_node::NodeClient;

/// Delay before retry number `attempt` (1-based): exponential from
/// `base_delay_ms`, capped at `max_delay_ms`, plus up to 10% jitter.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = policy
        .base_delay_ms
        .saturating_mul(factor)
        .min(policy.max_delay_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

/// Poll `address`'s balance until it is non-zero.
///
/// Makes at most `policy.max_attempts` balance queries (at least one). When
/// they are used up the result is [`WalletError::Timeout`] with no hash.
pub async fn wait_for_balance(
    node: &NodeClient,
    address: &Address,
    policy: &RetryPolicy,
) -> Result<Amount, WalletError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let balance = node.balance(address).await?;
        if !balance.is_zero() {
            debug!(%address, %balance, attempt, "balance arrived");
            return Ok(balance);
        }
        if attempt < attempts {
            let delay = backoff_delay(attempt, policy);
            debug!(%address, attempt, ?delay, "balance still zero");
            tokio::time::sleep(delay).await;
        }
    }
    Err(WalletError::Timeout { tx_hash: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, max: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay_ms: base,
            max_delay_ms: max,
        }
    }

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(backoff_delay(0, &policy(100, 1000)), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_then_caps() {
        let p = policy(100, 1000);
        let d1 = backoff_delay(1, &p).as_millis();
        let d2 = backoff_delay(2, &p).as_millis();
        let d9 = backoff_delay(9, &p).as_millis();
        assert!((100..110).contains(&d1));
        assert!((200..220).contains(&d2));
        assert!((1000..1100).contains(&d9));
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let d = backoff_delay(u32::MAX, &policy(1000, 5000));
        assert!(d.as_millis() >= 5000);
    }

    #[test]
    fn small_delays_have_no_jitter() {
        assert_eq!(backoff_delay(1, &policy(5, 5)), Duration::from_millis(5));
    }
}
