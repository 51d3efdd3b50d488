// src/external/mod.rs

//! Seams to everything outside the process, and the one call policy they share.

pub mod faucet;
pub mod oracle;
pub mod store;
pub mod text;

use std::future::Future;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::config::ExternalCallPolicy;
use crate::error::{Result, SimError};

pub use faucet::{Faucet, SimulatedFaucet};
pub use oracle::{FixedOracle, GbmOracle, PriceOracle};
pub use store::{InMemoryStore, Page, PageRequest, Store};
pub use text::{GenerationOptions, TemplateGenerator, TextGenerator};

/// Run `op` under the policy deadline, retrying with backoff.
/// Returns the last error once the retry budget is spent.
pub async fn call_with_policy<T, F, Fut>(
    policy: &ExternalCallPolicy,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match timeout(policy.timeout(), op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => SimError::ExternalTimeout(format!("{what} after {}ms", policy.timeout_ms)),
        };
        if attempt >= policy.retries {
            warn!(call = what, attempts = attempt + 1, error = %err, "external call gave up");
            return Err(err);
        }
        attempt += 1;
        warn!(call = what, attempt, error = %err, "external call failed, retrying");
        sleep(policy.backoff(attempt)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn policy() -> ExternalCallPolicy {
        ExternalCallPolicy {
            timeout_ms: 50,
            retries: 1,
            backoff_ms: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_attempt_can_succeed() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out = call_with_policy(&policy(), "flaky", move || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SimError::External("boom".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_after_one_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let out: Result<()> = call_with_policy(&policy(), "slow", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;
        assert!(matches!(out, Err(SimError::ExternalTimeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one try plus one retry");
    }

    #[test]
    fn backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(10));
        assert_eq!(p.backoff(2), Duration::from_millis(20));
        assert_eq!(p.backoff(3), Duration::from_millis(40));
    }
}
