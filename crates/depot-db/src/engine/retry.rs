//! Bounded retry of write conflicts.

use std::future::Future;

use backoff::backoff::Backoff;
use tracing::warn;

use crate::config::RetryPolicy;
use depot_core::{StockError, StockResult};

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// Each attempt must be a complete transaction: a failed attempt has already
/// rolled back when its error reaches this loop.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> StockResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StockResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.create_backoff();
    let mut attempt = 1;

    loop {
        match op().await {
            Err(err) if err.is_retryable() => {
                if attempt >= max_attempts {
                    warn!(operation, attempts = attempt, "Write conflict persisted, giving up");
                    return Err(StockError::Conflict { attempts: attempt });
                }

                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                warn!(operation, attempt, ?delay, "Write conflict, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}
