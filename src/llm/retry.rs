//! Bounded retry with jittered exponential backoff for transient
//! language-service failures. Rate limits honor the server's retry hint
//! when one is given.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::LlmError;

/// Total attempts per logical call (first try included).
const MAX_ATTEMPTS: u32 = 3;
/// Backoff base for the first retry.
const BASE_DELAY_MS: u64 = 500;

/// Run `call` until it succeeds, fails non-transiently, or exhausts the
/// attempt bound.
pub(crate) async fn with_retries<T, F, Fut>(op: &str, mut call: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_ATTEMPTS && is_transient(&err) => {
                let delay = backoff_delay(attempt, retry_hint(&err));
                warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient language-service failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Rate limits and upstream 5xx are worth retrying; auth and malformed
/// responses are not.
fn is_transient(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Unavailable { .. }
    )
}

fn retry_hint(err: &LlmError) -> Option<Duration> {
    match err {
        LlmError::RateLimited { retry_after, .. } => *retry_after,
        _ => None,
    }
}

/// Server hint wins; otherwise exponential base with up to 50% jitter.
fn backoff_delay(attempt: u32, hint: Option<Duration>) -> Duration {
    if let Some(hint) = hint {
        return hint;
    }
    let base = BASE_DELAY_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}
