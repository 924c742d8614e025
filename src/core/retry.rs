//! Bounded retry with exponential backoff for transient upstream failures.

use std::future::Future;
use std::time::Duration;

use crate::core::errors::RagError;

/// Run `op` up to `1 + max_retries` times, sleeping `initial_backoff`
/// (doubled each attempt) between tries. Only errors for which
/// [`RagError::is_transient`] holds are retried; fatal errors and the final
/// transient error are returned as-is.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    max_retries: usize,
    initial_backoff: Duration,
    mut op: F,
) -> Result<T, RagError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RagError>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    "{label} transient failure (attempt {attempt}/{max_retries}): {err}"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}
