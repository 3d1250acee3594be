// Retry with exponential backoff and jitter

use futures::future::BoxFuture;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Run `operation` up to `max_attempts` times, backing off exponentially
/// between failures. The final error is returned unchanged.
pub async fn with_retry<'a, F, T, E>(mut operation: F, max_attempts: u32) -> Result<T, E>
where
    F: FnMut() -> BoxFuture<'a, Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(error);
                }

                let base_ms = 500u64.saturating_mul(2u64.pow(attempt.min(5)));
                let jitter_ms: u64 = rand::thread_rng().gen_range(0..250);
                let delay = Duration::from_millis(base_ms + jitter_ms);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying after failure");
                sleep(delay).await;
            }
        }
    }
}
