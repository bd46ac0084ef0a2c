//! Bounded retry with a fixed backoff schedule.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// The schedule shared by the reporter and the snapshot writer: one
/// attempt per entry, sleeping the entry's interval after a failure.
pub const DEFAULT_BACKOFF: [Duration; 3] =
    [Duration::from_secs(1), Duration::from_secs(3), Duration::from_secs(5)];

/// Run `op` once per schedule entry until it succeeds, sleeping the
/// entry's interval after each failed attempt. The final failure is
/// returned without sleeping.
pub async fn with_backoff<T, E, F, Fut>(schedule: &[Duration], mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let last = schedule.len().saturating_sub(1);
    let mut result = op().await;

    for (attempt, delay) in schedule.iter().enumerate() {
        match result {
            Ok(value) => return Ok(value),
            Err(err) if attempt < last => {
                warn!(%err, attempt = attempt + 1, delay = ?delay, "attempt failed, retrying");
                tokio::time::sleep(*delay).await;
                result = op().await;
            }
            Err(err) => return Err(err),
        }
    }

    result
}
