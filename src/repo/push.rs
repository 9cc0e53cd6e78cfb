//! Bounded retry for pushes.

use std::time::Duration;
use tracing::{info, warn};

use crate::errors::RepoError;

/// Run `op` up to `attempts` times with a fixed `backoff` between failures.
/// Returns the value and the attempt number that succeeded.
pub async fn with_retry<T, F>(
    branch: &str,
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<(T, u32), RepoError>
where
    F: FnMut() -> Result<T, RepoError>,
{
    let attempts = attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => {
                info!(branch, attempt, "Push succeeded");
                return Ok((value, attempt));
            }
            Err(e) => {
                warn!(branch, attempt, attempts, error = %e, "Push failed");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(RepoError::PushExhausted {
        branch: branch.to_string(),
        attempts,
        last_error,
    })
}
