//! Side effects whose failure must not fail the request they belong to.

use std::fmt::Display;
use std::future::Future;

use tracing::warn;

/// Awaits `fut`; an error is logged with `context` and turned into `None`.
pub async fn best_effort<T, E, F>(context: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(context, error = %e, "best-effort operation failed");
            None
        }
    }
}
