//! Deadline enforcement for back-end round trips

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Run a back-end call under `timeout`.
///
/// Expiry drops the in-flight future and surfaces [`Error::ProviderTimeout`];
/// any lock guard held by the caller is released as the error propagates.
pub async fn with_deadline<T, F>(operation: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?timeout, "back-end call exceeded deadline");
            Err(Error::ProviderTimeout {
                operation: operation.to_string(),
                timeout,
            })
        }
    }
}
