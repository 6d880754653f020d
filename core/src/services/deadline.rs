//! Time bounds for store and transport calls

use std::future::Future;
use std::time::Duration;

use crate::errors::{DomainResult, OtpError};

/// Runs `fut`, failing with `OtpError::Timeout` once `limit` elapses
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation = operation,
                timeout_ms = limit.as_millis() as u64,
                event = "operation_timeout",
                "Operation exceeded its time budget"
            );
            Err(OtpError::Timeout {
                operation: operation.to_string(),
            }
            .into())
        }
    }
}
