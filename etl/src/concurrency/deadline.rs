use std::future::Future;
use std::time::Duration;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Runs `future` with a deadline.
///
/// Expiry is reported as a retryable [`ErrorKind::NetworkTimeout`] naming `operation` and the
/// elapsed budget. The future is dropped when the deadline fires.
pub async fn with_deadline<T, F>(duration: Duration, operation: &str, future: F) -> EtlResult<T>
where
    F: Future<Output = EtlResult<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(etl_error!(
            ErrorKind::NetworkTimeout,
            "Operation exceeded its deadline",
            format!("{operation} did not complete within {}ms", duration.as_millis())
        )),
    }
}
