use crate::error::{ErrorKind, EtlError};

/// Retry behavior for a classified error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The operation can be retried automatically after a delay.
    Timed,
    /// The operation should only be retried after manual intervention.
    Manual,
    /// The operation should not be retried.
    NoRetry,
}

/// Policy describing how an [`EtlError`] should be handled by pipelines and their callers.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ErrorHandlingPolicy {
    retry_directive: RetryDirective,
    solution: Option<&'static str>,
}

impl ErrorHandlingPolicy {
    const fn new(retry_directive: RetryDirective, solution: Option<&'static str>) -> Self {
        Self {
            retry_directive,
            solution,
        }
    }

    pub fn retry_directive(&self) -> RetryDirective {
        self.retry_directive
    }

    /// Returns an optional operator-facing solution message.
    pub fn solution(&self) -> Option<&'static str> {
        self.solution
    }

    /// Returns `true` when the failed operation may be retried without operator action.
    pub fn is_retryable(&self) -> bool {
        self.retry_directive == RetryDirective::Timed
    }
}

/// Builds an [`ErrorHandlingPolicy`] from an [`EtlError`] to decide in a unified way how errors
/// should be handled.
pub fn build_error_handling_policy(error: &EtlError) -> ErrorHandlingPolicy {
    match error.kind() {
        // Transient source failures that are expected to recover on their own.
        ErrorKind::SourceConnectionFailed | ErrorKind::NetworkTimeout | ErrorKind::SourceIoError => {
            ErrorHandlingPolicy::new(RetryDirective::Timed, None)
        }

        ErrorKind::AuthenticationFailed => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Verify the source credentials configured for the bridge."),
        ),
        ErrorKind::SourceQueryFailed => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Check the extraction query against the source layout of the entity."),
        ),
        ErrorKind::PersistenceError => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some("Check the availability and schema of the catalog store."),
        ),

        // Failures that repeat identically on every attempt.
        ErrorKind::ConfigurationError => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Fix the configuration and restart the sync."),
        ),
        ErrorKind::SecurityViolation => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Only read-only queries on allow-listed tables may be executed."),
        ),
        ErrorKind::InvalidState => ErrorHandlingPolicy::new(RetryDirective::NoRetry, None),

        // By default, require manual intervention with a generic solution.
        _ => ErrorHandlingPolicy::new(
            RetryDirective::Manual,
            Some(
                "There is no single prescribed solution for this error. Inspect the logs of the failed entity and retry after a targeted fix.",
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(kind: ErrorKind) -> EtlError {
        EtlError::from((kind, "test error"))
    }

    #[test]
    fn classifies_network_failures_as_timed_retry() {
        for kind in [ErrorKind::SourceConnectionFailed, ErrorKind::NetworkTimeout] {
            let policy = build_error_handling_policy(&err(kind));
            assert_eq!(policy.retry_directive(), RetryDirective::Timed);
            assert!(policy.is_retryable());
            assert_eq!(policy.solution(), None);
        }
    }

    #[test]
    fn classifies_authentication_error_as_manual_retry() {
        let policy = build_error_handling_policy(&err(ErrorKind::AuthenticationFailed));
        assert_eq!(policy.retry_directive(), RetryDirective::Manual);
        assert!(policy.solution().is_some());
    }

    #[test]
    fn never_retries_security_violations() {
        let policy = build_error_handling_policy(&err(ErrorKind::SecurityViolation));
        assert_eq!(policy.retry_directive(), RetryDirective::NoRetry);
        assert!(!policy.is_retryable());
    }

    #[test]
    fn classifies_unknown_kind_as_manual_retry() {
        let policy = build_error_handling_policy(&err(ErrorKind::Unknown));
        assert_eq!(policy.retry_directive(), RetryDirective::Manual);
        assert!(policy.solution().is_some());
    }
}
