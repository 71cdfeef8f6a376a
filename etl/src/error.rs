//! Error types and result definitions for catalog sync operations.
//!
//! Every fallible operation of the crate returns [`EtlResult`]. An [`EtlError`] carries an
//! [`ErrorKind`] used to decide how the failure is handled, a static description, optional
//! dynamic detail and the originating error when there is one.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use catalog_config::shared::ValidationError;

/// Convenient result type for catalog sync operations.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for catalog sync operations.
#[derive(Debug, Clone)]
pub struct EtlError {
    payload: Box<ErrorPayload>,
}

/// Categories of failures that can occur while syncing an entity.
///
/// Kinds are grouped by the stage that raises them. The stage decides the scope: connector
/// kinds are fatal for a pipeline run, data kinds drop one row, persistence kinds drop one record.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration Errors
    ConfigurationError,

    // Connection Errors
    SourceConnectionFailed,
    AuthenticationFailed,

    // Network & Query Errors
    NetworkTimeout,
    SourceIoError,
    SourceQueryFailed,

    // Security Errors
    SecurityViolation,

    // Data & Transformation Errors
    ValidationError,
    InvalidData,
    ConversionError,

    // Persistence Errors
    PersistenceError,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // State & Workflow Errors
    InvalidState,
    PipelineWorkerPanic,

    // Unknown / Uncategorized
    Unknown,
}

impl EtlError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the dynamic detail if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns a single-line message made of the description and detail.
    ///
    /// This is the text recorded in [`crate::types::RecordError`] and in fatal failure reports,
    /// so it never contains locations or backtraces.
    pub fn message(&self) -> String {
        match self.detail() {
            Some(detail) => format!("{}: {detail}", self.description()),
            None => self.description().to_owned(),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        &self.payload.backtrace
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn with_error_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            write!(f, "\n  Detail:")?;
            for line in detail.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        let backtrace = payload.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            write!(f, "\n  Backtrace:")?;
            for line in backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates an [`EtlError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`EtlError`] from an error kind, static description and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts configuration validation failures to [`ErrorKind::ConfigurationError`].
impl From<ValidationError> for EtlError {
    #[track_caller]
    fn from(err: ValidationError) -> EtlError {
        EtlError::with_error_source(
            ErrorKind::ConfigurationError,
            "Invalid configuration",
            err,
        )
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::with_error_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

/// Maps [`serde_json::Error`] to [`ErrorKind::DeserializationError`] unless it is an I/O failure.
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::with_error_source(kind, description, err)
    }
}

/// Maps [`csv::Error`] to [`ErrorKind::SourceIoError`] for read failures and
/// [`ErrorKind::DeserializationError`] for malformed records.
impl From<csv::Error> for EtlError {
    #[track_caller]
    fn from(err: csv::Error) -> EtlError {
        let (kind, description) = match err.kind() {
            csv::ErrorKind::Io(_) => (ErrorKind::SourceIoError, "CSV file read failed"),
            _ => (ErrorKind::DeserializationError, "CSV record parsing failed"),
        };

        EtlError::with_error_source(kind, description, err)
    }
}

/// Maps [`reqwest::Error`] raised while talking to a SQL bridge.
///
/// Timeouts become [`ErrorKind::NetworkTimeout`], connect failures
/// [`ErrorKind::SourceConnectionFailed`] and undecodable bodies
/// [`ErrorKind::DeserializationError`]. Status based classification is done by the bridge client.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = if err.is_timeout() {
            (ErrorKind::NetworkTimeout, "SQL bridge request timed out")
        } else if err.is_connect() {
            (ErrorKind::SourceConnectionFailed, "SQL bridge is unreachable")
        } else if err.is_decode() {
            (
                ErrorKind::DeserializationError,
                "SQL bridge response could not be decoded",
            )
        } else {
            (ErrorKind::SourceIoError, "SQL bridge request failed")
        };

        EtlError::with_error_source(kind, description, err)
    }
}

impl From<std::num::ParseIntError> for EtlError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> EtlError {
        EtlError::with_error_source(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

impl From<std::num::ParseFloatError> for EtlError {
    #[track_caller]
    fn from(err: std::num::ParseFloatError) -> EtlError {
        EtlError::with_error_source(ErrorKind::ConversionError, "Float parsing failed", err)
    }
}

impl From<chrono::ParseError> for EtlError {
    #[track_caller]
    fn from(err: chrono::ParseError) -> EtlError {
        EtlError::with_error_source(ErrorKind::ConversionError, "Datetime parsing failed", err)
    }
}

/// Converts [`sqlx::Error`] raised by the catalog store to [`ErrorKind::PersistenceError`].
///
/// Pool failures map to [`ErrorKind::SourceConnectionFailed`] since the whole batch is affected.
impl From<sqlx::Error> for EtlError {
    #[track_caller]
    fn from(err: sqlx::Error) -> EtlError {
        let kind = match &err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                ErrorKind::SourceConnectionFailed
            }
            sqlx::Error::Io(_) => ErrorKind::IoError,
            _ => ErrorKind::PersistenceError,
        };

        EtlError::with_error_source(kind, "Catalog store operation failed", err)
    }
}

impl From<sqlx::migrate::MigrateError> for EtlError {
    #[track_caller]
    fn from(err: sqlx::migrate::MigrateError) -> EtlError {
        EtlError::with_error_source(
            ErrorKind::PersistenceError,
            "Catalog store migrations failed",
            err,
        )
    }
}

impl From<tokio::time::error::Elapsed> for EtlError {
    #[track_caller]
    fn from(err: tokio::time::error::Elapsed) -> EtlError {
        EtlError::with_error_source(ErrorKind::NetworkTimeout, "Operation timed out", err)
    }
}
