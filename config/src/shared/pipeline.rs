use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::shared::ValidationError;
use crate::shared::base::require_non_blank;

/// Chunking of extracted rows within one pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum number of rows extracted, processed and imported as one unit.
    #[serde(default = "default_chunk_size")]
    pub size: usize,
}

impl ChunkConfig {
    pub const DEFAULT_SIZE: usize = 500;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.size == 0 {
            return Err(ValidationError::invalid("chunk.size", "must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
        }
    }
}

/// Deadlines for the blocking calls of a pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_ms: u64,
    /// Deadline of a single chunk extraction.
    #[serde(default = "default_extract_timeout_ms")]
    pub extract_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_ms: u64,
    /// Deadline of a single store lookup or write.
    #[serde(default = "default_store_timeout_ms")]
    pub store_ms: u64,
}

impl TimeoutConfig {
    pub const DEFAULT_CONNECT_MS: u64 = 30_000;
    pub const DEFAULT_EXTRACT_MS: u64 = 120_000;
    pub const DEFAULT_CLOSE_MS: u64 = 10_000;
    pub const DEFAULT_STORE_MS: u64 = 60_000;

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn extract(&self) -> Duration {
        Duration::from_millis(self.extract_ms)
    }

    pub fn close(&self) -> Duration {
        Duration::from_millis(self.close_ms)
    }

    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("timeouts.connect_ms", self.connect_ms),
            ("timeouts.extract_ms", self.extract_ms),
            ("timeouts.close_ms", self.close_ms),
            ("timeouts.store_ms", self.store_ms),
        ] {
            if value == 0 {
                return Err(ValidationError::invalid(field, "must be greater than 0"));
            }
        }

        Ok(())
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: Self::DEFAULT_CONNECT_MS,
            extract_ms: Self::DEFAULT_EXTRACT_MS,
            close_ms: Self::DEFAULT_CLOSE_MS,
            store_ms: Self::DEFAULT_STORE_MS,
        }
    }
}

/// Exponential backoff for retryable connect failures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of connect attempts, including the first one.
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

    /// Delay before attempt number `attempt + 1`, doubling from the initial delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::invalid(
                "connect_retry.max_attempts",
                "must be greater than 0",
            ));
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::invalid(
                "connect_retry.initial_delay_ms",
                "must not exceed `max_delay_ms`",
            ));
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: Self::DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: Self::DEFAULT_MAX_DELAY_MS,
        }
    }
}

/// One single-entity pipeline.
#[derive(Clone, Debug, Deserialize)]
pub struct EntityPipelineConfig {
    /// Canonical entity synced by this pipeline, e.g. `inventory`.
    pub entity: String,
    /// Name of the source in [`crate::shared::SyncConfig::sources`].
    pub source: String,
    /// Explicit query; generated from the field definitions when absent.
    #[serde(default)]
    pub query: Option<String>,
    /// Maximum number of rows to extract in total.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Positional query parameters.
    #[serde(default)]
    pub params: Vec<Value>,
    /// Values for derived fields that no source column provides, e.g. `pricing_type`.
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub chunk: ChunkConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub connect_retry: RetryConfig,
    /// Validate and count without writing.
    #[serde(default)]
    pub dry_run: bool,
}

impl EntityPipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("entity", &self.entity)?;
        require_non_blank("source", &self.source)?;

        if let Some(query) = &self.query {
            require_non_blank("query", query)?;
        }

        if self.limit == Some(0) {
            return Err(ValidationError::invalid("limit", "must be greater than 0"));
        }

        self.chunk.validate()?;
        self.timeouts.validate()?;
        self.connect_retry.validate()
    }
}

/// Fan-out settings for running several entity pipelines together.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Maximum number of entity pipelines running at the same time.
    #[serde(default = "default_max_workers")]
    pub max_workers: u16,
}

impl ParallelConfig {
    pub const DEFAULT_MAX_WORKERS: u16 = 4;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_workers == 0 {
            return Err(ValidationError::invalid(
                "parallel.max_workers",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
        }
    }
}

fn default_chunk_size() -> usize {
    ChunkConfig::DEFAULT_SIZE
}

fn default_connect_timeout_ms() -> u64 {
    TimeoutConfig::DEFAULT_CONNECT_MS
}

fn default_extract_timeout_ms() -> u64 {
    TimeoutConfig::DEFAULT_EXTRACT_MS
}

fn default_close_timeout_ms() -> u64 {
    TimeoutConfig::DEFAULT_CLOSE_MS
}

fn default_store_timeout_ms() -> u64 {
    TimeoutConfig::DEFAULT_STORE_MS
}

fn default_retry_max_attempts() -> u32 {
    RetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_retry_initial_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_DELAY_MS
}

fn default_retry_max_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_DELAY_MS
}

fn default_max_workers() -> u16 {
    ParallelConfig::DEFAULT_MAX_WORKERS
}
