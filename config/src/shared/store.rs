use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;
use crate::shared::base::require_non_blank;

/// Session settings applied to every store connection.
const STORE_CONNECTION_OPTIONS: &[(&str, &str)] = &[
    ("application_name", "catalog_sync_store"),
    ("timezone", "UTC"),
    ("statement_timeout", "60000"),
    ("lock_timeout", "10000"),
];

/// Target store the importer writes to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-process store, mostly useful for dry runs and local testing.
    Memory,
    /// Postgres-backed store.
    Postgres(PgConnectionConfig),
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::Postgres(config) => config.validate(),
        }
    }
}

/// Connection settings for the Postgres store.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Name of the database.
    pub name: String,
    pub username: String,
    /// Sensitive and redacted in debug output.
    pub password: Option<SecretString>,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl PgConnectionConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("host", &self.host)?;
        require_non_blank("name", &self.name)?;
        require_non_blank("username", &self.username)?;

        if self.port == 0 {
            return Err(ValidationError::invalid("port", "must be greater than 0"));
        }

        if self.max_connections == 0 {
            return Err(ValidationError::invalid(
                "max_connections",
                "must be greater than 0",
            ));
        }

        self.tls.validate()
    }
}

/// TLS settings for store connections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Fails when TLS is enabled without trusted root certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::invalid(
                "tls.trusted_root_certs",
                "must be set when TLS is enabled",
            ));
        }

        Ok(())
    }
}

/// Converts a connection config into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options for the server without selecting a database.
    fn without_db(&self) -> Output;

    /// Options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .ssl_mode(ssl_mode)
            .options(STORE_CONNECTION_OPTIONS.iter().copied());

        if self.tls.enabled {
            options = options.ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}

fn default_max_connections() -> u32 {
    PgConnectionConfig::DEFAULT_MAX_CONNECTIONS
}
