use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;

use crate::shared::ValidationError;
use crate::shared::base::{require_http_url, require_non_blank, validate_allowed_tables};

/// Extensions accepted for native ODBC driver libraries.
const DRIVER_LIBRARY_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// Connection settings for the desktop database reached over ODBC.
///
/// Either `dsn` or the `driver`/`server`/`database` triple must be given, not both.
#[derive(Debug, Clone, Deserialize)]
pub struct OdbcConnectionConfig {
    /// Base URL of the bridge service.
    pub bridge_url: String,
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    /// Absolute path of the driver library on the bridge host.
    #[serde(default)]
    pub driver_path: Option<PathBuf>,
    pub username: String,
    /// Sensitive and redacted in debug output.
    pub password: Option<SecretString>,
    #[serde(default)]
    pub allowed_tables: Vec<String>,
}

impl OdbcConnectionConfig {
    /// Validates the connection settings without performing any I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_http_url("bridge_url", &self.bridge_url)?;

        let has_dsn = self.dsn.as_deref().is_some_and(|dsn| !dsn.trim().is_empty());
        let driver_parts = [
            ("driver", &self.driver),
            ("server", &self.server),
            ("database", &self.database),
        ];
        let any_driver_part = driver_parts.iter().any(|(_, value)| value.is_some());

        match (has_dsn, any_driver_part) {
            (true, true) => {
                return Err(ValidationError::invalid(
                    "dsn",
                    "`dsn` and `driver`/`server`/`database` are mutually exclusive",
                ));
            }
            (false, false) => return Err(ValidationError::missing("dsn")),
            (false, true) => {
                for (field, value) in driver_parts {
                    require_non_blank(field, value.as_deref().unwrap_or_default())?;
                }
            }
            (true, false) => {}
        }

        if let Some(driver_path) = &self.driver_path {
            if !driver_path.is_absolute() {
                return Err(ValidationError::invalid(
                    "driver_path",
                    "must be an absolute path",
                ));
            }

            let extension = driver_path
                .extension()
                .and_then(|extension| extension.to_str())
                .unwrap_or_default();
            if !DRIVER_LIBRARY_EXTENSIONS.contains(&extension) {
                return Err(ValidationError::invalid(
                    "driver_path",
                    format!("must point to a driver library ({})", DRIVER_LIBRARY_EXTENSIONS.join(", ")),
                ));
            }
        }

        require_non_blank("username", &self.username)?;
        match &self.password {
            Some(password) if !password.expose_secret().is_empty() => {}
            _ => return Err(ValidationError::missing("password")),
        }

        validate_allowed_tables("allowed_tables", &self.allowed_tables)
    }
}
