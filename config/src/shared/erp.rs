use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;
use crate::shared::base::{
    is_identifier, require_http_url, require_non_blank, validate_allowed_tables,
};

/// Longest object name (library, user profile) accepted by the midrange system.
const MAX_OBJECT_NAME_LEN: usize = 10;

/// How tables are qualified with their library in SQL sent to the ERP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErpNaming {
    /// `LIBRARY.TABLE`
    #[default]
    Sql,
    /// `LIBRARY/TABLE`
    System,
}

impl ErpNaming {
    pub fn separator(&self) -> char {
        match self {
            ErpNaming::Sql => '.',
            ErpNaming::System => '/',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErpNaming::Sql => "sql",
            ErpNaming::System => "system",
        }
    }
}

/// Connection settings for the midrange ERP database.
///
/// Queries are executed by a SQL bridge service which holds the native driver. This type
/// intentionally does not implement [`Serialize`] so the password cannot leak into serialized
/// forms.
#[derive(Debug, Clone, Deserialize)]
pub struct ErpConnectionConfig {
    /// Base URL of the bridge service.
    pub bridge_url: String,
    /// Host name of the ERP system.
    pub host: String,
    /// Database host server port.
    #[serde(default = "default_erp_port")]
    pub port: u16,
    /// Default library used for unqualified table names.
    pub library: String,
    /// User profile.
    pub username: String,
    /// Password of the user profile. Sensitive and redacted in debug output.
    pub password: Option<SecretString>,
    #[serde(default)]
    pub naming: ErpNaming,
    /// Tables or `LIBRARY.*` patterns that queries may reference.
    #[serde(default)]
    pub allowed_tables: Vec<String>,
}

impl ErpConnectionConfig {
    pub const DEFAULT_PORT: u16 = 8471;

    /// Validates the connection settings without performing any I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_http_url("bridge_url", &self.bridge_url)?;
        require_non_blank("host", &self.host)?;
        if self.host.chars().any(char::is_whitespace) {
            return Err(ValidationError::invalid("host", "must not contain whitespace"));
        }

        if self.port == 0 {
            return Err(ValidationError::invalid("port", "must be greater than 0"));
        }

        require_non_blank("library", &self.library)?;
        if !is_identifier(&self.library) || self.library.len() > MAX_OBJECT_NAME_LEN {
            return Err(ValidationError::invalid(
                "library",
                format!("must be an object name of at most {MAX_OBJECT_NAME_LEN} characters"),
            ));
        }

        require_non_blank("username", &self.username)?;
        if self.username.len() > MAX_OBJECT_NAME_LEN {
            return Err(ValidationError::invalid(
                "username",
                format!("must be at most {MAX_OBJECT_NAME_LEN} characters"),
            ));
        }

        match &self.password {
            Some(password) if !password.expose_secret().is_empty() => {}
            _ => return Err(ValidationError::missing("password")),
        }

        validate_allowed_tables("allowed_tables", &self.allowed_tables)
    }
}

fn default_erp_port() -> u16 {
    ErpConnectionConfig::DEFAULT_PORT
}
