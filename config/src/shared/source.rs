use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::{
    ErpConnectionConfig, FileSourceConfig, OdbcConnectionConfig, ValidationError,
};

/// One external system variant the catalog can be synchronized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Midrange ERP database reached through the SQL bridge.
    Erp,
    /// Desktop database product reached through an ODBC bridge.
    Odbc,
    /// Local flat files.
    File,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Erp, SourceType::Odbc, SourceType::File];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Erp => "erp",
            SourceType::Odbc => "odbc",
            SourceType::File => "file",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings of one named source, tagged by `type`.
///
/// ```yaml
/// sources:
///   erp:
///     type: erp
///     bridge_url: http://bridge:8080
///     host: erp.internal
///     library: CATLIB
///     username: SYNC
///     password: secret
///     allowed_tables: ["CATLIB.*"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    Erp(ErpConnectionConfig),
    Odbc(OdbcConnectionConfig),
    File(FileSourceConfig),
}

impl SourceConfig {
    pub fn source_type(&self) -> SourceType {
        match self {
            SourceConfig::Erp(_) => SourceType::Erp,
            SourceConfig::Odbc(_) => SourceType::Odbc,
            SourceConfig::File(_) => SourceType::File,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            SourceConfig::Erp(config) => config.validate(),
            SourceConfig::Odbc(config) => config.validate(),
            SourceConfig::File(config) => config.validate(),
        }
    }
}
