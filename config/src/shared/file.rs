use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::shared::ValidationError;
use crate::shared::base::is_identifier;

/// Layout of a flat file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Delimited text with an optional header row.
    Csv,
    /// One JSON object per line.
    JsonLines,
    /// A single JSON array of objects.
    Json,
}

impl FileFormat {
    /// Infers the format from a file extension.
    pub fn from_path(path: &Path) -> Option<FileFormat> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" | "txt" | "tsv" => Some(FileFormat::Csv),
            "jsonl" | "ndjson" => Some(FileFormat::JsonLines),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

/// Character encoding of legacy flat files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEncoding {
    #[default]
    Utf8,
    /// ISO-8859-1, common in exports from older desktop tools.
    Latin1,
}

/// Flat-file source: every logical table is backed by one file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileSourceConfig {
    /// Logical table name to file path. The table names double as the allow-list.
    pub tables: BTreeMap<String, PathBuf>,
    /// Explicit format; inferred per file from the extension when absent.
    #[serde(default)]
    pub format: Option<FileFormat>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_has_header")]
    pub has_header: bool,
    #[serde(default)]
    pub encoding: FileEncoding,
}

impl FileSourceConfig {
    pub const DEFAULT_DELIMITER: char = ',';

    /// Returns the format used for `path`.
    pub fn format_for(&self, path: &Path) -> Option<FileFormat> {
        self.format.or_else(|| FileFormat::from_path(path))
    }

    /// Validates the file settings. File existence is checked on connect, not here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tables.is_empty() {
            return Err(ValidationError::invalid(
                "tables",
                "at least one table must be configured",
            ));
        }

        for (table, path) in &self.tables {
            let field = format!("tables.{table}");
            if !is_identifier(table) {
                return Err(ValidationError::invalid(field, "table name is not a valid identifier"));
            }

            if path.as_os_str().is_empty() {
                return Err(ValidationError::missing(field));
            }

            if self.format_for(path).is_none() {
                return Err(ValidationError::invalid(
                    field,
                    "cannot infer the file format from the extension, set `format` explicitly",
                ));
            }
        }

        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(ValidationError::invalid(
                "delimiter",
                "must be a single ASCII character other than a quote or newline",
            ));
        }

        Ok(())
    }
}

fn default_delimiter() -> char {
    FileSourceConfig::DEFAULT_DELIMITER
}

fn default_has_header() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(path: &str) -> FileSourceConfig {
        FileSourceConfig {
            tables: BTreeMap::from([("INVENTORY".to_string(), PathBuf::from(path))]),
            format: None,
            delimiter: ',',
            has_header: true,
            encoding: FileEncoding::Utf8,
        }
    }

    #[test]
    fn format_is_inferred_from_extension() {
        assert!(config_with("/data/inventory.csv").validate().is_ok());
        assert!(config_with("/data/inventory.ndjson").validate().is_ok());
        assert!(config_with("/data/inventory.xlsx").validate().is_err());
    }

    #[test]
    fn explicit_format_overrides_extension() {
        let mut config = config_with("/data/inventory.dat");
        config.format = Some(FileFormat::Csv);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let mut config = config_with("/data/inventory.csv");
        config.delimiter = '§';
        assert!(config.validate().is_err());
    }
}
