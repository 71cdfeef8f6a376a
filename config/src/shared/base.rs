use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A mandatory setting is absent or empty.
    #[error("`{field}` must be set")]
    MissingField { field: String },
    /// A setting is present but violates a constraint.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// A pipeline points at a source name that is not configured.
    #[error("pipeline for entity `{entity}` references unknown source `{source_name}`")]
    UnknownSource { entity: String, source_name: String },
    /// Two pipelines sync the same entity.
    #[error("entity `{0}` is configured by more than one pipeline")]
    DuplicatePipeline(String),
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    /// Prefixes the offending field path, e.g. `host` becomes `sources.erp.host`.
    pub fn with_prefix(self, prefix: &str) -> Self {
        match self {
            Self::MissingField { field } => Self::MissingField {
                field: format!("{prefix}.{field}"),
            },
            Self::InvalidFieldValue { field, constraint } => Self::InvalidFieldValue {
                field: format!("{prefix}.{field}"),
                constraint,
            },
            other => other,
        }
    }
}

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::missing(field));
    }

    Ok(())
}

/// Checks that `url` is an absolute `http(s)` URL with a host part.
pub(crate) fn require_http_url(field: &str, url: &str) -> Result<(), ValidationError> {
    require_non_blank(field, url)?;

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ValidationError::invalid(field, "must start with http:// or https://"))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid(field, "must contain a valid host"));
    }

    Ok(())
}

/// Checks an allow-list entry: `TABLE`, `SCHEMA.TABLE`, `SCHEMA/TABLE` or `SCHEMA.*`.
pub(crate) fn validate_allowed_tables(
    field: &str,
    entries: &[String],
) -> Result<(), ValidationError> {
    if entries.is_empty() {
        return Err(ValidationError::invalid(
            field,
            "at least one table must be allowed",
        ));
    }

    for entry in entries {
        let mut parts = entry.split(['.', '/']);
        let valid = match (parts.next(), parts.next(), parts.next()) {
            (Some(table), None, None) => is_identifier(table),
            (Some(schema), Some(table), None) => {
                is_identifier(schema) && (table == "*" || is_identifier(table))
            }
            _ => false,
        };

        if !valid {
            return Err(ValidationError::invalid(
                field,
                format!("`{entry}` is not a valid table or schema pattern"),
            ));
        }
    }

    Ok(())
}

/// Identifier characters accepted across the legacy sources, including the `#@$` used by
/// midrange object names.
pub(crate) fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '#' | '@' | '$'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_url_requires_scheme_and_host() {
        assert!(require_http_url("url", "http://bridge:8080/api").is_ok());
        assert!(require_http_url("url", "bridge:8080").is_err());
        assert!(require_http_url("url", "https:///path").is_err());
        assert_eq!(
            require_http_url("url", "  "),
            Err(ValidationError::missing("url"))
        );
    }

    #[test]
    fn allowed_tables_accept_schema_wildcards() {
        let entries = vec!["ITEMMAST".to_string(), "CATLIB.*".to_string(), "CATLIB/PRICES".to_string()];
        assert!(validate_allowed_tables("allowed_tables", &entries).is_ok());

        let bad = vec!["CATLIB.ITEMS.EXTRA".to_string()];
        assert!(validate_allowed_tables("allowed_tables", &bad).is_err());
        assert!(validate_allowed_tables("allowed_tables", &[]).is_err());
    }

    #[test]
    fn prefix_is_applied_to_field_errors() {
        let err = ValidationError::missing("host").with_prefix("sources.erp");
        assert_eq!(err.to_string(), "`sources.erp.host` must be set");
    }
}
