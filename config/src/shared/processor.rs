use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::shared::ValidationError;

/// Settings of the transform/validate stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default)]
    pub boolean: BooleanTokensConfig,
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.boolean.validate()
    }
}

/// Source tokens accepted as boolean values, compared case-insensitively after trimming.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BooleanTokensConfig {
    #[serde(default = "default_truthy")]
    pub truthy: Vec<String>,
    #[serde(default = "default_falsy")]
    pub falsy: Vec<String>,
}

impl BooleanTokensConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.truthy.is_empty() {
            return Err(ValidationError::invalid("boolean.truthy", "must not be empty"));
        }

        if self.falsy.is_empty() {
            return Err(ValidationError::invalid("boolean.falsy", "must not be empty"));
        }

        let truthy: HashSet<String> = self
            .truthy
            .iter()
            .map(|token| token.trim().to_lowercase())
            .collect();
        if let Some(token) = self
            .falsy
            .iter()
            .find(|token| truthy.contains(&token.trim().to_lowercase()))
        {
            return Err(ValidationError::invalid(
                "boolean.falsy",
                format!("token `{token}` is also listed as truthy"),
            ));
        }

        Ok(())
    }
}

impl Default for BooleanTokensConfig {
    fn default() -> Self {
        Self {
            truthy: default_truthy(),
            falsy: default_falsy(),
        }
    }
}

fn default_truthy() -> Vec<String> {
    ["y", "yes", "1", "true", "t"].map(String::from).to_vec()
}

fn default_falsy() -> Vec<String> {
    ["n", "no", "0", "false", "f"].map(String::from).to_vec()
}
