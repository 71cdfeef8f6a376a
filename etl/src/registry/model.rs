//! Typed validation models derived from field definitions.
//!
//! A [`TypedModel`] is a per-field dispatch table: every field carries the coercion function of
//! its [`FieldType`] together with its required flag and allowed values. Models are derived once
//! per entity and cached by the registry.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::registry::entity::EntityFieldDefinitions;
use crate::registry::field::{FieldDefinition, FieldType};
use crate::types::Record;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H.%M.%S", "%H:%M"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d-%H.%M.%S"];

/// Case-insensitive boolean token sets used by boolean coercion.
#[derive(Debug, Clone)]
pub struct BooleanTokens {
    truthy: HashSet<String>,
    falsy: HashSet<String>,
}

impl BooleanTokens {
    pub fn new<I, S>(truthy: I, falsy: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalize = |tokens: I| -> HashSet<String> {
            tokens
                .into_iter()
                .map(|token| token.as_ref().trim().to_lowercase())
                .collect()
        };

        Self {
            truthy: normalize(truthy),
            falsy: normalize(falsy),
        }
    }

    pub fn parse(&self, token: &str) -> Option<bool> {
        let token = token.trim().to_lowercase();
        if self.truthy.contains(&token) {
            Some(true)
        } else if self.falsy.contains(&token) {
            Some(false)
        } else {
            None
        }
    }
}

impl Default for BooleanTokens {
    fn default() -> Self {
        Self::new(
            ["y", "yes", "1", "true", "t"],
            ["n", "no", "0", "false", "f"],
        )
    }
}

/// Signature of the per-type coercion functions.
type Coercer = fn(&Value, &BooleanTokens) -> Result<Value, String>;

/// Validator of one canonical field.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    name: String,
    field_type: FieldType,
    required: bool,
    enum_values: Option<Vec<Value>>,
    nested: Option<Vec<FieldValidator>>,
    coerce: Coercer,
}

impl FieldValidator {
    fn from_definition(field: &FieldDefinition) -> Self {
        Self {
            name: field.name.clone(),
            field_type: field.field_type,
            required: field.required,
            enum_values: field.enum_values.clone(),
            nested: field
                .nested_fields
                .as_ref()
                .map(|fields| fields.iter().map(FieldValidator::from_definition).collect()),
            coerce: coercer_for(field.field_type),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Coerces `value` and checks the enum membership. `Null` is returned as is.
    pub fn check(&self, value: &Value, tokens: &BooleanTokens) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let mut coerced = (self.coerce)(value, tokens)
            .map_err(|reason| format!("field `{}` {reason}", self.name))?;

        if let (Some(nested), Value::Array(items)) = (&self.nested, &mut coerced) {
            for item in items.iter_mut() {
                let Value::Object(object) = item else {
                    return Err(format!("field `{}` must contain objects", self.name));
                };
                validate_fields(nested, object, tokens)?;
            }
        }

        if let Some(values) = &self.enum_values {
            if !values.contains(&coerced) {
                let allowed: Vec<String> = values.iter().map(Value::to_string).collect();
                return Err(format!(
                    "field `{}` value {coerced} is not one of [{}]",
                    self.name,
                    allowed.join(", ")
                ));
            }
        }

        Ok(coerced)
    }
}

/// Validation schema of one entity.
#[derive(Debug, Clone)]
pub struct TypedModel {
    entity: String,
    fields: Vec<FieldValidator>,
}

impl TypedModel {
    pub fn from_definitions(definitions: &EntityFieldDefinitions) -> Self {
        Self {
            entity: definitions.entity().to_owned(),
            fields: definitions
                .fields()
                .iter()
                .map(FieldValidator::from_definition)
                .collect(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[FieldValidator] {
        &self.fields
    }

    /// Coerces every field of `record` in place, then enforces required and enum rules.
    ///
    /// All failing fields of the record are reported together.
    pub fn validate(&self, record: &mut Record, tokens: &BooleanTokens) -> Result<(), String> {
        validate_fields(&self.fields, record, tokens)
    }
}

fn validate_fields(
    fields: &[FieldValidator],
    record: &mut Map<String, Value>,
    tokens: &BooleanTokens,
) -> Result<(), String> {
    let mut failures = Vec::new();

    for field in fields {
        match record.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    failures.push(format!("missing required field `{}`", field.name));
                }
            }
            Some(value) => match field.check(value, tokens) {
                Ok(coerced) => {
                    record.insert(field.name.clone(), coerced);
                }
                Err(reason) => failures.push(reason),
            },
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.join("; "))
    }
}

fn coercer_for(field_type: FieldType) -> Coercer {
    match field_type {
        FieldType::String => coerce_string,
        FieldType::Integer => coerce_integer,
        FieldType::Float => coerce_float,
        FieldType::Boolean => coerce_boolean,
        FieldType::Date => coerce_date,
        FieldType::Time => coerce_time,
        FieldType::DateTime => coerce_datetime,
        FieldType::Array => coerce_array,
        FieldType::Object => coerce_object,
    }
}

fn coerce_string(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value.clone()),
        Value::Number(number) => Ok(Value::String(number.to_string())),
        Value::Bool(flag) => Ok(Value::String(flag.to_string())),
        _ => Err("must be a string".to_string()),
    }
}

fn coerce_integer(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    match value {
        Value::Number(number) if number.is_i64() || number.is_u64() => Ok(value.clone()),
        Value::Number(number) => match number.as_f64() {
            Some(n) if n.fract() == 0.0 && n.is_finite() => Ok(Value::from(n as i64)),
            _ => Err(format!("value {number} is not an integer")),
        },
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("value `{text}` is not an integer")),
        _ => Err("must be an integer".to_string()),
    }
}

fn coerce_float(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|n| n.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("value {value} is not a number"))
}

fn coerce_boolean(value: &Value, tokens: &BooleanTokens) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(text) => tokens
            .parse(text)
            .map(Value::Bool)
            .ok_or_else(|| format!("has unrecognized boolean token `{text}`")),
        Value::Number(number) => tokens
            .parse(&number.to_string())
            .map(Value::Bool)
            .ok_or_else(|| format!("has unrecognized boolean token `{number}`")),
        _ => Err("must be a boolean".to_string()),
    }
}

fn coerce_date(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    let text = value_text(value)?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
        .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
        .ok_or_else(|| format!("value `{text}` is not a date"))
}

fn coerce_time(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    let text = value_text(value)?;
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&text, format).ok())
        .map(|time| Value::String(time.format("%H:%M:%S").to_string()))
        .ok_or_else(|| format!("value `{text}` is not a time"))
}

fn coerce_datetime(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    let text = value_text(value)?;
    if let Ok(datetime) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Value::String(datetime.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string()));
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
        .map(|datetime| Value::String(datetime.format("%Y-%m-%dT%H:%M:%S").to_string()))
        .ok_or_else(|| format!("value `{text}` is not a datetime"))
}

fn coerce_array(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    match value {
        Value::Array(_) => Ok(value.clone()),
        _ => Err("must be an array".to_string()),
    }
}

fn coerce_object(value: &Value, _: &BooleanTokens) -> Result<Value, String> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        _ => Err("must be an object".to_string()),
    }
}

fn value_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(text) => Ok(text.trim().to_owned()),
        Value::Number(number) => Ok(number.to_string()),
        _ => Err("must be a string".to_string()),
    }
}
