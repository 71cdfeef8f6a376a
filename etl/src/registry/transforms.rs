//! Named transform functions referenced by field definitions.

use catalog_config::shared::SourceType;
use serde_json::{Map, Value};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::Row;

/// Context key selecting which price column feeds the canonical `price` field.
pub const PRICING_TYPE_KEY: &str = "pricing_type";

/// Everything a transform may read besides the value it transforms.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub row: &'a Row,
    /// Run-level values, e.g. `pricing_type`.
    pub context: &'a Map<String, Value>,
    pub source_type: SourceType,
}

/// A transform applied while importing a raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformFn {
    /// Strips surrounding whitespace from strings.
    Trim,
    /// Trims and upper-cases strings.
    Upper,
    /// Parses an integer. Non-numeric, blank and negative values become `0`.
    ClampNonNegativeInt,
    /// Picks the jobber or export price column according to the run's `pricing_type`.
    PriceByPricingType { jobber: String, export: String },
    /// Normalizes `Y`/`N`, `Yes`/`No` and desktop database `-1`/`0` flags to booleans.
    ///
    /// Unknown tokens are passed through so boolean coercion can report them.
    YesNoFlag,
}

impl TransformFn {
    pub fn name(&self) -> &'static str {
        match self {
            TransformFn::Trim => "trim",
            TransformFn::Upper => "upper",
            TransformFn::ClampNonNegativeInt => "clamp_non_negative_int",
            TransformFn::PriceByPricingType { .. } => "price_by_pricing_type",
            TransformFn::YesNoFlag => "yes_no_flag",
        }
    }

    pub fn apply(&self, value: &Value, ctx: &TransformContext<'_>) -> EtlResult<Value> {
        match self {
            TransformFn::Trim => Ok(map_string(value, |value| value.trim().to_owned())),
            TransformFn::Upper => Ok(map_string(value, |value| value.trim().to_uppercase())),
            TransformFn::ClampNonNegativeInt => Ok(Value::from(clamp_non_negative_int(value))),
            TransformFn::PriceByPricingType { jobber, export } => {
                price_by_pricing_type(ctx, jobber, export)
            }
            TransformFn::YesNoFlag => Ok(yes_no_flag(value)),
        }
    }
}

fn map_string(value: &Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(value) => Value::String(f(value)),
        other => other.clone(),
    }
}

fn clamp_non_negative_int(value: &Value) -> i64 {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite()).map(|n| n.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(|n| n.trunc() as i64)
            })
        }
        _ => None,
    };

    parsed.filter(|n| *n >= 0).unwrap_or(0)
}

/// The price column is chosen only from an explicit `pricing_type`. A missing or unknown type
/// fails the row instead of falling back to either column.
fn price_by_pricing_type(ctx: &TransformContext<'_>, jobber: &str, export: &str) -> EtlResult<Value> {
    let pricing_type = match ctx.context.get(PRICING_TYPE_KEY) {
        Some(Value::String(pricing_type)) => pricing_type.trim().to_lowercase(),
        Some(_) | None => bail!(
            ErrorKind::ValidationError,
            "Price cannot be selected without a pricing type",
            "the run context does not define `pricing_type`"
        ),
    };

    let column = match pricing_type.as_str() {
        "jobber" => jobber,
        "export" => export,
        _ => bail!(
            ErrorKind::ValidationError,
            "Unknown pricing type",
            format!("`{pricing_type}` is neither `jobber` nor `export`")
        ),
    };

    Ok(ctx.row.get(column).cloned().unwrap_or(Value::Null))
}

fn yes_no_flag(value: &Value) -> Value {
    match value {
        Value::Number(number) => match number.as_i64() {
            Some(-1) | Some(1) => Value::Bool(true),
            Some(0) => Value::Bool(false),
            _ => value.clone(),
        },
        Value::String(text) => match text.trim().to_ascii_uppercase().as_str() {
            "Y" | "YES" | "-1" => Value::Bool(true),
            "N" | "NO" | "0" => Value::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}
