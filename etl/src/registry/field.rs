use catalog_config::shared::SourceType;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::registry::transforms::TransformFn;

/// Type of a canonical field, driving coercion in the typed model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Time,
    DateTime,
    /// One-to-many sub-records, described by `nested_fields` or a complex mapping.
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::DateTime => "datetime",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a canonical field in one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFieldInfo {
    pub field_name: String,
    pub table_name: String,
}

impl ExternalFieldInfo {
    pub fn new(table_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            table_name: table_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformDirection {
    /// Source to canonical.
    Import,
    /// Canonical to source.
    Export,
}

/// A named transform applied to `source_field` to produce `target_field`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTransformation {
    pub direction: TransformDirection,
    pub source_field: String,
    pub target_field: String,
    pub transform_fn: TransformFn,
}

/// Declarative description of one canonical field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub enum_values: Option<Vec<Value>>,
    /// Shape of the elements of an array field.
    pub nested_fields: Option<Vec<FieldDefinition>>,
    pub external_fields: BTreeMap<SourceType, ExternalFieldInfo>,
    pub transformations: Vec<FieldTransformation>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            enum_values: None,
            nested_fields: None,
            external_fields: BTreeMap::new(),
            transformations: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_enum_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_nested_fields(mut self, fields: Vec<FieldDefinition>) -> Self {
        self.nested_fields = Some(fields);
        self
    }

    /// Maps the field to `table.column` in `source_type`.
    pub fn mapped(
        mut self,
        source_type: SourceType,
        table_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        self.external_fields.insert(
            source_type,
            ExternalFieldInfo::new(table_name, field_name),
        );
        self
    }

    /// Adds an import transformation reading `source_field` from the raw row.
    pub fn transform_from(mut self, source_field: impl Into<String>, transform_fn: TransformFn) -> Self {
        self.transformations.push(FieldTransformation {
            direction: TransformDirection::Import,
            source_field: source_field.into(),
            target_field: self.name.clone(),
            transform_fn,
        });
        self
    }

    /// Adds an import transformation for the external column of every source mapped so far.
    pub fn transform_imports(mut self, transform_fn: TransformFn) -> Self {
        let columns: Vec<String> = self
            .external_fields
            .values()
            .map(|external| external.field_name.clone())
            .collect();

        for column in columns {
            self = self.transform_from(column, transform_fn.clone());
        }

        self
    }

    /// Returns the external location of this field in `source_type`, if it is extracted there.
    pub fn external_field(&self, source_type: SourceType) -> Option<&ExternalFieldInfo> {
        self.external_fields.get(&source_type)
    }

    /// Returns the import transformations producing this field.
    pub fn import_transformations(&self) -> impl Iterator<Item = &FieldTransformation> {
        self.transformations.iter().filter(|transformation| {
            transformation.direction == TransformDirection::Import
                && transformation.target_field == self.name
        })
    }

    /// Returns `true` for fields that are not extracted as a flat column.
    pub fn is_nested(&self) -> bool {
        matches!(self.field_type, FieldType::Array | FieldType::Object)
    }
}
