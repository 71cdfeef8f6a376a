use catalog_config::shared::{ProcessorConfig, SourceType};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::processor::base::{Processor, ValidationOutcome};
use crate::registry::FieldRegistry;
use crate::registry::entity::EntityFieldDefinitions;
use crate::registry::field::FieldDefinition;
use crate::registry::model::{BooleanTokens, TypedModel};
use crate::registry::transforms::TransformContext;
use crate::types::{Record, RecordError, RecordRef, Row};

/// Key of a complex sub-record holding the mapping key.
const SUB_RECORD_TYPE: &str = "type";
/// Key of a complex sub-record holding the column value.
const SUB_RECORD_VALUE: &str = "value";

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Registry driven processor for one entity read from one source type.
///
/// Each field is resolved in order: an import transformation whose source column is present in
/// the row, the field's external column, then the run context for fields the source does not
/// carry. Blank values count as absent and are replaced by the field default when one exists.
#[derive(Debug, Clone)]
pub struct CatalogProcessor {
    definitions: Arc<EntityFieldDefinitions>,
    model: Arc<TypedModel>,
    source_type: SourceType,
    context: Map<String, Value>,
    tokens: BooleanTokens,
    key_column: Option<String>,
}

impl CatalogProcessor {
    pub fn new(
        registry: &FieldRegistry,
        entity: &str,
        source_type: SourceType,
        context: Map<String, Value>,
        config: &ProcessorConfig,
    ) -> EtlResult<Self> {
        let definitions = registry.get(entity)?;
        if !definitions.supports(source_type) {
            bail!(
                ErrorKind::ConfigurationError,
                "Entity has no layout for the source type",
                format!("{entity} from {}", source_type.as_str())
            );
        }

        let key_column = definitions
            .get_field_by_name(definitions.primary_key())
            .and_then(|field| field.external_field(source_type))
            .map(|external| external.field_name.clone());

        Ok(Self {
            model: registry.create_typed_model(entity)?,
            definitions,
            source_type,
            context,
            tokens: BooleanTokens::new(&config.boolean.truthy, &config.boolean.falsy),
            key_column,
        })
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Returns the reference of a raw row: its primary-key value, or its position.
    pub fn record_ref(&self, row: &Row, position: usize) -> RecordRef {
        let key = self.key_column.as_ref().and_then(|column| row.get(column));
        RecordRef::from_key_value(key, position)
    }

    fn field_value(
        &self,
        field: &FieldDefinition,
        row: &Row,
        ctx: &TransformContext<'_>,
    ) -> EtlResult<Option<Value>> {
        for transformation in field.import_transformations() {
            if let Some(raw) = row.get(&transformation.source_field) {
                return transformation.transform_fn.apply(raw, ctx).map(Some);
            }
        }

        match field.external_field(self.source_type) {
            Some(external) => Ok(row.get(&external.field_name).cloned()),
            None => Ok(self.context.get(&field.name).cloned()),
        }
    }

    /// Applies transformations, external mappings, context values and defaults to one row.
    fn map_row(&self, row: &Row) -> EtlResult<Record> {
        let ctx = TransformContext {
            row,
            context: &self.context,
            source_type: self.source_type,
        };

        let mut record = Record::new();
        for field in self.definitions.fields() {
            if field.is_nested() {
                continue;
            }

            let value = self
                .field_value(field, row, &ctx)?
                .filter(|value| !is_blank(value))
                .or_else(|| field.default.clone());

            if let Some(value) = value {
                record.insert(field.name.clone(), value);
            }
        }

        for complex in self.definitions.complex_fields() {
            let items: Vec<Value> = complex
                .columns_for(self.source_type)
                .iter()
                .filter_map(|column| {
                    let value = row
                        .get(&column.external.field_name)
                        .filter(|value| !is_blank(value))?;
                    let value = match value {
                        Value::String(text) => Value::String(text.trim().to_owned()),
                        other => other.clone(),
                    };

                    let mut item = Map::new();
                    item.insert(SUB_RECORD_TYPE.to_owned(), Value::from(column.mapping_key.clone()));
                    item.insert(SUB_RECORD_VALUE.to_owned(), value);
                    Some(Value::Object(item))
                })
                .collect();

            if !items.is_empty() {
                record.insert(complex.field_name.clone(), Value::Array(items));
            }
        }

        Ok(record)
    }
}

impl Processor for CatalogProcessor {
    fn entity(&self) -> &str {
        self.definitions.entity()
    }

    fn process(&self, rows: &[Row]) -> EtlResult<Vec<Record>> {
        rows.iter().map(|row| self.map_row(row)).collect()
    }

    fn validate(&self, rows: &[Row]) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        for (index, row) in rows.iter().enumerate() {
            let record_ref = self.record_ref(row, index + 1);

            let mut record = match self.map_row(row) {
                Ok(record) => record,
                Err(err) => {
                    outcome.errors.push(RecordError::from_error(record_ref, &err));
                    continue;
                }
            };

            match self.model.validate(&mut record, &self.tokens) {
                Ok(()) => outcome.accept(record, index + 1),
                Err(reason) => outcome.errors.push(RecordError::new(record_ref, reason)),
            }
        }

        debug!(
            entity = self.definitions.entity(),
            rows = rows.len(),
            valid = outcome.records.len(),
            invalid = outcome.errors.len(),
            "validated chunk"
        );

        outcome
    }
}
