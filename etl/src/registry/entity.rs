use catalog_config::shared::SourceType;
use std::collections::{BTreeMap, HashSet};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::registry::field::{ExternalFieldInfo, FieldDefinition, FieldType};

/// One source table of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub table_name: String,
    pub is_primary: bool,
    /// Join predicate against previously declared tables, required on non-primary tables.
    pub join_condition: Option<String>,
}

impl TableInfo {
    pub fn primary(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            is_primary: true,
            join_condition: None,
        }
    }

    pub fn joined(table_name: impl Into<String>, join_condition: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            is_primary: false,
            join_condition: Some(join_condition.into()),
        }
    }
}

/// One flat source column feeding a complex field, labelled by `mapping_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexColumn {
    pub mapping_key: String,
    pub external: ExternalFieldInfo,
}

/// A canonical array field realized as several flat source columns.
///
/// At processing time every non-empty column becomes one `{type, value}` sub-record where
/// `type` is the column's mapping key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexFieldMapping {
    pub field_name: String,
    pub mappings: BTreeMap<SourceType, Vec<ComplexColumn>>,
}

impl ComplexFieldMapping {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            mappings: BTreeMap::new(),
        }
    }

    pub fn column(
        mut self,
        source_type: SourceType,
        mapping_key: impl Into<String>,
        table_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        self.mappings.entry(source_type).or_default().push(ComplexColumn {
            mapping_key: mapping_key.into(),
            external: ExternalFieldInfo::new(table_name, field_name),
        });
        self
    }

    pub fn columns_for(&self, source_type: SourceType) -> &[ComplexColumn] {
        self.mappings
            .get(&source_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// The canonical shape of one entity and its layout in every source.
///
/// Instances are created through [`EntityFieldDefinitionsBuilder::build`], which rejects layouts
/// violating the table and field invariants, so the query generator and the processor can rely
/// on them.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFieldDefinitions {
    entity: String,
    primary_key: String,
    unique_fields: Vec<String>,
    tables: BTreeMap<SourceType, Vec<TableInfo>>,
    fields: Vec<FieldDefinition>,
    complex_fields: Vec<ComplexFieldMapping>,
}

impl EntityFieldDefinitions {
    pub fn builder(entity: impl Into<String>) -> EntityFieldDefinitionsBuilder {
        EntityFieldDefinitionsBuilder {
            entity: entity.into(),
            primary_key: None,
            unique_fields: Vec::new(),
            tables: BTreeMap::new(),
            fields: Vec::new(),
            complex_fields: Vec::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Fields matched on upsert, composite when more than one.
    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn complex_fields(&self) -> &[ComplexFieldMapping] {
        &self.complex_fields
    }

    pub fn tables(&self, source_type: SourceType) -> &[TableInfo] {
        self.tables
            .get(&source_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `true` if the entity can be extracted from `source_type`.
    pub fn supports(&self, source_type: SourceType) -> bool {
        !self.tables(source_type).is_empty()
    }

    pub fn get_field_by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Maps canonical field names to their external column in `source_type`.
    pub fn get_external_field_mapping(&self, source_type: SourceType) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|field| {
                field
                    .external_field(source_type)
                    .map(|external| (field.name.clone(), external.field_name.clone()))
            })
            .collect()
    }

    /// Groups the external columns extracted from `source_type` by table, complex columns
    /// included.
    pub fn get_tables_for_source(&self, source_type: SourceType) -> BTreeMap<String, Vec<String>> {
        let mut tables: BTreeMap<String, Vec<String>> = self
            .tables(source_type)
            .iter()
            .map(|table| (table.table_name.clone(), Vec::new()))
            .collect();

        let flat = self
            .fields
            .iter()
            .filter(|field| !field.is_nested())
            .filter_map(|field| field.external_field(source_type));
        let complex = self
            .complex_fields
            .iter()
            .flat_map(|complex| complex.columns_for(source_type))
            .map(|column| &column.external);

        for external in flat.chain(complex) {
            if let Some(columns) = tables.get_mut(&external.table_name) {
                columns.push(external.field_name.clone());
            }
        }

        tables
    }

    /// Generates the extraction query for every field extracted from `source_type`.
    pub fn generate_query(&self, source_type: SourceType) -> EtlResult<String> {
        self.generate_query_for_fields(source_type, None)
    }

    /// Generates the extraction query, optionally restricted to a subset of canonical fields.
    ///
    /// The primary table is the `FROM` target and every other table is joined with a
    /// `LEFT JOIN` in declaration order. Derived fields without an external column and nested
    /// fields are left out; the flat columns of complex fields are appended instead. Queries for
    /// bridge sources are ordered by the mapped unique columns, since they are paged with
    /// `OFFSET`.
    pub fn generate_query_for_fields(
        &self,
        source_type: SourceType,
        fields: Option<&[&str]>,
    ) -> EtlResult<String> {
        let tables = self.tables(source_type);
        let Some(primary) = tables.iter().find(|table| table.is_primary) else {
            bail!(
                ErrorKind::ConfigurationError,
                "Entity has no table layout for source",
                format!("entity `{}` cannot be extracted from `{source_type}`", self.entity)
            );
        };

        if let Some(fields) = fields {
            for name in fields {
                let known = self.get_field_by_name(name).is_some()
                    || self.complex_fields.iter().any(|c| c.field_name == *name);
                if !known {
                    bail!(
                        ErrorKind::ConfigurationError,
                        "Unknown field requested for query generation",
                        format!("entity `{}` has no field `{name}`", self.entity)
                    );
                }
            }
        }

        let selected = |name: &str| fields.is_none_or(|fields| fields.contains(&name));

        let flat = self
            .fields
            .iter()
            .filter(|field| !field.is_nested() && selected(&field.name))
            .filter_map(|field| field.external_field(source_type));
        let complex = self
            .complex_fields
            .iter()
            .filter(|complex| selected(&complex.field_name))
            .flat_map(|complex| complex.columns_for(source_type))
            .map(|column| &column.external);

        let mut seen = HashSet::new();
        let columns: Vec<String> = flat
            .chain(complex)
            .map(|external| qualified_column(source_type, external))
            .filter(|column| seen.insert(column.clone()))
            .collect();

        if columns.is_empty() {
            bail!(
                ErrorKind::ConfigurationError,
                "No fields are mapped for source",
                format!("entity `{}` has no columns in `{source_type}`", self.entity)
            );
        }

        let mut query = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            quote_identifier(source_type, &primary.table_name)
        );

        for table in tables.iter().filter(|table| !table.is_primary) {
            query.push_str(&format!(
                " LEFT JOIN {} ON {}",
                quote_identifier(source_type, &table.table_name),
                table.join_condition.as_deref().unwrap_or_default()
            ));
        }

        if matches!(source_type, SourceType::Erp | SourceType::Odbc) {
            let order: Vec<String> = self
                .unique_fields
                .iter()
                .filter_map(|name| self.get_field_by_name(name))
                .filter_map(|field| field.external_field(source_type))
                .map(|external| qualified_column(source_type, external))
                .collect();

            if order.is_empty() {
                bail!(
                    ErrorKind::ConfigurationError,
                    "No unique field is mapped to order extraction pages",
                    format!("entity `{}` from `{source_type}`", self.entity)
                );
            }

            query.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        Ok(query)
    }
}

/// Quotes an identifier in the dialect of `source_type`.
///
/// Desktop database names may contain spaces and are double-quoted. ERP and file identifiers are
/// emitted bare.
pub fn quote_identifier(source_type: SourceType, identifier: &str) -> String {
    match source_type {
        SourceType::Odbc => format!("\"{}\"", identifier.replace('"', "\"\"")),
        SourceType::Erp | SourceType::File => identifier.to_owned(),
    }
}

fn qualified_column(source_type: SourceType, external: &ExternalFieldInfo) -> String {
    format!(
        "{}.{}",
        quote_identifier(source_type, &external.table_name),
        quote_identifier(source_type, &external.field_name)
    )
}

/// Builder validating the invariants of [`EntityFieldDefinitions`].
#[derive(Debug)]
pub struct EntityFieldDefinitionsBuilder {
    entity: String,
    primary_key: Option<String>,
    unique_fields: Vec<String>,
    tables: BTreeMap<SourceType, Vec<TableInfo>>,
    fields: Vec<FieldDefinition>,
    complex_fields: Vec<ComplexFieldMapping>,
}

impl EntityFieldDefinitionsBuilder {
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    pub fn unique_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn table(mut self, source_type: SourceType, table: TableInfo) -> Self {
        self.tables.entry(source_type).or_default().push(table);
        self
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn complex_field(mut self, mapping: ComplexFieldMapping) -> Self {
        self.complex_fields.push(mapping);
        self
    }

    pub fn build(self) -> EtlResult<EntityFieldDefinitions> {
        let entity = self.entity;
        let invalid = |detail: String| {
            crate::etl_error!(
                ErrorKind::ConfigurationError,
                "Invalid field definitions",
                format!("entity `{entity}`: {detail}")
            )
        };

        if entity.trim().is_empty() {
            return Err(invalid("the entity name is empty".to_string()));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(invalid(format!("field `{}` is declared twice", field.name)));
            }
        }

        let Some(primary_key) = self.primary_key else {
            return Err(invalid("no primary key is declared".to_string()));
        };
        if !names.contains(primary_key.as_str()) {
            return Err(invalid(format!("primary key `{primary_key}` is not a declared field")));
        }

        if self.unique_fields.is_empty() {
            return Err(invalid("at least one unique field is required".to_string()));
        }
        if let Some(unknown) = self
            .unique_fields
            .iter()
            .find(|name| !names.contains(name.as_str()))
        {
            return Err(invalid(format!("unique field `{unknown}` is not a declared field")));
        }

        for (source_type, tables) in &self.tables {
            let primaries = tables.iter().filter(|table| table.is_primary).count();
            if primaries != 1 {
                return Err(invalid(format!(
                    "`{source_type}` declares {primaries} primary tables instead of exactly one"
                )));
            }

            if let Some(table) = tables.iter().find(|table| {
                !table.is_primary
                    && table
                        .join_condition
                        .as_deref()
                        .is_none_or(|condition| condition.trim().is_empty())
            }) {
                return Err(invalid(format!(
                    "table `{}` in `{source_type}` is not primary and has no join condition",
                    table.table_name
                )));
            }
        }

        let declares = |source_type: &SourceType, table_name: &str| {
            self.tables
                .get(source_type)
                .is_some_and(|tables| tables.iter().any(|table| table.table_name == table_name))
        };

        for field in &self.fields {
            for (source_type, external) in &field.external_fields {
                if !declares(source_type, &external.table_name) {
                    return Err(invalid(format!(
                        "field `{}` maps to undeclared table `{}` in `{source_type}`",
                        field.name, external.table_name
                    )));
                }
            }

            if let (Some(default), Some(values)) = (&field.default, &field.enum_values) {
                if !values.contains(default) {
                    return Err(invalid(format!(
                        "default of field `{}` is not one of its enum values",
                        field.name
                    )));
                }
            }
        }

        for complex in &self.complex_fields {
            let is_array = self
                .fields
                .iter()
                .any(|field| field.name == complex.field_name && field.field_type == FieldType::Array);
            if !is_array {
                return Err(invalid(format!(
                    "complex mapping `{}` does not target a declared array field",
                    complex.field_name
                )));
            }

            for (source_type, columns) in &complex.mappings {
                if let Some(column) = columns
                    .iter()
                    .find(|column| !declares(source_type, &column.external.table_name))
                {
                    return Err(invalid(format!(
                        "complex mapping `{}` uses undeclared table `{}` in `{source_type}`",
                        complex.field_name, column.external.table_name
                    )));
                }
            }
        }

        Ok(EntityFieldDefinitions {
            entity,
            primary_key,
            unique_fields: self.unique_fields,
            tables: self.tables,
            fields: self.fields,
            complex_fields: self.complex_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn two_table_entity() -> EntityFieldDefinitions {
        EntityFieldDefinitions::builder("items")
            .primary_key("code")
            .unique_fields(["code"])
            .table(SourceType::Erp, TableInfo::primary("A"))
            .table(SourceType::Erp, TableInfo::joined("B", "A.K = B.K"))
            .table(SourceType::Odbc, TableInfo::primary("Items List"))
            .field(
                FieldDefinition::new("code", FieldType::String)
                    .mapped(SourceType::Erp, "A", "K")
                    .mapped(SourceType::Odbc, "Items List", "Item Code"),
            )
            .field(FieldDefinition::new("label", FieldType::String).mapped(SourceType::Erp, "B", "L"))
            .field(FieldDefinition::new("kind", FieldType::String).with_default("part"))
            .build()
            .unwrap()
    }

    #[test]
    fn two_table_layout_produces_exactly_one_join() {
        let query = two_table_entity().generate_query(SourceType::Erp).unwrap();

        assert_eq!(query, "SELECT A.K, B.L FROM A LEFT JOIN B ON A.K = B.K ORDER BY A.K");
        assert_eq!(query.matches("JOIN").count(), 1);
    }

    #[test]
    fn selects_are_scoped_to_the_source_and_quoted_for_odbc() {
        let query = two_table_entity().generate_query(SourceType::Odbc).unwrap();

        assert_eq!(
            query,
            r#"SELECT "Items List"."Item Code" FROM "Items List" ORDER BY "Items List"."Item Code""#
        );
    }

    #[test]
    fn unsupported_sources_and_unknown_fields_are_configuration_errors() {
        let entity = two_table_entity();

        let err = entity.generate_query(SourceType::File).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);

        let err = entity
            .generate_query_for_fields(SourceType::Erp, Some(&["missing"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);

        let query = entity
            .generate_query_for_fields(SourceType::Erp, Some(&["label"]))
            .unwrap();
        assert_eq!(query, "SELECT B.L FROM A LEFT JOIN B ON A.K = B.K ORDER BY A.K");
    }

    #[test]
    fn paged_sources_are_ordered_by_every_mapped_unique_column() {
        let entity = EntityFieldDefinitions::builder("stock")
            .primary_key("part")
            .unique_fields(["part", "warehouse", "batch"])
            .table(SourceType::Erp, TableInfo::primary("INVBAL"))
            .table(SourceType::File, TableInfo::primary("STOCK"))
            .field(
                FieldDefinition::new("part", FieldType::String)
                    .mapped(SourceType::Erp, "INVBAL", "SPART")
                    .mapped(SourceType::File, "STOCK", "part"),
            )
            .field(
                FieldDefinition::new("warehouse", FieldType::String)
                    .mapped(SourceType::Erp, "INVBAL", "SWHS"),
            )
            .field(FieldDefinition::new("batch", FieldType::String).with_default("none"))
            .build()
            .unwrap();

        assert_eq!(
            entity.generate_query(SourceType::Erp).unwrap(),
            "SELECT INVBAL.SPART, INVBAL.SWHS FROM INVBAL ORDER BY INVBAL.SPART, INVBAL.SWHS"
        );
        assert_eq!(
            entity.generate_query(SourceType::File).unwrap(),
            "SELECT STOCK.part FROM STOCK"
        );
    }

    #[test]
    fn mappings_are_derived_from_external_fields() {
        let entity = two_table_entity();

        let mapping = entity.get_external_field_mapping(SourceType::Erp);
        assert_eq!(mapping.get("code").map(String::as_str), Some("K"));
        assert_eq!(mapping.get("label").map(String::as_str), Some("L"));
        assert!(!mapping.contains_key("kind"));

        let tables = entity.get_tables_for_source(SourceType::Erp);
        assert_eq!(tables["A"], vec!["K".to_string()]);
        assert_eq!(tables["B"], vec!["L".to_string()]);
        assert!(entity.get_field_by_name("kind").is_some());
        assert!(entity.get_field_by_name("nope").is_none());
    }

    #[test]
    fn invariants_are_checked_on_build() {
        let two_primaries = EntityFieldDefinitions::builder("items")
            .primary_key("code")
            .unique_fields(["code"])
            .table(SourceType::Erp, TableInfo::primary("A"))
            .table(SourceType::Erp, TableInfo::primary("B"))
            .field(FieldDefinition::new("code", FieldType::String))
            .build();
        assert_eq!(two_primaries.unwrap_err().kind(), ErrorKind::ConfigurationError);

        let missing_join = EntityFieldDefinitions::builder("items")
            .primary_key("code")
            .unique_fields(["code"])
            .table(SourceType::Erp, TableInfo::primary("A"))
            .table(
                SourceType::Erp,
                TableInfo {
                    table_name: "B".to_string(),
                    is_primary: false,
                    join_condition: None,
                },
            )
            .field(FieldDefinition::new("code", FieldType::String))
            .build();
        assert!(missing_join.is_err());

        let undeclared_table = EntityFieldDefinitions::builder("items")
            .primary_key("code")
            .unique_fields(["code"])
            .table(SourceType::Erp, TableInfo::primary("A"))
            .field(FieldDefinition::new("code", FieldType::String).mapped(SourceType::Erp, "Z", "K"))
            .build();
        assert!(undeclared_table.is_err());

        let unknown_unique = EntityFieldDefinitions::builder("items")
            .primary_key("code")
            .unique_fields(["sku"])
            .field(FieldDefinition::new("code", FieldType::String))
            .build();
        assert!(unknown_unique.is_err());
    }
}
