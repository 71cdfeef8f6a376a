//! Built-in definitions of the catalog entities.

use catalog_config::shared::SourceType;

use crate::error::EtlResult;
use crate::registry::entity::{ComplexFieldMapping, EntityFieldDefinitions, TableInfo};
use crate::registry::field::{FieldDefinition, FieldType};
use crate::registry::transforms::TransformFn;

pub const PRODUCTS: &str = "products";
pub const PRICING: &str = "pricing";
pub const INVENTORY: &str = "inventory";

/// Units of measure accepted for products.
const UNITS_OF_MEASURE: [&str; 5] = ["EA", "PK", "CS", "FT", "BX"];

/// Returns the definitions of every built-in entity.
pub fn catalog_definitions() -> EtlResult<Vec<EntityFieldDefinitions>> {
    Ok(vec![products()?, pricing()?, inventory()?])
}

fn products() -> EtlResult<EntityFieldDefinitions> {
    EntityFieldDefinitions::builder(PRODUCTS)
        .primary_key("part_number")
        .unique_fields(["part_number"])
        .table(SourceType::Erp, TableInfo::primary("ITMMST"))
        .table(
            SourceType::Erp,
            TableInfo::joined("ITMEXT", "ITMMST.IPART = ITMEXT.XPART"),
        )
        .table(SourceType::Odbc, TableInfo::primary("Products"))
        .table(SourceType::File, TableInfo::primary("PRODUCTS"))
        .field(
            FieldDefinition::new("part_number", FieldType::String)
                .required()
                .mapped(SourceType::Erp, "ITMMST", "IPART")
                .mapped(SourceType::Odbc, "Products", "Part Number")
                .mapped(SourceType::File, "PRODUCTS", "part_number")
                .transform_imports(TransformFn::Trim),
        )
        .field(
            FieldDefinition::new("description", FieldType::String)
                .mapped(SourceType::Erp, "ITMMST", "IDESC")
                .mapped(SourceType::Odbc, "Products", "Description")
                .mapped(SourceType::File, "PRODUCTS", "description")
                .transform_imports(TransformFn::Trim),
        )
        .field(
            FieldDefinition::new("brand", FieldType::String)
                .with_default("")
                .mapped(SourceType::Erp, "ITMMST", "IBRAND")
                .mapped(SourceType::Odbc, "Products", "Brand")
                .mapped(SourceType::File, "PRODUCTS", "brand")
                .transform_imports(TransformFn::Trim),
        )
        .field(
            FieldDefinition::new("is_active", FieldType::Boolean)
                .with_default(true)
                .mapped(SourceType::Erp, "ITMMST", "IACTV")
                .mapped(SourceType::Odbc, "Products", "Active")
                .mapped(SourceType::File, "PRODUCTS", "is_active")
                .transform_from("Active", TransformFn::YesNoFlag),
        )
        .field(
            FieldDefinition::new("weight", FieldType::Float)
                .mapped(SourceType::Erp, "ITMMST", "IWGHT")
                .mapped(SourceType::Odbc, "Products", "Weight")
                .mapped(SourceType::File, "PRODUCTS", "weight"),
        )
        .field(
            FieldDefinition::new("unit_of_measure", FieldType::String)
                .with_default("EA")
                .with_enum_values(UNITS_OF_MEASURE)
                .mapped(SourceType::Erp, "ITMMST", "IUOM")
                .mapped(SourceType::Odbc, "Products", "UOM")
                .mapped(SourceType::File, "PRODUCTS", "unit_of_measure")
                .transform_imports(TransformFn::Upper),
        )
        .field(
            FieldDefinition::new("descriptions", FieldType::Array).with_nested_fields(vec![
                FieldDefinition::new("type", FieldType::String).required(),
                FieldDefinition::new("value", FieldType::String).required(),
            ]),
        )
        .field(
            FieldDefinition::new("updated_on", FieldType::Date)
                .mapped(SourceType::Erp, "ITMMST", "IUPDT")
                .mapped(SourceType::Odbc, "Products", "Last Updated")
                .mapped(SourceType::File, "PRODUCTS", "updated_on"),
        )
        .complex_field(
            ComplexFieldMapping::new("descriptions")
                .column(SourceType::Erp, "short", "ITMEXT", "XSHRT")
                .column(SourceType::Erp, "extended", "ITMEXT", "XLONG")
                .column(SourceType::Erp, "marketing", "ITMEXT", "XMKTG")
                .column(SourceType::Odbc, "short", "Products", "Short Description")
                .column(SourceType::Odbc, "extended", "Products", "Long Description")
                .column(SourceType::Odbc, "marketing", "Products", "Marketing Copy")
                .column(SourceType::File, "short", "PRODUCTS", "short_description")
                .column(SourceType::File, "extended", "PRODUCTS", "extended_description")
                .column(SourceType::File, "marketing", "PRODUCTS", "marketing_description"),
        )
        .build()
}

fn pricing() -> EtlResult<EntityFieldDefinitions> {
    let price_columns = [
        ("PRCJB", "PRCEX"),
        ("Jobber Price", "Export Price"),
        ("jobber_price", "export_price"),
    ];

    let mut price = FieldDefinition::new("price", FieldType::Float).required();
    for (jobber, export) in price_columns {
        price = price.transform_from(
            jobber,
            TransformFn::PriceByPricingType {
                jobber: jobber.to_owned(),
                export: export.to_owned(),
            },
        );
    }

    EntityFieldDefinitions::builder(PRICING)
        .primary_key("part_number")
        .unique_fields(["part_number", "pricing_type"])
        .table(SourceType::Erp, TableInfo::primary("PRCMST"))
        .table(SourceType::Odbc, TableInfo::primary("Price List"))
        .table(SourceType::File, TableInfo::primary("PRICING"))
        .field(
            FieldDefinition::new("part_number", FieldType::String)
                .required()
                .mapped(SourceType::Erp, "PRCMST", "PPART")
                .mapped(SourceType::Odbc, "Price List", "Part Number")
                .mapped(SourceType::File, "PRICING", "part_number")
                .transform_imports(TransformFn::Trim),
        )
        .field(
            FieldDefinition::new("pricing_type", FieldType::String)
                .required()
                .with_enum_values(["jobber", "export"]),
        )
        .field(
            FieldDefinition::new("jobber_price", FieldType::Float)
                .mapped(SourceType::Erp, "PRCMST", "PRCJB")
                .mapped(SourceType::Odbc, "Price List", "Jobber Price")
                .mapped(SourceType::File, "PRICING", "jobber_price"),
        )
        .field(
            FieldDefinition::new("export_price", FieldType::Float)
                .mapped(SourceType::Erp, "PRCMST", "PRCEX")
                .mapped(SourceType::Odbc, "Price List", "Export Price")
                .mapped(SourceType::File, "PRICING", "export_price"),
        )
        .field(price)
        .field(
            FieldDefinition::new("currency", FieldType::String)
                .with_default("USD")
                .mapped(SourceType::Erp, "PRCMST", "PCURR")
                .mapped(SourceType::Odbc, "Price List", "Currency")
                .mapped(SourceType::File, "PRICING", "currency")
                .transform_imports(TransformFn::Upper),
        )
        .build()
}

fn inventory() -> EtlResult<EntityFieldDefinitions> {
    EntityFieldDefinitions::builder(INVENTORY)
        .primary_key("part_number")
        .unique_fields(["part_number"])
        .table(SourceType::Erp, TableInfo::primary("INVBAL"))
        .table(SourceType::Odbc, TableInfo::primary("Stock"))
        .table(SourceType::File, TableInfo::primary("INVENTORY"))
        .field(
            FieldDefinition::new("part_number", FieldType::String)
                .required()
                .mapped(SourceType::Erp, "INVBAL", "SPART")
                .mapped(SourceType::Odbc, "Stock", "Part Number")
                .mapped(SourceType::File, "INVENTORY", "part_number")
                .transform_imports(TransformFn::Trim),
        )
        .field(
            FieldDefinition::new("warehouse", FieldType::String)
                .with_default("MAIN")
                .mapped(SourceType::Erp, "INVBAL", "SWHS")
                .mapped(SourceType::Odbc, "Stock", "Warehouse")
                .mapped(SourceType::File, "INVENTORY", "warehouse")
                .transform_imports(TransformFn::Upper),
        )
        .field(
            FieldDefinition::new("quantity", FieldType::Integer)
                .required()
                .with_default(0)
                .mapped(SourceType::Erp, "INVBAL", "SCLSK")
                .mapped(SourceType::Odbc, "Stock", "On Hand")
                .mapped(SourceType::File, "INVENTORY", "quantity")
                .transform_imports(TransformFn::ClampNonNegativeInt),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_definitions_satisfy_their_invariants() {
        let definitions = catalog_definitions().unwrap();
        let names: Vec<&str> = definitions.iter().map(|d| d.entity()).collect();
        assert_eq!(names, vec![PRODUCTS, PRICING, INVENTORY]);
    }

    #[test]
    fn erp_products_join_the_extended_description_table() {
        let query = products().unwrap().generate_query(SourceType::Erp).unwrap();

        assert_eq!(
            query,
            "SELECT ITMMST.IPART, ITMMST.IDESC, ITMMST.IBRAND, ITMMST.IACTV, ITMMST.IWGHT, \
             ITMMST.IUOM, ITMMST.IUPDT, ITMEXT.XSHRT, ITMEXT.XLONG, ITMEXT.XMKTG \
             FROM ITMMST LEFT JOIN ITMEXT ON ITMMST.IPART = ITMEXT.XPART ORDER BY ITMMST.IPART"
        );
    }

    #[test]
    fn derived_pricing_fields_are_not_extracted() {
        let query = pricing().unwrap().generate_query(SourceType::Odbc).unwrap();

        assert_eq!(
            query,
            r#"SELECT "Price List"."Part Number", "Price List"."Jobber Price", "Price List"."Export Price", "Price List"."Currency" FROM "Price List" ORDER BY "Price List"."Part Number""#
        );
    }
}
