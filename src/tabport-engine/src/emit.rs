// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Serializes tables, columns, measures and relationships into the
//! target semantic-model document set.  Every identifier is a stable
//! hash of (kind, scope, name); two runs over identical input produce
//! byte-identical documents.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::common::{Assumption, stable_id};
use crate::datamodel::{DataType, WorkbookModel};
use crate::dax::quote_table;
use crate::relationship::{Cardinality, CrossFilter, Relationship};
use crate::report::PageSpec;
use crate::translate::{FieldKind, TranslatedExpression};

/// One staged output document, keyed by project-relative path in
/// `EmittedArtifactSet::documents`.
#[derive(Clone, Debug, PartialEq)]
pub enum Document {
    Tmdl(String),
    Json(serde_json::Value),
}

/// The complete staged output of a conversion run.  Assembled last,
/// validated as a unit, and only then eligible for handoff to the
/// writer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmittedArtifactSet {
    pub model: SemanticModel,
    pub pages: Vec<PageSpec>,
    pub documents: BTreeMap<String, Document>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SemanticModel {
    pub name: String,
    pub tables: Vec<EmittedTable>,
    pub relationships: Vec<EmittedRelationship>,
}

impl SemanticModel {
    pub fn get_table(&self, name: &str) -> Option<&EmittedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// True when `name` resolves to a column or measure on `table`.
    pub fn has_field(&self, table: &str, name: &str) -> bool {
        self.get_table(table).is_some_and(|t| {
            t.columns.iter().any(|c| c.name == name)
                || t.measures.iter().any(|m| m.name == name)
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmittedTable {
    pub name: String,
    pub id: String,
    pub columns: Vec<EmittedColumn>,
    pub measures: Vec<EmittedMeasure>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnSource {
    /// Backed by a physical source column.
    Source(String),
    /// A translated row-level calculated field.
    Calculated(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmittedColumn {
    pub name: String,
    pub id: String,
    pub data_type: Option<&'static str>,
    pub summarize_by: &'static str,
    pub source: ColumnSource,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmittedMeasure {
    pub name: String,
    pub id: String,
    pub expression: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmittedRelationship {
    pub id: String,
    /// Many side in the rendered document.
    pub many_table: String,
    pub many_column: String,
    /// One side in the rendered document.
    pub one_table: String,
    pub one_column: String,
    pub cardinality: Cardinality,
    pub cross_filter: CrossFilter,
}

fn tmdl_data_type(dt: DataType) -> &'static str {
    match dt {
        DataType::Number => "double",
        DataType::Integer => "int64",
        DataType::String => "string",
        DataType::Date | DataType::DateTime => "dateTime",
        DataType::Boolean => "boolean",
        DataType::Unsupported => "string",
    }
}

fn summarize_by(dt: DataType) -> &'static str {
    if dt.is_numeric() { "sum" } else { "none" }
}

/// TMDL object references quote name parts containing anything beyond
/// identifier characters.
fn tmdl_name(name: &str) -> String {
    quote_table(name)
}

pub struct EmitResult {
    pub model: SemanticModel,
    pub documents: BTreeMap<String, Document>,
    pub assumptions: Vec<Assumption>,
}

pub fn emit_model(
    workbook: &WorkbookModel,
    translations: &[TranslatedExpression],
    relationships: &[Relationship],
    project: &str,
) -> EmitResult {
    let mut assumptions = Vec::new();
    let mut model = SemanticModel {
        name: project.to_string(),
        tables: Vec::new(),
        relationships: Vec::new(),
    };

    for table in &workbook.tables {
        let mut emitted = EmittedTable {
            name: table.name.clone(),
            id: stable_id("table", &workbook.name, &table.name),
            columns: Vec::new(),
            measures: Vec::new(),
        };

        for col in &table.columns {
            if col.data_type == DataType::Unsupported {
                assumptions.push(Assumption {
                    location: format!("{}.{}", table.name, col.name),
                    source_text: col.name.clone(),
                    target_text: "string".to_string(),
                    reason: "source column type is not in the supported set; emitted as \
                             a string column"
                        .to_string(),
                });
            }
            emitted.columns.push(EmittedColumn {
                name: col.name.clone(),
                id: stable_id("column", &table.name, &col.name),
                data_type: Some(tmdl_data_type(col.data_type)),
                summarize_by: summarize_by(col.data_type),
                source: ColumnSource::Source(col.name.clone()),
            });
        }

        for t in translations.iter().filter(|t| t.table == table.name) {
            match t.kind {
                FieldKind::DerivedColumn => emitted.columns.push(EmittedColumn {
                    name: t.name.clone(),
                    id: stable_id("column", &table.name, &t.name),
                    data_type: None,
                    summarize_by: "none",
                    source: ColumnSource::Calculated(t.text.clone()),
                }),
                FieldKind::Measure => emitted.measures.push(EmittedMeasure {
                    name: t.name.clone(),
                    id: stable_id("measure", &table.name, &t.name),
                    expression: t.text.clone(),
                }),
            }
        }

        model.tables.push(emitted);
    }

    for rel in relationships {
        // the rendered document puts the many side first; a
        // one-to-many relationship's "from" is its one side
        let (many, one) = match rel.cardinality {
            Cardinality::OneToMany | Cardinality::OneToOne | Cardinality::ManyToMany => (
                (&rel.to_table, &rel.to_column),
                (&rel.from_table, &rel.from_column),
            ),
        };
        let name = format!(
            "{}.{}-{}.{}",
            many.0, many.1, one.0, one.1
        );
        model.relationships.push(EmittedRelationship {
            id: stable_id("relationship", &workbook.name, &name),
            many_table: many.0.clone(),
            many_column: many.1.clone(),
            one_table: one.0.clone(),
            one_column: one.1.clone(),
            cardinality: rel.cardinality,
            cross_filter: rel.cross_filter,
        });
    }

    let documents = render_model_documents(&model, project);

    EmitResult {
        model,
        documents,
        assumptions,
    }
}

fn render_model_documents(model: &SemanticModel, project: &str) -> BTreeMap<String, Document> {
    let mut docs = BTreeMap::new();
    let base = format!("{project}.SemanticModel");

    docs.insert(
        format!("{base}/definition.pbism"),
        Document::Json(serde_json::json!({
            "version": "4.0",
            "settings": {}
        })),
    );

    docs.insert(
        format!("{base}/definition/database.tmdl"),
        Document::Tmdl("database\n\tcompatibilityLevel: 1567\n".to_string()),
    );

    let mut model_doc = String::new();
    model_doc.push_str("model Model\n");
    model_doc.push_str("\tculture: en-US\n");
    model_doc.push_str("\tdefaultPowerBIDataSourceVersion: powerBI_V3\n");
    model_doc.push_str("\tsourceQueryCulture: en-US\n");
    for table in &model.tables {
        let _ = writeln!(model_doc, "\nref table {}", tmdl_name(&table.name));
    }
    docs.insert(
        format!("{base}/definition/model.tmdl"),
        Document::Tmdl(model_doc),
    );

    for table in &model.tables {
        let file_name = table.name.replace(['/', '\\'], "-");
        docs.insert(
            format!("{base}/definition/tables/{file_name}.tmdl"),
            Document::Tmdl(render_table(table)),
        );
    }

    if !model.relationships.is_empty() {
        docs.insert(
            format!("{base}/definition/relationships.tmdl"),
            Document::Tmdl(render_relationships(&model.relationships)),
        );
    }

    docs
}

fn render_table(table: &EmittedTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "table {}", tmdl_name(&table.name));
    let _ = writeln!(out, "\tlineageTag: {}", table.id);

    for measure in &table.measures {
        let _ = writeln!(
            out,
            "\n\tmeasure {} = {}",
            tmdl_name(&measure.name),
            measure.expression
        );
        let _ = writeln!(out, "\t\tlineageTag: {}", measure.id);
    }

    for column in &table.columns {
        match &column.source {
            ColumnSource::Source(source_column) => {
                let _ = writeln!(out, "\n\tcolumn {}", tmdl_name(&column.name));
                if let Some(data_type) = column.data_type {
                    let _ = writeln!(out, "\t\tdataType: {data_type}");
                }
                let _ = writeln!(out, "\t\tsummarizeBy: {}", column.summarize_by);
                let _ = writeln!(out, "\t\tsourceColumn: {source_column}");
                let _ = writeln!(out, "\t\tlineageTag: {}", column.id);
            }
            ColumnSource::Calculated(expression) => {
                let _ = writeln!(
                    out,
                    "\n\tcolumn {} = {}",
                    tmdl_name(&column.name),
                    expression
                );
                let _ = writeln!(out, "\t\tsummarizeBy: {}", column.summarize_by);
                let _ = writeln!(out, "\t\tlineageTag: {}", column.id);
                let _ = writeln!(out, "\t\ttype: calculated");
            }
        }
    }

    let _ = writeln!(
        out,
        "\n\tpartition {} = m\n\t\tmode: import",
        tmdl_name(&table.name)
    );

    out
}

fn render_relationships(relationships: &[EmittedRelationship]) -> String {
    let mut out = String::new();
    for (i, rel) in relationships.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "relationship {}", rel.id);
        let _ = writeln!(
            out,
            "\tfromColumn: {}.{}",
            tmdl_name(&rel.many_table),
            tmdl_name(&rel.many_column)
        );
        let _ = writeln!(
            out,
            "\ttoColumn: {}.{}",
            tmdl_name(&rel.one_table),
            tmdl_name(&rel.one_column)
        );
        match rel.cardinality {
            Cardinality::OneToMany => {}
            Cardinality::OneToOne => {
                let _ = writeln!(out, "\tfromCardinality: one");
            }
            Cardinality::ManyToMany => {
                let _ = writeln!(out, "\ttoCardinality: many");
            }
        }
        if rel.cross_filter == CrossFilter::Both {
            let _ = writeln!(out, "\tcrossFilteringBehavior: bothDirections");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::{Aggregation, Column, Role, Table};
    use crate::dax::DaxExpr;
    use crate::translate::Confidence;

    fn workbook() -> WorkbookModel {
        WorkbookModel {
            name: "Superstore".to_string(),
            tables: vec![Table {
                name: "Orders".to_string(),
                datasource: "ds0".to_string(),
                columns: vec![
                    Column {
                        name: "Sales".to_string(),
                        data_type: DataType::Number,
                        role: Role::Measure,
                        default_aggregation: Aggregation::Sum,
                        is_unique_key: false,
                    },
                    Column {
                        name: "Region".to_string(),
                        data_type: DataType::String,
                        role: Role::Dimension,
                        default_aggregation: Aggregation::None,
                        is_unique_key: false,
                    },
                ],
            }],
            ..Default::default()
        }
    }

    fn measure(name: &str, text: &str) -> TranslatedExpression {
        TranslatedExpression {
            ident: crate::common::canonicalize(name),
            name: name.to_string(),
            table: "Orders".to_string(),
            kind: FieldKind::Measure,
            dax: DaxExpr::Blank,
            text: text.to_string(),
            confidence: Confidence::Exact,
        }
    }

    #[test]
    fn test_table_document_layout() {
        let translations = vec![measure(
            "Profit Ratio",
            "DIVIDE(SUM(Orders[Profit]), SUM(Orders[Sales]))",
        )];
        let result = emit_model(&workbook(), &translations, &[], "Superstore");

        let doc = result
            .documents
            .get("Superstore.SemanticModel/definition/tables/Orders.tmdl")
            .unwrap();
        let Document::Tmdl(text) = doc else {
            panic!("expected tmdl");
        };

        assert!(text.starts_with("table Orders\n"));
        assert!(text.contains("\tcolumn Sales\n\t\tdataType: double\n\t\tsummarizeBy: sum"));
        assert!(text.contains("\tcolumn Region\n\t\tdataType: string\n\t\tsummarizeBy: none"));
        assert!(text.contains(
            "\tmeasure 'Profit Ratio' = DIVIDE(SUM(Orders[Profit]), SUM(Orders[Sales]))"
        ));
    }

    #[test]
    fn test_emitted_ids_are_stable() {
        let a = emit_model(&workbook(), &[], &[], "Superstore");
        let b = emit_model(&workbook(), &[], &[], "Superstore");
        assert_eq!(a.model, b.model);
        assert_eq!(a.documents, b.documents);
    }

    #[test]
    fn test_relationship_document_puts_many_side_first() {
        let rel = Relationship {
            from_table: "Orders".to_string(),
            from_column: "OrderID".to_string(),
            to_table: "OrderLines".to_string(),
            to_column: "OrderID".to_string(),
            cardinality: Cardinality::OneToMany,
            cross_filter: CrossFilter::Single,
        };
        let mut wb = workbook();
        wb.tables.push(Table {
            name: "OrderLines".to_string(),
            datasource: "ds0".to_string(),
            columns: vec![],
        });
        let result = emit_model(&wb, &[], std::slice::from_ref(&rel), "Superstore");

        let Document::Tmdl(text) = result
            .documents
            .get("Superstore.SemanticModel/definition/relationships.tmdl")
            .unwrap()
        else {
            panic!("expected tmdl");
        };
        assert!(text.contains("fromColumn: OrderLines.OrderID"));
        assert!(text.contains("toColumn: Orders.OrderID"));
        assert!(!text.contains("crossFilteringBehavior"));
    }

    #[test]
    fn test_unsupported_type_leaves_assumption() {
        let mut wb = workbook();
        wb.tables[0].columns.push(Column {
            name: "Geometry".to_string(),
            data_type: DataType::Unsupported,
            role: Role::Dimension,
            default_aggregation: Aggregation::None,
            is_unique_key: false,
        });
        let result = emit_model(&wb, &[], &[], "Superstore");
        assert_eq!(1, result.assumptions.len());
        assert!(result.assumptions[0].location.contains("Geometry"));

        // the column is still emitted, as a string
        let table = result.model.get_table("Orders").unwrap();
        assert!(table.columns.iter().any(|c| c.name == "Geometry"));
    }
}
