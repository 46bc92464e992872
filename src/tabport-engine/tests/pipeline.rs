// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pipeline-level properties over hand-built workbook models.

use tabport_engine::datamodel::{
    Aggregation, CalculatedField, Column, DataType, Join, JoinType, MarkClass, Role,
    ShelfField, Table, WorkbookModel, Worksheet,
};
use tabport_engine::emit::Document;
use tabport_engine::project::{ConvertOptions, convert};

fn column(name: &str, data_type: DataType, unique: bool) -> Column {
    Column {
        name: name.to_string(),
        data_type,
        role: if data_type.is_numeric() {
            Role::Measure
        } else {
            Role::Dimension
        },
        default_aggregation: Aggregation::default(),
        is_unique_key: unique,
    }
}

fn calc(name: &str, formula: &str) -> CalculatedField {
    CalculatedField {
        name: name.to_string(),
        caption: None,
        table: "Orders".to_string(),
        formula: formula.to_string(),
    }
}

fn orders_workbook() -> WorkbookModel {
    WorkbookModel {
        name: "Superstore".to_string(),
        tables: vec![
            Table {
                name: "Orders".to_string(),
                datasource: "ds0".to_string(),
                columns: vec![
                    column("OrderID", DataType::String, true),
                    column("Sales", DataType::Number, false),
                    column("Profit", DataType::Number, false),
                    column("Region", DataType::String, false),
                ],
            },
            Table {
                name: "OrderLines".to_string(),
                datasource: "ds0".to_string(),
                columns: vec![
                    column("OrderID", DataType::String, false),
                    column("Quantity", DataType::Integer, false),
                ],
            },
        ],
        calculated_fields: vec![
            calc("Profit Ratio", "SUM([Profit]) / SUM([Sales])"),
            calc("Ratio Pct", "[Profit Ratio] * 100"),
            calc("Unit Margin", "[Profit] / [Sales]"),
            calc("Region Sales", "{FIXED [Region] : SUM([Sales])}"),
        ],
        joins: vec![Join {
            join_type: JoinType::Inner,
            left_table: "Orders".to_string(),
            left_column: "OrderID".to_string(),
            right_table: "OrderLines".to_string(),
            right_column: "OrderID".to_string(),
            bidirectional_filter: false,
        }],
        worksheets: vec![Worksheet {
            name: "By Region".to_string(),
            rows_shelf: vec![ShelfField {
                field: "Sales".to_string(),
                derivation: Some("sum".to_string()),
            }],
            cols_shelf: vec![ShelfField {
                field: "Region".to_string(),
                derivation: None,
            }],
            mark: MarkClass::Bar,
            filters: vec![],
        }],
        ..Default::default()
    }
}

#[test]
fn test_exactly_one_translation_per_field() {
    let workbook = orders_workbook();
    let conversion = convert(&workbook, &ConvertOptions::new("Superstore")).unwrap();
    assert!(conversion.issues.is_empty());

    let orders = conversion.artifacts.model.get_table("Orders").unwrap();
    let translated = orders.measures.len()
        + orders
            .columns
            .iter()
            .filter(|c| {
                matches!(c.source, tabport_engine::emit::ColumnSource::Calculated(_))
            })
            .count();
    assert_eq!(workbook.calculated_fields.len(), translated);

    // aggregate fields became measures, row-level ones columns
    assert!(orders.measures.iter().any(|m| m.name == "Profit Ratio"));
    assert!(orders.measures.iter().any(|m| m.name == "Ratio Pct"));
    assert!(orders.measures.iter().any(|m| m.name == "Region Sales"));
    assert!(orders.columns.iter().any(|c| c.name == "Unit Margin"));
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let workbook = orders_workbook();
    let opts = ConvertOptions::new("Superstore");
    let first = convert(&workbook, &opts).unwrap();
    for _ in 0..3 {
        let again = convert(&workbook, &opts).unwrap();
        assert_eq!(first.artifacts, again.artifacts);
        assert_eq!(first.assumptions, again.assumptions);
    }
}

#[test]
fn test_relationship_lands_in_the_document_set() {
    let workbook = orders_workbook();
    let conversion = convert(&workbook, &ConvertOptions::new("Superstore")).unwrap();

    let Document::Tmdl(rels) = conversion
        .artifacts
        .documents
        .get("Superstore.SemanticModel/definition/relationships.tmdl")
        .unwrap()
    else {
        panic!("expected tmdl");
    };
    assert!(rels.contains("fromColumn: OrderLines.OrderID"));
    assert!(rels.contains("toColumn: Orders.OrderID"));
}

#[test]
fn test_assumption_log_is_ordered_by_declaration() {
    let mut workbook = orders_workbook();
    // two closest-match fields declared in the opposite of their
    // topological order
    workbook.calculated_fields = vec![
        calc("Second", "ZN(SPACE([First]))"),
        calc("First", "SPACE([Sales])"),
    ];
    let conversion = convert(&workbook, &ConvertOptions::new("Superstore")).unwrap();

    let locations: Vec<&str> = conversion
        .assumptions
        .iter()
        .map(|a| a.location.as_str())
        .collect();
    assert_eq!(vec!["Second", "First"], locations);
}
