// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The acceptance gate: one static pass over the complete staged
//! artifact set.  Every violation found is reported (not just the
//! first), and any violation at all means the run emits nothing.

use std::collections::BTreeSet;

use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::emit::EmittedArtifactSet;

/// Collect every structural and referential violation in the set.
pub fn violations(artifacts: &EmittedArtifactSet) -> Vec<String> {
    let mut out = Vec::new();
    let model = &artifacts.model;

    // sibling identifier uniqueness
    let mut table_names = BTreeSet::new();
    let mut ids = BTreeSet::new();
    for table in &model.tables {
        if !table_names.insert(table.name.as_str()) {
            out.push(format!("duplicate table '{}'", table.name));
        }
        if !ids.insert(table.id.as_str()) {
            out.push(format!("duplicate identifier '{}' on table '{}'", table.id, table.name));
        }
        let mut field_names = BTreeSet::new();
        for column in &table.columns {
            if !field_names.insert(column.name.as_str()) {
                out.push(format!(
                    "duplicate field '{}' on table '{}'",
                    column.name, table.name
                ));
            }
            if !ids.insert(column.id.as_str()) {
                out.push(format!(
                    "duplicate identifier '{}' on column '{}'[{}]",
                    column.id, table.name, column.name
                ));
            }
        }
        for measure in &table.measures {
            if !field_names.insert(measure.name.as_str()) {
                out.push(format!(
                    "duplicate field '{}' on table '{}'",
                    measure.name, table.name
                ));
            }
            if !ids.insert(measure.id.as_str()) {
                out.push(format!(
                    "duplicate identifier '{}' on measure '{}'",
                    measure.id, measure.name
                ));
            }
        }
    }

    // relationship endpoints must resolve to emitted columns
    for rel in &model.relationships {
        if !ids.insert(rel.id.as_str()) {
            out.push(format!("duplicate identifier '{}' on relationship", rel.id));
        }
        for (table, column) in [
            (&rel.many_table, &rel.many_column),
            (&rel.one_table, &rel.one_column),
        ] {
            let exists = model
                .get_table(table)
                .is_some_and(|t| t.columns.iter().any(|c| &c.name == column));
            if !exists {
                out.push(format!(
                    "relationship '{}' references missing column '{}'[{}]",
                    rel.id, table, column
                ));
            }
        }
    }

    // pages and visuals
    let mut page_ids = BTreeSet::new();
    for page in &artifacts.pages {
        if !page_ids.insert(page.id.as_str()) {
            out.push(format!("duplicate page identifier '{}'", page.id));
        }
        let mut visual_ids = BTreeSet::new();
        for visual in &page.visuals {
            if !visual_ids.insert(visual.id.as_str()) {
                out.push(format!(
                    "duplicate visual identifier '{}' on page '{}'",
                    visual.id, page.display_name
                ));
            }
            if !visual.rect.is_well_formed() {
                out.push(format!(
                    "visual '{}' on page '{}' has a malformed position rectangle",
                    visual.id, page.display_name
                ));
            }
            for projection in visual.projections.iter().chain(visual.filters.iter()) {
                if !model.has_field(&projection.entity, &projection.property) {
                    out.push(format!(
                        "visual '{}' projects '{}'[{}], which is not in the model",
                        visual.id, projection.entity, projection.property
                    ));
                }
            }
        }
        for interaction in &page.interactions {
            for endpoint in [&interaction.source_visual, &interaction.target_visual] {
                if !page.visuals.iter().any(|v| &v.id == endpoint) {
                    out.push(format!(
                        "interaction '{}' references missing visual '{}' on page '{}'",
                        interaction.name, endpoint, page.display_name
                    ));
                }
            }
        }
    }

    out
}

/// Accept or reject the staged artifact set as a unit.
pub fn validate(artifacts: &EmittedArtifactSet) -> Result<()> {
    let found = violations(artifacts);
    if found.is_empty() {
        return Ok(());
    }
    Err(Error::new(
        ErrorKind::Validation,
        ErrorCode::SchemaValidation,
        Some(found.join("; ")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::Rect;
    use crate::emit::{
        ColumnSource, EmittedColumn, EmittedTable, SemanticModel,
    };
    use crate::report::{Bucket, PageSpec, Projection, VisualSpec, VisualType};

    fn column(name: &str, id: &str) -> EmittedColumn {
        EmittedColumn {
            name: name.to_string(),
            id: id.to_string(),
            data_type: Some("double"),
            summarize_by: "sum",
            source: ColumnSource::Source(name.to_string()),
        }
    }

    fn artifacts() -> EmittedArtifactSet {
        EmittedArtifactSet {
            model: SemanticModel {
                name: "Superstore".to_string(),
                tables: vec![EmittedTable {
                    name: "Orders".to_string(),
                    id: "t0".to_string(),
                    columns: vec![column("Sales", "c0")],
                    measures: vec![],
                }],
                relationships: vec![],
            },
            pages: vec![PageSpec {
                source: "overview".to_string(),
                id: "p0".to_string(),
                display_name: "Overview".to_string(),
                width: 1280.0,
                height: 720.0,
                visuals: vec![VisualSpec {
                    worksheet: "sales".to_string(),
                    id: "v0".to_string(),
                    visual_type: VisualType::ColumnChart,
                    projections: vec![Projection {
                        bucket: Bucket::Values,
                        entity: "Orders".to_string(),
                        property: "Sales".to_string(),
                        is_measure: false,
                    }],
                    rect: Rect::new(0.0, 0.0, 100.0, 100.0),
                    filters: vec![],
                }],
                interactions: vec![],
            }],
            documents: Default::default(),
        }
    }

    #[test]
    fn test_clean_set_passes() {
        assert!(validate(&artifacts()).is_ok());
    }

    #[test]
    fn test_unresolved_projection_is_a_violation() {
        let mut a = artifacts();
        a.pages[0].visuals[0].projections[0].property = "Ghost".to_string();
        let err = validate(&a).unwrap_err();
        assert_eq!(ErrorCode::SchemaValidation, err.code);
        assert!(err.get_details().unwrap().contains("Ghost"));
    }

    #[test]
    fn test_negative_rect_is_a_violation() {
        let mut a = artifacts();
        a.pages[0].visuals[0].rect = Rect::new(-5.0, 0.0, 100.0, 100.0);
        assert!(validate(&a).is_err());
    }

    #[test]
    fn test_duplicate_sibling_ids_are_violations() {
        let mut a = artifacts();
        let dup = a.model.tables[0].clone();
        a.model.tables.push(dup);
        let details = validate(&a).unwrap_err().get_details().unwrap();
        assert!(details.contains("duplicate table"));
        assert!(details.contains("duplicate identifier"));
    }

    #[test]
    fn test_all_violations_are_enumerated() {
        let mut a = artifacts();
        a.pages[0].visuals[0].projections[0].property = "Ghost".to_string();
        a.pages[0].visuals[0].rect = Rect::new(f64::NAN, 0.0, 1.0, 1.0);
        let found = violations(&a);
        assert_eq!(2, found.len());
    }
}
