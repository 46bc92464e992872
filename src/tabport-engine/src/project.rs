// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The conversion pipeline: one pass from a `WorkbookModel` to a
//! validated `EmittedArtifactSet`.
//!
//! Stage failures scoped to a single entity are accumulated as issues
//! and the run continues; only validation failure (or a malformed
//! source document upstream of this module) aborts the run, and an
//! aborted run emits nothing.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::common::{Assumption, Error, ErrorCode, ErrorKind, Ident, Result};
use crate::datamodel::{DataType, Rect, Role, WorkbookModel};
use crate::depgraph;
use crate::emit::{EmittedArtifactSet, emit_model};
use crate::field::{Field, parse_field};
use crate::parser::ExprContext;
use crate::relationship::build_relationships;
use crate::report::{TargetSchema, map_report};
use crate::translate::Translator;
use crate::validate::validate;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConvertOptions {
    pub project_name: String,
    pub schema: TargetSchema,
    /// Suggested geometry from the (external) layout collaborator,
    /// keyed by worksheet ident; never overrides declared layout.
    pub layout_hints: BTreeMap<Ident, Rect>,
}

impl ConvertOptions {
    pub fn new(project_name: &str) -> Self {
        ConvertOptions {
            project_name: project_name.to_string(),
            ..Default::default()
        }
    }
}

/// An entity excluded from the output, and why.  These are reported,
/// never silently swallowed.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityIssue {
    pub entity: String,
    pub error: Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    pub artifacts: EmittedArtifactSet,
    pub assumptions: Vec<Assumption>,
    pub issues: Vec<EntityIssue>,
}

/// Run the full pipeline over one extracted workbook.
pub fn convert(workbook: &WorkbookModel, opts: &ConvertOptions) -> Result<Conversion> {
    let mut assumptions: Vec<Assumption> = Vec::new();
    let mut issues: Vec<EntityIssue> = Vec::new();

    // parse every calculated field, with worksheet-derived window
    // context where one exists
    let fields: Vec<Field> = workbook
        .calculated_fields
        .iter()
        .enumerate()
        .map(|(i, cf)| {
            let ctx = window_context(workbook, &cf.ident());
            parse_field(cf, i, &ctx)
        })
        .collect();

    for field in fields.iter().filter(|f| f.ast.is_none()) {
        let err = &field.errors[0];
        issues.push(EntityIssue {
            entity: field.name.clone(),
            error: Error::new(
                ErrorKind::Model,
                err.code,
                Some(format!(
                    "'{}' failed to parse at offset {}..{}",
                    field.name, err.start, err.end
                )),
            ),
        });
        assumptions.push(Assumption {
            location: field.name.clone(),
            source_text: field.formula.clone(),
            target_text: String::new(),
            reason: "formula could not be parsed; the field is omitted from the emitted \
                     model"
                .to_string(),
        });
    }

    // dependency resolution and ordering
    let columns: BTreeSet<Ident> = workbook
        .tables
        .iter()
        .flat_map(|t| t.columns.iter().map(|c| c.ident()))
        .collect();
    let parameters: BTreeSet<Ident> =
        workbook.parameters.iter().map(|p| p.ident()).collect();
    let resolution = depgraph::resolve(&fields, &columns, &parameters);

    for (ident, error) in &resolution.excluded {
        // parse failures were already reported above
        if error.code == ErrorCode::DoesNotExist {
            continue;
        }
        let name = fields
            .iter()
            .find(|f| &f.ident == ident)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| ident.clone());
        issues.push(EntityIssue {
            entity: name,
            error: error.clone(),
        });
    }

    // translation, in topological order
    let translation = Translator::new(workbook).translate_all(&fields, &resolution.order);
    assumptions.extend(translation.assumptions);

    // relationships are independent of translation
    let relationships = build_relationships(workbook);
    for (name, error) in relationships.excluded {
        issues.push(EntityIssue {
            entity: name,
            error,
        });
    }
    assumptions.extend(relationships.assumptions);

    // emit the semantic model
    let emitted = emit_model(
        workbook,
        &translation.translations,
        &relationships.relationships,
        &opts.project_name,
    );
    assumptions.extend(emitted.assumptions);

    // map the report against the emitted model
    let report = map_report(
        workbook,
        &emitted.model,
        &translation.translations,
        &opts.project_name,
        &opts.schema,
        &opts.layout_hints,
    );
    for (name, error) in report.excluded {
        issues.push(EntityIssue {
            entity: name,
            error,
        });
    }
    assumptions.extend(report.assumptions);

    let mut documents = emitted.documents;
    documents.extend(report.documents);
    let artifacts = EmittedArtifactSet {
        model: emitted.model,
        pages: report.pages,
        documents,
    };

    // the validator is the sole gate: any violation and nothing is
    // handed to the writer
    validate(&artifacts)?;

    Ok(Conversion {
        artifacts,
        assumptions,
        issues,
    })
}

/// Derive the ordering column and partition dimensions a window
/// function would see on the first worksheet that uses the field.
fn window_context(workbook: &WorkbookModel, field_ident: &str) -> ExprContext {
    for ws in &workbook.worksheets {
        if !ws.shelf_fields().any(|s| s.ident() == field_ident) {
            continue;
        }
        let mut ordering = None;
        let mut partition = Vec::new();
        for shelf in ws.cols_shelf.iter().chain(ws.rows_shelf.iter()) {
            let ident = shelf.ident();
            if ident == field_ident {
                continue;
            }
            let Some(column) = workbook
                .table_of_column(&ident)
                .and_then(|t| t.get_column(&ident))
            else {
                continue;
            };
            if matches!(column.data_type, DataType::Date | DataType::DateTime) {
                if ordering.is_none() {
                    ordering = Some(ident);
                }
            } else if column.role == Role::Dimension {
                partition.push(ident);
            }
        }
        return ExprContext {
            ordering,
            partition,
        };
    }
    ExprContext::default()
}
