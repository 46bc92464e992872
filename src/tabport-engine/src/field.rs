// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Per-field analysis: parse each calculated field's formula and
//! record its static references.  A formula that fails to parse
//! degrades to an AST-less placeholder carrying the error; it never
//! takes the rest of the model down.

use std::collections::BTreeSet;

use crate::ast::Expr;
use crate::common::{ErrorCode, ExprError, Ident};
use crate::datamodel::CalculatedField;
use crate::parser::{ExprContext, parse_expression_ctx};

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub ident: Ident,
    /// Display name as it should appear in the emitted model.
    pub name: String,
    /// Display name of the owning table.
    pub table: String,
    pub formula: String,
    pub ast: Option<Expr>,
    pub errors: Vec<ExprError>,
    pub refs: BTreeSet<Ident>,
    /// Position in the source declaration order; the deterministic
    /// tie-break for evaluation ordering.
    pub decl_index: usize,
}

impl Field {
    pub fn equation_errors(&self) -> Option<Vec<ExprError>> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.clone())
        }
    }
}

pub fn parse_field(cf: &CalculatedField, decl_index: usize, ctx: &ExprContext) -> Field {
    let mut errors: Vec<ExprError> = Vec::new();

    let ast = match parse_expression_ctx(&cf.formula, ctx) {
        Ok(Some(ast)) => Some(ast),
        Ok(None) => {
            errors.push(ExprError {
                start: 0,
                end: cf.formula.len() as u16,
                code: ErrorCode::EmptyExpression,
            });
            None
        }
        Err(err) => {
            errors.push(err);
            None
        }
    };

    let refs = ast
        .as_ref()
        .map(|ast| ast.identifier_set())
        .unwrap_or_default();

    Field {
        ident: cf.ident(),
        name: cf.display_name().to_string(),
        table: cf.table.clone(),
        formula: cf.formula.clone(),
        ast,
        errors,
        refs,
        decl_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(name: &str, formula: &str) -> CalculatedField {
        CalculatedField {
            name: name.to_string(),
            caption: None,
            table: "Orders".to_string(),
            formula: formula.to_string(),
        }
    }

    #[test]
    fn test_parse_field_collects_refs() {
        let field = parse_field(
            &calc("Profit Ratio", "SUM([Profit]) / SUM([Sales])"),
            0,
            &ExprContext::default(),
        );
        assert!(field.ast.is_some());
        assert!(field.errors.is_empty());
        assert_eq!(
            vec!["profit".to_string(), "sales".to_string()],
            field.refs.iter().cloned().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_syntax_error_degrades_to_placeholder() {
        let field = parse_field(
            &calc("Broken", "SUM([Sales]) +"),
            3,
            &ExprContext::default(),
        );
        assert!(field.ast.is_none());
        assert_eq!(1, field.errors.len());
        assert_eq!(ErrorCode::UnrecognizedEof, field.errors[0].code);
        assert!(field.refs.is_empty());
        assert_eq!(3, field.decl_index);
    }

    #[test]
    fn test_empty_formula_is_an_error() {
        let field = parse_field(&calc("Empty", "  "), 0, &ExprContext::default());
        assert_eq!(ErrorCode::EmptyExpression, field.errors[0].code);
    }
}
