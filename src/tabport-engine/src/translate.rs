// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Rewrites source-grammar ASTs into target-language ASTs.
//!
//! The rule table is keyed on node shape and, for function calls, on
//! function identity.  Anything without an exact rule goes down the
//! closest-match path: the nearest supported construct is emitted and
//! exactly one Assumption is recorded.  Translation never fails a run;
//! at worst it degrades a single expression with a paper trail.
//!
//! Fields are processed in topological order, so a reference to
//! another calculated field can be rewritten as a reference to its
//! already-translated counterpart.

use std::collections::HashMap;

use crate::ast::{AggFunc, BinaryOp, Expr, Loc, LodKind, UnaryOp, WindowFrame, WindowFunc};
use crate::common::{Assumption, Ident};
use crate::datamodel::{DataType, WorkbookModel};
use crate::dax::{DaxExpr, DaxOp};
use crate::field::Field;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confidence {
    Exact,
    ClosestMatch,
}

/// Whether a translated field lands in the target model as a per-row
/// derived column or an aggregate measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    DerivedColumn,
    Measure,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TranslatedExpression {
    pub ident: Ident,
    pub name: String,
    pub table: String,
    pub kind: FieldKind,
    pub dax: DaxExpr,
    pub text: String,
    pub confidence: Confidence,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TranslationResult {
    pub translations: Vec<TranslatedExpression>,
    /// Ordered by source declaration, not completion.
    pub assumptions: Vec<Assumption>,
}

struct ColumnInfo {
    table: String,
    column: String,
    data_type: DataType,
}

pub struct Translator<'a> {
    model: &'a WorkbookModel,
    columns: HashMap<Ident, ColumnInfo>,
    /// Classification and display info for already-translated fields.
    translated: HashMap<Ident, (FieldKind, String, String)>,
}

impl<'a> Translator<'a> {
    pub fn new(model: &'a WorkbookModel) -> Self {
        let mut columns = HashMap::new();
        for table in &model.tables {
            for col in &table.columns {
                // first declaration wins, matching reference
                // resolution in the extractor
                columns.entry(col.ident()).or_insert(ColumnInfo {
                    table: table.name.clone(),
                    column: col.name.clone(),
                    data_type: col.data_type,
                });
            }
        }
        Translator {
            model,
            columns,
            translated: HashMap::new(),
        }
    }

    /// Translate every field in `order` (a topological order over the
    /// dependency graph).  Assumptions come back sorted by source
    /// declaration order.
    pub fn translate_all(mut self, fields: &[Field], order: &[Ident]) -> TranslationResult {
        let by_ident: HashMap<&str, &Field> =
            fields.iter().map(|f| (f.ident.as_str(), f)).collect();

        let mut out: Vec<(usize, TranslatedExpression, Vec<Assumption>)> = Vec::new();
        for ident in order {
            let Some(field) = by_ident.get(ident.as_str()) else {
                continue;
            };
            let (translated, assumptions) = self.translate_field(field);
            self.translated.insert(
                field.ident.clone(),
                (translated.kind, translated.name.clone(), translated.table.clone()),
            );
            out.push((field.decl_index, translated, assumptions));
        }

        out.sort_by_key(|(decl_index, _, _)| *decl_index);

        let mut result = TranslationResult::default();
        for (_, translated, assumptions) in out {
            result.translations.push(translated);
            result.assumptions.extend(assumptions);
        }
        result
    }

    pub fn translate_field(&self, field: &Field) -> (TranslatedExpression, Vec<Assumption>) {
        let ast = field
            .ast
            .as_ref()
            .expect("translate_field requires a parsed expression");

        let kind = if self.is_aggregate(ast) {
            FieldKind::Measure
        } else {
            FieldKind::DerivedColumn
        };

        let mut ctx = FieldCtx {
            field,
            confidence: Confidence::Exact,
            assumptions: Vec::new(),
        };
        let dax = self.translate_expr(ast, &mut ctx);
        let text = dax.render();

        (
            TranslatedExpression {
                ident: field.ident.clone(),
                name: field.name.clone(),
                table: field.table.clone(),
                kind,
                dax,
                text,
                confidence: ctx.confidence,
            },
            ctx.assumptions,
        )
    }

    /// Aggregate-ness including references: a field that references a
    /// measure is itself aggregate even without its own aggregation
    /// node.
    fn is_aggregate(&self, expr: &Expr) -> bool {
        if expr.is_aggregate() {
            return true;
        }
        expr.identifier_set().iter().any(|ident| {
            matches!(self.translated.get(ident), Some((FieldKind::Measure, _, _)))
        })
    }

    fn translate_expr(&self, expr: &Expr, ctx: &mut FieldCtx) -> DaxExpr {
        match expr {
            Expr::Const(text, _, _) => DaxExpr::Number(text.clone()),
            Expr::Str(text, _) => DaxExpr::Str(text.clone()),
            Expr::Bool(b, _) => DaxExpr::Bool(*b),
            Expr::Null(_) => DaxExpr::Blank,
            Expr::Field(ident, loc) => self.translate_field_ref(ident, *loc, ctx),
            Expr::App(func, args, loc) => self.translate_call(func, args, *loc, ctx),
            Expr::Op1(op, operand, _) => {
                let operand = self.translate_expr(operand, ctx);
                match op {
                    UnaryOp::Negative => DaxExpr::Neg(Box::new(operand)),
                    UnaryOp::Not => DaxExpr::call("NOT", vec![operand]),
                }
            }
            Expr::Op2(op, l, r, _) => self.translate_op2(*op, l, r, ctx),
            Expr::If(branches, default, _) => self.translate_if(branches, default.as_deref(), ctx),
            Expr::Case(subject, branches, default, _) => {
                let mut args = vec![self.translate_expr(subject, ctx)];
                for (value, result) in branches {
                    args.push(self.translate_expr(value, ctx));
                    args.push(self.translate_expr(result, ctx));
                }
                if let Some(default) = default {
                    args.push(self.translate_expr(default, ctx));
                }
                DaxExpr::call("SWITCH", args)
            }
            Expr::Agg(func, arg, loc) => self.translate_agg(*func, arg, *loc, ctx),
            Expr::Lod(kind, dims, inner, loc) => {
                self.translate_lod(*kind, dims, inner, *loc, ctx)
            }
            Expr::Window {
                func,
                expr,
                frame,
                ordering,
                partition,
                loc,
            } => self.translate_window(
                *func,
                expr.as_deref(),
                *frame,
                ordering.as_deref(),
                partition,
                *loc,
                ctx,
            ),
        }
    }

    fn translate_field_ref(&self, ident: &str, loc: Loc, ctx: &mut FieldCtx) -> DaxExpr {
        if let Some((kind, name, table)) = self.translated.get(ident) {
            return match kind {
                FieldKind::Measure => DaxExpr::Measure(name.clone()),
                FieldKind::DerivedColumn => DaxExpr::column(table, name),
            };
        }

        if let Some(info) = self.columns.get(ident) {
            return DaxExpr::column(&info.table, &info.column);
        }

        if let Some(param) = self.model.get_parameter(ident) {
            // the target's what-if parameters are out of model scope;
            // inline the declared current value
            let value = match (&param.current_value, param.data_type) {
                (Some(v), DataType::String) => DaxExpr::Str(v.clone()),
                (Some(v), _) => DaxExpr::Number(v.clone()),
                (None, _) => DaxExpr::Blank,
            };
            ctx.closest_match(
                loc,
                &value,
                "parameter reference inlined at its declared current value",
            );
            return value;
        }

        // the dependency resolver excludes fields with unknown
        // references before translation; reaching this is a gap
        // between the two passes
        let fallback = DaxExpr::Measure(ident.to_string());
        ctx.closest_match(loc, &fallback, "reference could not be resolved in the model");
        fallback
    }

    fn translate_op2(&self, op: BinaryOp, l: &Expr, r: &Expr, ctx: &mut FieldCtx) -> DaxExpr {
        let dax_l = self.translate_expr(l, ctx);
        let dax_r = self.translate_expr(r, ctx);

        let dax_op = match op {
            BinaryOp::Add => {
                if self.is_stringish(l) || self.is_stringish(r) {
                    DaxOp::Concat
                } else {
                    DaxOp::Add
                }
            }
            BinaryOp::Sub => DaxOp::Sub,
            BinaryOp::Mul => DaxOp::Mul,
            BinaryOp::Div => {
                // aggregate division maps to the safe-division builtin,
                // which matches the source tool's blank-on-zero display
                // semantics
                if self.is_aggregate(l) || self.is_aggregate(r) {
                    return DaxExpr::call("DIVIDE", vec![dax_l, dax_r]);
                }
                DaxOp::Div
            }
            BinaryOp::Mod => return DaxExpr::call("MOD", vec![dax_l, dax_r]),
            BinaryOp::Exp => DaxOp::Pow,
            BinaryOp::Gt => DaxOp::Gt,
            BinaryOp::Gte => DaxOp::Gte,
            BinaryOp::Lt => DaxOp::Lt,
            BinaryOp::Lte => DaxOp::Lte,
            BinaryOp::Eq => DaxOp::Eq,
            BinaryOp::Neq => DaxOp::Neq,
            BinaryOp::And => DaxOp::And,
            BinaryOp::Or => DaxOp::Or,
        };
        DaxExpr::Op2(dax_op, Box::new(dax_l), Box::new(dax_r))
    }

    fn translate_if(
        &self,
        branches: &[(Expr, Expr)],
        default: Option<&Expr>,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        if branches.len() == 1 {
            let mut args = vec![
                self.translate_expr(&branches[0].0, ctx),
                self.translate_expr(&branches[0].1, ctx),
            ];
            if let Some(default) = default {
                args.push(self.translate_expr(default, ctx));
            }
            return DaxExpr::call("IF", args);
        }

        // multi-branch chains keep branch order in a single SWITCH
        let mut args = vec![DaxExpr::call("TRUE", vec![])];
        for (cond, result) in branches {
            args.push(self.translate_expr(cond, ctx));
            args.push(self.translate_expr(result, ctx));
        }
        if let Some(default) = default {
            args.push(self.translate_expr(default, ctx));
        }
        DaxExpr::call("SWITCH", args)
    }

    fn translate_agg(&self, func: AggFunc, arg: &Expr, loc: Loc, ctx: &mut FieldCtx) -> DaxExpr {
        // a bare column aggregates directly; any other inner expression
        // needs the iterator form over the owning table
        if let Expr::Field(ident, _) = arg
            && self.columns.contains_key(ident)
        {
            let column = self.translate_expr(arg, ctx);
            return match func {
                AggFunc::Sum => DaxExpr::call("SUM", vec![column]),
                AggFunc::Avg => DaxExpr::call("AVERAGE", vec![column]),
                AggFunc::Min => DaxExpr::call("MIN", vec![column]),
                AggFunc::Max => DaxExpr::call("MAX", vec![column]),
                AggFunc::Count => DaxExpr::call("COUNTA", vec![column]),
                AggFunc::CountD => DaxExpr::call("DISTINCTCOUNT", vec![column]),
                AggFunc::Median => DaxExpr::call("MEDIAN", vec![column]),
                AggFunc::Stdev => DaxExpr::call("STDEV.S", vec![column]),
                AggFunc::Variance => DaxExpr::call("VAR.S", vec![column]),
                AggFunc::Attr => {
                    let result = DaxExpr::call("SELECTEDVALUE", vec![column]);
                    ctx.closest_match(
                        loc,
                        &result,
                        "attribute aggregation depends on the ambient visual grouping; \
                         SELECTEDVALUE returns blank where the source shows an asterisk",
                    );
                    result
                }
            };
        }

        let table = DaxExpr::Table(ctx.field.table.clone());
        let inner = self.translate_expr(arg, ctx);
        match func {
            AggFunc::Sum => DaxExpr::call("SUMX", vec![table, inner]),
            AggFunc::Avg => DaxExpr::call("AVERAGEX", vec![table, inner]),
            AggFunc::Min => DaxExpr::call("MINX", vec![table, inner]),
            AggFunc::Max => DaxExpr::call("MAXX", vec![table, inner]),
            AggFunc::Count => DaxExpr::call("COUNTAX", vec![table, inner]),
            AggFunc::Median => DaxExpr::call("MEDIANX", vec![table, inner]),
            AggFunc::Stdev => DaxExpr::call("STDEVX.S", vec![table, inner]),
            AggFunc::Variance => DaxExpr::call("VARX.S", vec![table, inner]),
            AggFunc::CountD => {
                let result = DaxExpr::call("DISTINCTCOUNT", vec![inner]);
                ctx.closest_match(
                    loc,
                    &result,
                    "distinct count over a computed expression has no iterator form; \
                     applied to the translated expression directly",
                );
                result
            }
            AggFunc::Attr => {
                let result = DaxExpr::call("SELECTEDVALUE", vec![inner]);
                ctx.closest_match(
                    loc,
                    &result,
                    "attribute aggregation depends on the ambient visual grouping; \
                     SELECTEDVALUE returns blank where the source shows an asterisk",
                );
                result
            }
        }
    }

    /// Level-of-detail scopes become explicit context overrides: the
    /// dimension list turns into filter modifiers on CALCULATE, so the
    /// grouping the source left implicit in the view is spelled out in
    /// the expression itself.
    fn translate_lod(
        &self,
        kind: LodKind,
        dims: &[Ident],
        inner: &Expr,
        loc: Loc,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        let inner_dax = self.translate_expr(inner, ctx);
        let table_name = self
            .columns
            .get(dims.first().map(String::as_str).unwrap_or(""))
            .map(|info| info.table.clone())
            .unwrap_or_else(|| ctx.field.table.clone());

        let mut dim_columns = Vec::new();
        for dim in dims {
            match self.resolve_column(dim) {
                Some(col) => dim_columns.push(col),
                None => {
                    let placeholder = DaxExpr::column(&table_name, dim);
                    ctx.closest_match(
                        loc,
                        &placeholder,
                        "scope dimension does not resolve to a model column",
                    );
                    dim_columns.push(placeholder);
                }
            }
        }

        match kind {
            LodKind::Fixed => {
                if dim_columns.is_empty() {
                    // table-scoped: clear the filter context entirely
                    return DaxExpr::call(
                        "CALCULATE",
                        vec![inner_dax, DaxExpr::call("REMOVEFILTERS", vec![])],
                    );
                }
                let mut args = vec![DaxExpr::Table(table_name)];
                args.extend(dim_columns);
                DaxExpr::call(
                    "CALCULATE",
                    vec![inner_dax, DaxExpr::call("ALLEXCEPT", args)],
                )
            }
            LodKind::Exclude => {
                let mut args = vec![inner_dax];
                args.push(DaxExpr::call("REMOVEFILTERS", dim_columns));
                DaxExpr::call("CALCULATE", args)
            }
            LodKind::Include => {
                let mut args = vec![inner_dax];
                for col in dim_columns {
                    args.push(DaxExpr::call(
                        "KEEPFILTERS",
                        vec![DaxExpr::call("VALUES", vec![col])],
                    ));
                }
                let result = DaxExpr::call("CALCULATE", args);
                ctx.closest_match(
                    loc,
                    &result,
                    "include scopes add dimensions to the ambient visual grouping, which \
                     has no declarative counterpart; approximated with KEEPFILTERS over \
                     the included dimensions",
                );
                result
            }
        }
    }

    fn translate_window(
        &self,
        func: WindowFunc,
        expr: Option<&Expr>,
        frame: WindowFrame,
        ordering: Option<&str>,
        partition: &[Ident],
        loc: Loc,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        let inner = expr.map(|e| self.translate_expr(e, ctx));
        let ordering_col = ordering.and_then(|o| self.resolve_column(o));

        match func {
            WindowFunc::RunningSum | WindowFunc::RunningAvg => {
                let Some(inner) = inner else {
                    return self.window_fallback(None, loc, ctx, "running aggregate without an inner expression");
                };
                match ordering_col {
                    Some(col) => running_aggregate(inner, col),
                    None => self.window_fallback(
                        Some(inner),
                        loc,
                        ctx,
                        "no unambiguous ordering column could be derived from the worksheet \
                         context for this running aggregate",
                    ),
                }
            }
            WindowFunc::WindowSum
            | WindowFunc::WindowAvg
            | WindowFunc::WindowMin
            | WindowFunc::WindowMax => {
                let Some(inner) = inner else {
                    return self.window_fallback(None, loc, ctx, "window aggregate without an inner expression");
                };
                let whole_partition = frame.start.is_none() && frame.end.is_none();
                let table = DaxExpr::Table(ctx.field.table.clone());
                let result = DaxExpr::call(
                    "CALCULATE",
                    vec![inner, DaxExpr::call("ALLSELECTED", vec![table])],
                );
                if !whole_partition {
                    ctx.closest_match(
                        loc,
                        &result,
                        "window frame offsets are approximated by the full partition",
                    );
                }
                result
            }
            WindowFunc::Rank => {
                let Some(inner) = inner else {
                    return self.window_fallback(None, loc, ctx, "rank without an inner expression");
                };
                let scope = if let Some(p) = partition.first().and_then(|p| self.resolve_column(p))
                {
                    DaxExpr::call("ALLSELECTED", vec![p])
                } else {
                    DaxExpr::call(
                        "ALLSELECTED",
                        vec![DaxExpr::Table(ctx.field.table.clone())],
                    )
                };
                let result = DaxExpr::call(
                    "RANKX",
                    vec![scope, DaxExpr::call("CALCULATE", vec![inner])],
                );
                if partition.is_empty() {
                    ctx.closest_match(
                        loc,
                        &result,
                        "no partition could be derived from the worksheet context; ranking \
                         over the whole table",
                    );
                }
                result
            }
            WindowFunc::Index => match ordering_col {
                Some(col) => row_number(col),
                None => self.window_fallback(
                    None,
                    loc,
                    ctx,
                    "index depends on an ordering column the worksheet context does not \
                     provide",
                ),
            },
            WindowFunc::First | WindowFunc::Last | WindowFunc::Lookup => self.window_fallback(
                inner,
                loc,
                ctx,
                "positional table calculations have no declarative counterpart",
            ),
        }
    }

    fn window_fallback(
        &self,
        inner: Option<DaxExpr>,
        loc: Loc,
        ctx: &mut FieldCtx,
        reason: &str,
    ) -> DaxExpr {
        let result = inner.unwrap_or(DaxExpr::Blank);
        ctx.closest_match(loc, &result, reason);
        result
    }

    fn translate_call(
        &self,
        func: &str,
        args: &[Expr],
        loc: Loc,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        let dax_args: Vec<DaxExpr> = args.iter().map(|a| self.translate_expr(a, ctx)).collect();

        // functions that keep their name and argument order
        const SAME_NAME: &[&str] = &[
            "abs", "sqrt", "exp", "ln", "log", "power", "round", "sign", "left", "right", "mid",
            "len", "trim", "ltrim", "rtrim", "upper", "lower", "year", "month", "day", "today",
            "now", "min", "max",
        ];
        if SAME_NAME.contains(&func) {
            return DaxExpr::Call(func.to_uppercase(), dax_args);
        }

        match (func, dax_args.len()) {
            ("isnull", 1) => DaxExpr::call("ISBLANK", dax_args),
            ("ifnull", 2) => DaxExpr::call("COALESCE", dax_args),
            ("zn", 1) => {
                let mut args = dax_args;
                args.push(DaxExpr::Number("0".to_string()));
                DaxExpr::call("COALESCE", args)
            }
            ("int", 1) => DaxExpr::call("TRUNC", dax_args),
            ("replace", 3) => DaxExpr::call("SUBSTITUTE", dax_args),
            ("contains", 2) => DaxExpr::call("CONTAINSSTRING", dax_args),
            ("find", 2) => {
                // argument order swaps, and the not-found result is 0
                // in both languages only with the explicit default
                let mut args = dax_args;
                let substring = args.pop().unwrap();
                let string = args.pop().unwrap();
                DaxExpr::call(
                    "FIND",
                    vec![
                        substring,
                        string,
                        DaxExpr::Number("1".to_string()),
                        DaxExpr::Number("0".to_string()),
                    ],
                )
            }
            ("datepart", 2) => self.translate_datepart(args, dax_args, loc, ctx),
            ("datetrunc", 2) => self.translate_datetrunc(args, dax_args, loc, ctx),
            ("datediff", 3) => self.translate_datediff(args, dax_args, loc, ctx),
            ("dateadd", 3) => self.translate_dateadd(args, dax_args, loc, ctx),
            ("str", 1) => {
                let mut args = dax_args;
                args.push(DaxExpr::Str("General".to_string()));
                let result = DaxExpr::call("FORMAT", args);
                ctx.closest_match(
                    loc,
                    &result,
                    "string conversion formatting is locale-dependent in both languages",
                );
                result
            }
            _ => {
                // no rule matched: carry the call through by name so
                // the approximation is visible in the emitted model
                let result = DaxExpr::Call(func.to_uppercase(), dax_args);
                ctx.closest_match(
                    loc,
                    &result,
                    "function has no direct counterpart in the target language; carried \
                     through by name",
                );
                result
            }
        }
    }

    fn translate_datepart(
        &self,
        args: &[Expr],
        mut dax_args: Vec<DaxExpr>,
        loc: Loc,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        let date = dax_args.pop().unwrap();
        match part_literal(&args[0]) {
            Some("year") => DaxExpr::call("YEAR", vec![date]),
            Some("quarter") => DaxExpr::call("QUARTER", vec![date]),
            Some("month") => DaxExpr::call("MONTH", vec![date]),
            Some("day") => DaxExpr::call("DAY", vec![date]),
            Some("hour") => DaxExpr::call("HOUR", vec![date]),
            Some("minute") => DaxExpr::call("MINUTE", vec![date]),
            Some("second") => DaxExpr::call("SECOND", vec![date]),
            Some("weekday") => DaxExpr::call("WEEKDAY", vec![date]),
            Some("week") => {
                let result = DaxExpr::call("WEEKNUM", vec![date]);
                ctx.closest_match(
                    loc,
                    &result,
                    "week numbering systems differ between the two tools",
                );
                result
            }
            _ => {
                let result = DaxExpr::call("MONTH", vec![date]);
                ctx.closest_match(
                    loc,
                    &result,
                    "date part is not a recognized literal; defaulted to month",
                );
                result
            }
        }
    }

    fn translate_datetrunc(
        &self,
        args: &[Expr],
        mut dax_args: Vec<DaxExpr>,
        loc: Loc,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        let date = dax_args.pop().unwrap();
        let one = || DaxExpr::Number("1".to_string());
        match part_literal(&args[0]) {
            Some("year") => DaxExpr::call(
                "DATE",
                vec![DaxExpr::call("YEAR", vec![date]), one(), one()],
            ),
            Some("month") => DaxExpr::call(
                "DATE",
                vec![
                    DaxExpr::call("YEAR", vec![date.clone()]),
                    DaxExpr::call("MONTH", vec![date]),
                    one(),
                ],
            ),
            Some("day") => DaxExpr::call(
                "DATE",
                vec![
                    DaxExpr::call("YEAR", vec![date.clone()]),
                    DaxExpr::call("MONTH", vec![date.clone()]),
                    DaxExpr::call("DAY", vec![date]),
                ],
            ),
            Some("quarter") => {
                // month = 3 * (quarter - 1) + 1
                let month = DaxExpr::Op2(
                    DaxOp::Add,
                    Box::new(DaxExpr::Op2(
                        DaxOp::Mul,
                        Box::new(DaxExpr::Number("3".to_string())),
                        Box::new(DaxExpr::Op2(
                            DaxOp::Sub,
                            Box::new(DaxExpr::call("QUARTER", vec![date.clone()])),
                            Box::new(one()),
                        )),
                    )),
                    Box::new(one()),
                );
                DaxExpr::call(
                    "DATE",
                    vec![DaxExpr::call("YEAR", vec![date]), month, one()],
                )
            }
            _ => {
                let result = date;
                ctx.closest_match(
                    loc,
                    &result,
                    "date truncation to this part has no direct counterpart; the date is \
                     carried through untruncated",
                );
                result
            }
        }
    }

    fn translate_datediff(
        &self,
        args: &[Expr],
        mut dax_args: Vec<DaxExpr>,
        loc: Loc,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        let end = dax_args.pop().unwrap();
        let start = dax_args.pop().unwrap();
        let interval = match part_literal(&args[0]) {
            Some("year") => Some("YEAR"),
            Some("quarter") => Some("QUARTER"),
            Some("month") => Some("MONTH"),
            Some("week") => Some("WEEK"),
            Some("day") => Some("DAY"),
            Some("hour") => Some("HOUR"),
            Some("minute") => Some("MINUTE"),
            Some("second") => Some("SECOND"),
            _ => None,
        };
        match interval {
            Some(interval) => DaxExpr::call(
                "DATEDIFF",
                vec![start, end, DaxExpr::Keyword(interval.to_string())],
            ),
            None => {
                let result = DaxExpr::call(
                    "DATEDIFF",
                    vec![start, end, DaxExpr::Keyword("DAY".to_string())],
                );
                ctx.closest_match(
                    loc,
                    &result,
                    "date difference part is not a recognized literal; defaulted to days",
                );
                result
            }
        }
    }

    fn translate_dateadd(
        &self,
        args: &[Expr],
        mut dax_args: Vec<DaxExpr>,
        loc: Loc,
        ctx: &mut FieldCtx,
    ) -> DaxExpr {
        let date = dax_args.pop().unwrap();
        let n = dax_args.pop().unwrap();
        match part_literal(&args[0]) {
            Some("month") => DaxExpr::call("EDATE", vec![date, n]),
            Some("year") => DaxExpr::call(
                "EDATE",
                vec![
                    date,
                    DaxExpr::Op2(
                        DaxOp::Mul,
                        Box::new(DaxExpr::Number("12".to_string())),
                        Box::new(n),
                    ),
                ],
            ),
            Some("day") => DaxExpr::Op2(DaxOp::Add, Box::new(date), Box::new(n)),
            Some("week") => DaxExpr::Op2(
                DaxOp::Add,
                Box::new(date),
                Box::new(DaxExpr::Op2(
                    DaxOp::Mul,
                    Box::new(DaxExpr::Number("7".to_string())),
                    Box::new(n),
                )),
            ),
            _ => {
                let result = date;
                ctx.closest_match(
                    loc,
                    &result,
                    "date shift by this part has no direct counterpart; the date is \
                     carried through unshifted",
                );
                result
            }
        }
    }

    fn resolve_column(&self, ident: &str) -> Option<DaxExpr> {
        if let Some(info) = self.columns.get(ident) {
            return Some(DaxExpr::column(&info.table, &info.column));
        }
        if let Some((FieldKind::DerivedColumn, name, table)) = self.translated.get(ident) {
            return Some(DaxExpr::column(table, name));
        }
        None
    }

    fn is_stringish(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Str(_, _) => true,
            Expr::Field(ident, _) => self
                .columns
                .get(ident)
                .is_some_and(|info| info.data_type == DataType::String),
            Expr::App(func, _, _) => matches!(
                func.as_str(),
                "left" | "right" | "mid" | "trim" | "ltrim" | "rtrim" | "upper" | "lower" | "str"
            ),
            _ => false,
        }
    }
}

struct FieldCtx<'f> {
    field: &'f Field,
    confidence: Confidence,
    assumptions: Vec<Assumption>,
}

impl FieldCtx<'_> {
    fn closest_match(&mut self, loc: Loc, target: &DaxExpr, reason: &str) {
        self.confidence = Confidence::ClosestMatch;
        let start = (loc.start as usize).min(self.field.formula.len());
        let end = (loc.end as usize).min(self.field.formula.len());
        self.assumptions.push(Assumption {
            location: self.field.name.clone(),
            source_text: self.field.formula[start..end].to_string(),
            target_text: target.render(),
            reason: reason.to_string(),
        });
    }
}

/// `CALCULATE(inner, FILTER(ALLSELECTED(col), col <= MAX(col)))`: the
/// classic running-total shape over an explicit ordering column.
fn running_aggregate(inner: DaxExpr, ordering: DaxExpr) -> DaxExpr {
    let filter = DaxExpr::call(
        "FILTER",
        vec![
            DaxExpr::call("ALLSELECTED", vec![ordering.clone()]),
            DaxExpr::Op2(
                DaxOp::Lte,
                Box::new(ordering.clone()),
                Box::new(DaxExpr::call("MAX", vec![ordering])),
            ),
        ],
    );
    DaxExpr::call("CALCULATE", vec![inner, filter])
}

/// Row number along an ordering column, as a count of preceding rows.
fn row_number(ordering: DaxExpr) -> DaxExpr {
    let filter = DaxExpr::call(
        "FILTER",
        vec![
            DaxExpr::call("ALLSELECTED", vec![ordering.clone()]),
            DaxExpr::Op2(
                DaxOp::Lte,
                Box::new(ordering.clone()),
                Box::new(DaxExpr::call("MAX", vec![ordering])),
            ),
        ],
    );
    DaxExpr::call("COUNTROWS", vec![filter])
}

fn part_literal(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Str(text, _) => Some(text.as_str()),
        _ => None,
    }
}
