// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! AST for the source calculation language, built by the parser and
//! consumed by the dependency resolver and the translator.  The node
//! set is closed on purpose: the translator's rule table matches on it
//! exhaustively, so an unhandled shape is a compile error here rather
//! than a surprise at runtime.

use std::collections::BTreeSet;

use crate::common::Ident;

// formulas are strings typed by humans for a single field -- u16 is
// long enough
#[derive(PartialEq, Clone, Copy, Debug, Default)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum UnaryOp {
    Negative,
    Not,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

/// Aggregation wrappers the source grammar knows about.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountD,
    Median,
    Stdev,
    Variance,
    Attr,
}

impl AggFunc {
    pub fn from_name(name: &str) -> Option<AggFunc> {
        let func = match name {
            "sum" => AggFunc::Sum,
            "avg" => AggFunc::Avg,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            "count" => AggFunc::Count,
            "countd" => AggFunc::CountD,
            "median" => AggFunc::Median,
            "stdev" => AggFunc::Stdev,
            "var" | "variance" => AggFunc::Variance,
            "attr" => AggFunc::Attr,
            _ => return None,
        };
        Some(func)
    }
}

/// How a level-of-detail scope overrides the ambient evaluation
/// context.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LodKind {
    Fixed,
    Include,
    Exclude,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum WindowFunc {
    RunningSum,
    RunningAvg,
    WindowSum,
    WindowAvg,
    WindowMin,
    WindowMax,
    Rank,
    Index,
    First,
    Last,
    Lookup,
}

impl WindowFunc {
    pub fn from_name(name: &str) -> Option<WindowFunc> {
        let func = match name {
            "running_sum" => WindowFunc::RunningSum,
            "running_avg" => WindowFunc::RunningAvg,
            "window_sum" => WindowFunc::WindowSum,
            "window_avg" => WindowFunc::WindowAvg,
            "window_min" => WindowFunc::WindowMin,
            "window_max" => WindowFunc::WindowMax,
            "rank" => WindowFunc::Rank,
            "index" => WindowFunc::Index,
            "first" => WindowFunc::First,
            "last" => WindowFunc::Last,
            "lookup" => WindowFunc::Lookup,
            _ => return None,
        };
        Some(func)
    }
}

/// Window frame offsets, e.g. the `-2, 0` in `WINDOW_SUM(expr, -2, 0)`.
/// `None` on both ends means the whole partition.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct WindowFrame {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

// we use Boxes here because the translator walks and rewrites ASTs;
// we want to avoid copying subexpressions all over the place.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(String, f64, Loc),
    Str(String, Loc),
    Bool(bool, Loc),
    Null(Loc),
    /// A `[Field]` reference, canonicalized.
    Field(Ident, Loc),
    /// A call to a row-level function, by lowercased name.
    App(Ident, Vec<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
    /// Ordered (condition, result) branches plus the else branch.
    /// Covers IF/ELSEIF/ELSE/END and three-argument IIF.
    If(Vec<(Expr, Expr)>, Option<Box<Expr>>, Loc),
    /// CASE subject WHEN value THEN result ... ELSE default END.
    Case(Box<Expr>, Vec<(Expr, Expr)>, Option<Box<Expr>>, Loc),
    Agg(AggFunc, Box<Expr>, Loc),
    /// `{FIXED|INCLUDE|EXCLUDE dims : expr}`.
    Lod(LodKind, Vec<Ident>, Box<Expr>, Loc),
    /// A table calculation.  Ordering and partition come from the
    /// worksheet context the formula is evaluated in; they are carried
    /// here explicitly so the translator never has to re-derive them.
    Window {
        func: WindowFunc,
        expr: Option<Box<Expr>>,
        frame: WindowFrame,
        ordering: Option<Ident>,
        partition: Vec<Ident>,
        loc: Loc,
    },
}

impl Expr {
    pub fn get_loc(&self) -> Loc {
        match self {
            Expr::Const(_, _, loc) => *loc,
            Expr::Str(_, loc) => *loc,
            Expr::Bool(_, loc) => *loc,
            Expr::Null(loc) => *loc,
            Expr::Field(_, loc) => *loc,
            Expr::App(_, _, loc) => *loc,
            Expr::Op1(_, _, loc) => *loc,
            Expr::Op2(_, _, _, loc) => *loc,
            Expr::If(_, _, loc) => *loc,
            Expr::Case(_, _, _, loc) => *loc,
            Expr::Agg(_, _, loc) => *loc,
            Expr::Lod(_, _, _, loc) => *loc,
            Expr::Window { loc, .. } => *loc,
        }
    }

    /// Collect every `[Field]` reference in the tree, including the
    /// dimension lists of level-of-detail scopes.
    pub fn identifier_set(&self) -> BTreeSet<Ident> {
        let mut idents = BTreeSet::new();
        self.collect_idents(&mut idents);
        idents
    }

    fn collect_idents(&self, idents: &mut BTreeSet<Ident>) {
        match self {
            Expr::Const(_, _, _) | Expr::Str(_, _) | Expr::Bool(_, _) | Expr::Null(_) => {}
            Expr::Field(ident, _) => {
                idents.insert(ident.clone());
            }
            Expr::App(_, args, _) => {
                for arg in args {
                    arg.collect_idents(idents);
                }
            }
            Expr::Op1(_, r, _) => r.collect_idents(idents),
            Expr::Op2(_, l, r, _) => {
                l.collect_idents(idents);
                r.collect_idents(idents);
            }
            Expr::If(branches, default, _) => {
                for (cond, result) in branches {
                    cond.collect_idents(idents);
                    result.collect_idents(idents);
                }
                if let Some(default) = default {
                    default.collect_idents(idents);
                }
            }
            Expr::Case(subject, branches, default, _) => {
                subject.collect_idents(idents);
                for (value, result) in branches {
                    value.collect_idents(idents);
                    result.collect_idents(idents);
                }
                if let Some(default) = default {
                    default.collect_idents(idents);
                }
            }
            Expr::Agg(_, arg, _) => arg.collect_idents(idents),
            Expr::Lod(_, dims, inner, _) => {
                for dim in dims {
                    idents.insert(dim.clone());
                }
                inner.collect_idents(idents);
            }
            Expr::Window {
                expr,
                ordering,
                partition,
                ..
            } => {
                if let Some(expr) = expr {
                    expr.collect_idents(idents);
                }
                if let Some(ordering) = ordering {
                    idents.insert(ordering.clone());
                }
                for dim in partition {
                    idents.insert(dim.clone());
                }
            }
        }
    }

    /// True if evaluating this expression requires aggregate context:
    /// it contains an aggregation wrapper, a level-of-detail scope, or
    /// a window function anywhere in the tree.  Drives the
    /// measure-vs-derived-column classification.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Expr::Const(_, _, _)
            | Expr::Str(_, _)
            | Expr::Bool(_, _)
            | Expr::Null(_)
            | Expr::Field(_, _) => false,
            Expr::App(_, args, _) => args.iter().any(|a| a.is_aggregate()),
            Expr::Op1(_, r, _) => r.is_aggregate(),
            Expr::Op2(_, l, r, _) => l.is_aggregate() || r.is_aggregate(),
            Expr::If(branches, default, _) => {
                branches
                    .iter()
                    .any(|(c, r)| c.is_aggregate() || r.is_aggregate())
                    || default.as_ref().is_some_and(|d| d.is_aggregate())
            }
            Expr::Case(subject, branches, default, _) => {
                subject.is_aggregate()
                    || branches
                        .iter()
                        .any(|(v, r)| v.is_aggregate() || r.is_aggregate())
                    || default.as_ref().is_some_and(|d| d.is_aggregate())
            }
            Expr::Agg(_, _, _) | Expr::Lod(_, _, _, _) | Expr::Window { .. } => true,
        }
    }
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Const("0.0".to_string(), 0.0, Loc::default())
    }
}
