// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! AST and renderer for the target expression language.  The
//! translator builds these trees; the model emitter renders them into
//! measure and column definitions.

use std::fmt::Write;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DaxOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// String concatenation (`&`).
    Concat,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl DaxOp {
    fn symbol(&self) -> &'static str {
        match self {
            DaxOp::Add => "+",
            DaxOp::Sub => "-",
            DaxOp::Mul => "*",
            DaxOp::Div => "/",
            DaxOp::Pow => "^",
            DaxOp::Concat => "&",
            DaxOp::Eq => "=",
            DaxOp::Neq => "<>",
            DaxOp::Lt => "<",
            DaxOp::Lte => "<=",
            DaxOp::Gt => ">",
            DaxOp::Gte => ">=",
            DaxOp::And => "&&",
            DaxOp::Or => "||",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            DaxOp::Or => 1,
            DaxOp::And => 2,
            DaxOp::Eq | DaxOp::Neq | DaxOp::Lt | DaxOp::Lte | DaxOp::Gt | DaxOp::Gte => 3,
            DaxOp::Concat => 4,
            DaxOp::Add | DaxOp::Sub => 5,
            DaxOp::Mul | DaxOp::Div => 6,
            DaxOp::Pow => 7,
        }
    }

    fn is_right_associative(&self) -> bool {
        matches!(self, DaxOp::Pow)
    }
}

#[derive(PartialEq, Clone, Debug)]
pub enum DaxExpr {
    /// Numeric literal, kept as source text so rendering is
    /// byte-stable.
    Number(String),
    Str(String),
    Bool(bool),
    Blank,
    /// `'Table'[Column]`
    Column { table: String, column: String },
    /// `[Measure]`
    Measure(String),
    /// `'Table'`
    Table(String),
    Call(String, Vec<DaxExpr>),
    Op2(DaxOp, Box<DaxExpr>, Box<DaxExpr>),
    Neg(Box<DaxExpr>),
    /// A bare enumeration literal like `DAY` in `DATEDIFF(a, b, DAY)`.
    Keyword(String),
}

impl DaxExpr {
    pub fn call(name: &str, args: Vec<DaxExpr>) -> DaxExpr {
        DaxExpr::Call(name.to_string(), args)
    }

    pub fn column(table: &str, column: &str) -> DaxExpr {
        DaxExpr::Column {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            DaxExpr::Op2(op, _, _) => op.precedence(),
            DaxExpr::Neg(_) => 8,
            _ => 9,
        }
    }

    /// Render to target expression text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        match self {
            DaxExpr::Number(text) => out.push_str(text),
            DaxExpr::Str(text) => {
                out.push('"');
                out.push_str(&text.replace('"', "\"\""));
                out.push('"');
            }
            DaxExpr::Bool(true) => out.push_str("TRUE()"),
            DaxExpr::Bool(false) => out.push_str("FALSE()"),
            DaxExpr::Blank => out.push_str("BLANK()"),
            DaxExpr::Column { table, column } => {
                let _ = write!(out, "{}[{}]", quote_table(table), column);
            }
            DaxExpr::Measure(name) => {
                let _ = write!(out, "[{name}]");
            }
            DaxExpr::Table(name) => out.push_str(&quote_table(name)),
            DaxExpr::Call(name, args) => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.write(out);
                }
                out.push(')');
            }
            DaxExpr::Op2(op, l, r) => {
                let prec = op.precedence();
                let (l_needs, r_needs) = if op.is_right_associative() {
                    (l.precedence() <= prec, r.precedence() < prec)
                } else {
                    (l.precedence() < prec, r.precedence() <= prec)
                };
                write_child(out, l, l_needs);
                let _ = write!(out, " {} ", op.symbol());
                write_child(out, r, r_needs);
            }
            DaxExpr::Neg(inner) => {
                out.push('-');
                write_child(out, inner, inner.precedence() < 8);
            }
            DaxExpr::Keyword(text) => out.push_str(text),
        }
    }
}

fn write_child(out: &mut String, child: &DaxExpr, parens: bool) {
    if parens {
        out.push('(');
        child.write(out);
        out.push(')');
    } else {
        child.write(out);
    }
}

/// Table names with anything beyond identifier characters must be
/// single-quoted in column references.
pub fn quote_table(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.chars().next().unwrap().is_ascii_digit();
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
