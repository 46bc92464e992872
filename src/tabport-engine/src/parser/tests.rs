// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::*;
use crate::ast::{AggFunc, BinaryOp, Expr, LodKind, WindowFunc};
use crate::common::ErrorCode;

fn parse(text: &str) -> Expr {
    parse_expression(text).unwrap().unwrap()
}

fn strip(expr: Expr) -> Expr {
    // locations are covered by dedicated tests; most assertions only
    // care about shape
    match expr {
        Expr::Const(s, n, _) => Expr::Const(s, n, Loc::default()),
        Expr::Str(s, _) => Expr::Str(s, Loc::default()),
        Expr::Bool(b, _) => Expr::Bool(b, Loc::default()),
        Expr::Null(_) => Expr::Null(Loc::default()),
        Expr::Field(id, _) => Expr::Field(id, Loc::default()),
        Expr::App(f, args, _) => {
            Expr::App(f, args.into_iter().map(strip).collect(), Loc::default())
        }
        Expr::Op1(op, r, _) => Expr::Op1(op, Box::new(strip(*r)), Loc::default()),
        Expr::Op2(op, l, r, _) => Expr::Op2(
            op,
            Box::new(strip(*l)),
            Box::new(strip(*r)),
            Loc::default(),
        ),
        Expr::If(branches, default, _) => Expr::If(
            branches
                .into_iter()
                .map(|(c, r)| (strip(c), strip(r)))
                .collect(),
            default.map(|d| Box::new(strip(*d))),
            Loc::default(),
        ),
        Expr::Case(subject, branches, default, _) => Expr::Case(
            Box::new(strip(*subject)),
            branches
                .into_iter()
                .map(|(v, r)| (strip(v), strip(r)))
                .collect(),
            default.map(|d| Box::new(strip(*d))),
            Loc::default(),
        ),
        Expr::Agg(f, arg, _) => Expr::Agg(f, Box::new(strip(*arg)), Loc::default()),
        Expr::Lod(k, dims, inner, _) => {
            Expr::Lod(k, dims, Box::new(strip(*inner)), Loc::default())
        }
        Expr::Window {
            func,
            expr,
            frame,
            ordering,
            partition,
            ..
        } => Expr::Window {
            func,
            expr: expr.map(|e| Box::new(strip(*e))),
            frame,
            ordering,
            partition,
            loc: Loc::default(),
        },
    }
}

fn field(name: &str) -> Expr {
    Expr::Field(name.to_string(), Loc::default())
}

fn num(text: &str) -> Expr {
    Expr::Const(text.to_string(), text.parse().unwrap(), Loc::default())
}

#[test]
fn test_empty_input() {
    assert_eq!(None, parse_expression("").unwrap());
    assert_eq!(None, parse_expression("  // nothing here").unwrap());
}

#[test]
fn test_aggregation_over_field() {
    let expected = Expr::Agg(
        AggFunc::Sum,
        Box::new(field("profit")),
        Loc::default(),
    );
    assert_eq!(expected, strip(parse("SUM([Profit])")));
}

#[test]
fn test_aggregate_ratio() {
    let expected = Expr::Op2(
        BinaryOp::Div,
        Box::new(Expr::Agg(
            AggFunc::Sum,
            Box::new(field("profit")),
            Loc::default(),
        )),
        Box::new(Expr::Agg(
            AggFunc::Sum,
            Box::new(field("sales")),
            Loc::default(),
        )),
        Loc::default(),
    );
    assert_eq!(expected, strip(parse("SUM([Profit]) / SUM([Sales])")));
}

#[test]
fn test_operator_precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3)
    let expected = Expr::Op2(
        BinaryOp::Add,
        Box::new(num("1")),
        Box::new(Expr::Op2(
            BinaryOp::Mul,
            Box::new(num("2")),
            Box::new(num("3")),
            Loc::default(),
        )),
        Loc::default(),
    );
    assert_eq!(expected, strip(parse("1 + 2 * 3")));
}

#[test]
fn test_comparison_and_logic() {
    // [Sales] > 100 AND [Profit] > 0
    let expected = Expr::Op2(
        BinaryOp::And,
        Box::new(Expr::Op2(
            BinaryOp::Gt,
            Box::new(field("sales")),
            Box::new(num("100")),
            Loc::default(),
        )),
        Box::new(Expr::Op2(
            BinaryOp::Gt,
            Box::new(field("profit")),
            Box::new(num("0")),
            Loc::default(),
        )),
        Loc::default(),
    );
    assert_eq!(expected, strip(parse("[Sales] > 100 AND [Profit] > 0")));
}

#[test]
fn test_if_elseif_else() {
    let expr = parse("IF [Sales] > 100 THEN 'High' ELSEIF [Sales] > 10 THEN 'Mid' ELSE 'Low' END");
    if let Expr::If(branches, default, _) = strip(expr) {
        assert_eq!(2, branches.len());
        assert_eq!(Expr::Str("Mid".to_string(), Loc::default()), branches[1].1);
        assert_eq!(
            Some(Box::new(Expr::Str("Low".to_string(), Loc::default()))),
            default
        );
    } else {
        panic!("expected If");
    }
}

#[test]
fn test_case_when() {
    let expr = parse("CASE [Region] WHEN 'East' THEN 1 WHEN 'West' THEN 2 ELSE 0 END");
    if let Expr::Case(subject, branches, default, _) = strip(expr) {
        assert_eq!(field("region"), *subject);
        assert_eq!(2, branches.len());
        assert!(default.is_some());
    } else {
        panic!("expected Case");
    }
}

#[test]
fn test_iif_three_args_is_conditional() {
    let expr = parse("IIF([Profit] > 0, 1, 0)");
    if let Expr::If(branches, default, _) = strip(expr) {
        assert_eq!(1, branches.len());
        assert_eq!(num("1"), branches[0].1);
        assert_eq!(Some(Box::new(num("0"))), default);
    } else {
        panic!("expected If");
    }
}

#[test]
fn test_iif_four_args_stays_a_call() {
    let expr = parse("IIF([Profit] > 0, 1, 0, -1)");
    assert!(matches!(strip(expr), Expr::App(f, args, _) if f == "iif" && args.len() == 4));
}

#[test]
fn test_lod_fixed() {
    let expr = parse("{FIXED [Region], [Category] : SUM([Sales])}");
    if let Expr::Lod(kind, dims, inner, _) = strip(expr) {
        assert_eq!(LodKind::Fixed, kind);
        assert_eq!(vec!["region".to_string(), "category".to_string()], dims);
        assert!(matches!(*inner, Expr::Agg(AggFunc::Sum, _, _)));
    } else {
        panic!("expected Lod");
    }
}

#[test]
fn test_lod_shorthand_is_table_scoped_fixed() {
    let expr = parse("{SUM([Sales])}");
    if let Expr::Lod(kind, dims, _, _) = strip(expr) {
        assert_eq!(LodKind::Fixed, kind);
        assert!(dims.is_empty());
    } else {
        panic!("expected Lod");
    }
}

#[test]
fn test_lod_exclude_requires_dims() {
    let err = parse_expression("{EXCLUDE : SUM([Sales])}").unwrap_err();
    assert_eq!(ErrorCode::BadLodSpec, err.code);
}

#[test]
fn test_window_sum_with_frame() {
    let expr = parse("WINDOW_SUM(SUM([Sales]), -2, 0)");
    if let Expr::Window {
        func, expr, frame, ..
    } = strip(expr)
    {
        assert_eq!(WindowFunc::WindowSum, func);
        assert_eq!(Some(-2), frame.start);
        assert_eq!(Some(0), frame.end);
        assert!(expr.is_some());
    } else {
        panic!("expected Window");
    }
}

#[test]
fn test_window_context_is_attached() {
    let ctx = ExprContext {
        ordering: Some("order_date".to_string()),
        partition: vec!["region".to_string()],
    };
    let expr = parse_expression_ctx("RUNNING_SUM(SUM([Sales]))", &ctx)
        .unwrap()
        .unwrap();
    if let Expr::Window {
        ordering,
        partition,
        ..
    } = expr
    {
        assert_eq!(Some("order_date".to_string()), ordering);
        assert_eq!(vec!["region".to_string()], partition);
    } else {
        panic!("expected Window");
    }
}

#[test]
fn test_index_takes_no_args() {
    let expr = parse("INDEX()");
    assert!(matches!(
        strip(expr),
        Expr::Window {
            func: WindowFunc::Index,
            expr: None,
            ..
        }
    ));
}

#[test]
fn test_unknown_function_is_an_app() {
    let expr = parse("DATEPART('year', [Order Date])");
    if let Expr::App(func, args, _) = strip(expr) {
        assert_eq!("datepart", func);
        assert_eq!(2, args.len());
        assert_eq!(field("order_date"), args[1]);
    } else {
        panic!("expected App");
    }
}

#[test]
fn test_syntax_error_offsets() {
    let err = parse_expression("SUM([Sales]) +").unwrap_err();
    assert_eq!(ErrorCode::UnrecognizedEof, err.code);

    let err = parse_expression("SUM([Sales]) 3").unwrap_err();
    assert_eq!(ErrorCode::ExtraToken, err.code);
    assert_eq!(13, err.start);

    let err = parse_expression("SUM()").unwrap_err();
    assert_eq!(ErrorCode::BadFunctionArgs, err.code);
}

#[test]
fn test_agg_arity_is_checked() {
    let err = parse_expression("SUM([a], [b])").unwrap_err();
    assert_eq!(ErrorCode::BadFunctionArgs, err.code);
}

#[test]
fn test_power_is_right_associative() {
    // 2 ^ 3 ^ 2 parses as 2 ^ (3 ^ 2)
    let expected = Expr::Op2(
        BinaryOp::Exp,
        Box::new(num("2")),
        Box::new(Expr::Op2(
            BinaryOp::Exp,
            Box::new(num("3")),
            Box::new(num("2")),
            Loc::default(),
        )),
        Loc::default(),
    );
    assert_eq!(expected, strip(parse("2 ^ 3 ^ 2")));
}

#[test]
fn test_parenthesized_grouping() {
    let expected = Expr::Op2(
        BinaryOp::Mul,
        Box::new(Expr::Op2(
            BinaryOp::Add,
            Box::new(num("1")),
            Box::new(num("2")),
            Loc::default(),
        )),
        Box::new(num("3")),
        Loc::default(),
    );
    assert_eq!(expected, strip(parse("(1 + 2) * 3")));
}
