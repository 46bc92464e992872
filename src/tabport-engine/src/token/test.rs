// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::Token::*;
use super::*;

fn lex(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input)
        .map(|t| t.unwrap())
        .map(|(_, tok, _)| tok)
        .collect()
}

#[test]
fn test_operators() {
    assert_eq!(
        vec![Plus, Minus, Mul, Div, Mod, Exp],
        lex("+ - * / % ^")
    );
    assert_eq!(vec![Eq, Eq, Neq, Neq], lex("= == <> !="));
    assert_eq!(vec![Lt, Lte, Gt, Gte], lex("< <= > >="));
}

#[test]
fn test_keywords_are_case_insensitive() {
    assert_eq!(vec![If, Then, Else, End], lex("IF THEN ELSE END"));
    assert_eq!(vec![If, Then, ElseIf, Else, End], lex("if then elseif else end"));
    assert_eq!(vec![Case, When, And, Or, Not], lex("CASE when AND or NOT"));
    assert_eq!(vec![True, False, Null], lex("TRUE false NULL"));
}

#[test]
fn test_field_refs() {
    assert_eq!(vec![FieldRef("Sales")], lex("[Sales]"));
    assert_eq!(vec![FieldRef("Order Date")], lex("[Order Date]"));
    assert_eq!(
        vec![Ident("SUM"), LParen, FieldRef("Profit"), RParen],
        lex("SUM([Profit])")
    );
}

#[test]
fn test_strings() {
    assert_eq!(vec![Str("East")], lex("'East'"));
    assert_eq!(vec![Str("East")], lex("\"East\""));
    assert_eq!(vec![Str("it's")], lex("\"it's\""));
}

#[test]
fn test_numbers() {
    assert_eq!(vec![Num("42")], lex("42"));
    assert_eq!(vec![Num("3.14")], lex("3.14"));
    assert_eq!(vec![Num(".5")], lex(".5"));
    assert_eq!(vec![Num("1e6")], lex("1e6"));
    assert_eq!(vec![Num("2.5E-3")], lex("2.5E-3"));
}

#[test]
fn test_lod_braces() {
    assert_eq!(
        vec![
            LBrace,
            Fixed,
            FieldRef("Region"),
            Colon,
            Ident("SUM"),
            LParen,
            FieldRef("Sales"),
            RParen,
            RBrace
        ],
        lex("{FIXED [Region] : SUM([Sales])}")
    );
}

#[test]
fn test_comments() {
    assert_eq!(vec![Num("1"), Plus, Num("2")], lex("1 + // note\n2"));
    assert_eq!(vec![Num("1"), Plus, Num("2")], lex("1 + /* note */ 2"));
    assert_eq!(Vec::<Token>::new(), lex("// only a comment"));
}

#[test]
fn test_unclosed_errors() {
    let result: Result<Vec<_>, _> = Lexer::new("[Sales").collect();
    assert_eq!(ErrorCode::UnclosedFieldRef, result.unwrap_err().code);

    let result: Result<Vec<_>, _> = Lexer::new("'East").collect();
    assert_eq!(ErrorCode::UnclosedString, result.unwrap_err().code);

    let result: Result<Vec<_>, _> = Lexer::new("1 /* oops").collect();
    assert_eq!(ErrorCode::UnclosedComment, result.unwrap_err().code);
}

#[test]
fn test_spans() {
    let toks: Vec<_> = Lexer::new("SUM([Profit])")
        .map(|t| t.unwrap())
        .collect();
    assert_eq!((0, Ident("SUM"), 3), toks[0]);
    assert_eq!((3, LParen, 4), toks[1]);
    assert_eq!((4, FieldRef("Profit"), 12), toks[2]);
    assert_eq!((12, RParen, 13), toks[3]);
}
