// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for calculation formulas.
//!
//! Produces the closed `ast::Expr` node set.  Aggregation wrappers,
//! level-of-detail scopes and window functions are recognized here so
//! the translator can match on structure instead of function names.

use crate::ast::{AggFunc, BinaryOp, Expr, Loc, LodKind, UnaryOp, WindowFrame, WindowFunc};
use crate::common::{ErrorCode, ExprError, ExprResult, Ident, canonicalize};
use crate::token::{Lexer, Spanned, Token};

#[cfg(test)]
mod tests;

/// Worksheet-derived context for table calculations: the ordering
/// column and partition dimensions implied by the sheet the formula
/// lives on.  Attached to window nodes at parse time so nothing
/// downstream has to re-derive it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExprContext {
    pub ordering: Option<Ident>,
    pub partition: Vec<Ident>,
}

/// TokenKind discriminant for efficient peek comparisons without
/// payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    If,
    Then,
    ElseIf,
    Else,
    End,
    Case,
    When,
    And,
    Or,
    Not,
    True,
    False,
    Null,
    Fixed,
    Include,
    Exclude,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Exp,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Ident,
    Num,
    Str,
    FieldRef,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::If => TokenKind::If,
            Token::Then => TokenKind::Then,
            Token::ElseIf => TokenKind::ElseIf,
            Token::Else => TokenKind::Else,
            Token::End => TokenKind::End,
            Token::Case => TokenKind::Case,
            Token::When => TokenKind::When,
            Token::And => TokenKind::And,
            Token::Or => TokenKind::Or,
            Token::Not => TokenKind::Not,
            Token::True => TokenKind::True,
            Token::False => TokenKind::False,
            Token::Null => TokenKind::Null,
            Token::Fixed => TokenKind::Fixed,
            Token::Include => TokenKind::Include,
            Token::Exclude => TokenKind::Exclude,
            Token::Eq => TokenKind::Eq,
            Token::Neq => TokenKind::Neq,
            Token::Lt => TokenKind::Lt,
            Token::Lte => TokenKind::Lte,
            Token::Gt => TokenKind::Gt,
            Token::Gte => TokenKind::Gte,
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::Mod => TokenKind::Mod,
            Token::Exp => TokenKind::Exp,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::LBrace => TokenKind::LBrace,
            Token::RBrace => TokenKind::RBrace,
            Token::Colon => TokenKind::Colon,
            Token::Comma => TokenKind::Comma,
            Token::Ident(_) => TokenKind::Ident,
            Token::Num(_) => TokenKind::Num,
            Token::Str(_) => TokenKind::Str,
            Token::FieldRef(_) => TokenKind::FieldRef,
        }
    }
}

struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
    ctx: ExprContext,
}

/// Parse a formula with no worksheet context.  Returns `Ok(None)` for
/// empty or comment-only input.
pub fn parse_expression(text: &str) -> ExprResult<Option<Expr>> {
    parse_expression_ctx(text, &ExprContext::default())
}

/// Parse a formula, attaching the worksheet-derived ordering/partition
/// context to any window function nodes.
pub fn parse_expression_ctx(text: &str, ctx: &ExprContext) -> ExprResult<Option<Expr>> {
    let mut parser = Parser::new(Lexer::new(text), ctx.clone())?;
    parser.parse_formula()
}

impl<'input> Parser<'input> {
    fn new(lexer: Lexer<'input>, ctx: ExprContext) -> Result<Self, ExprError> {
        let mut tokens = Vec::new();
        for result in lexer {
            match result {
                Ok(tok) => tokens.push(tok),
                Err(e) => return Err(e),
            }
        }
        Ok(Parser {
            tokens,
            pos: 0,
            ctx,
        })
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(tok))
    }

    fn advance(&mut self) -> Option<&Spanned<Token<'input>>> {
        if self.pos < self.tokens.len() {
            let tok = &self.tokens[self.pos];
            self.pos += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Spanned<Token<'input>>, ExprError> {
        if self.peek_kind() == Some(expected) {
            Ok(*self.advance().unwrap())
        } else if let Some((start, _, end)) = self.peek() {
            Err(ExprError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::UnrecognizedToken,
            })
        } else {
            let pos = self.eof_position();
            Err(ExprError {
                start: pos as u16,
                end: (pos + 1) as u16,
                code: ErrorCode::UnrecognizedEof,
            })
        }
    }

    fn eof_position(&self) -> usize {
        if let Some((_, _, end)) = self.tokens.last() {
            *end
        } else {
            0
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn parse_formula(&mut self) -> ExprResult<Option<Expr>> {
        if self.is_at_end() {
            return Ok(None);
        }

        let expr = self.parse_expr()?;

        if let Some((start, _, end)) = self.peek() {
            return Err(ExprError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::ExtraToken,
            });
        }

        Ok(Some(expr))
    }

    fn parse_expr(&mut self) -> ExprResult<Expr> {
        match self.peek_kind() {
            Some(TokenKind::If) => self.parse_if(),
            Some(TokenKind::Case) => self.parse_case(),
            _ => self.parse_or(),
        }
    }

    /// IF cond THEN expr (ELSEIF cond THEN expr)* (ELSE expr)? END
    fn parse_if(&mut self) -> ExprResult<Expr> {
        let (lpos, _, _) = self.expect(TokenKind::If)?;

        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let result = self.parse_expr()?;
        branches.push((cond, result));

        while self.peek_kind() == Some(TokenKind::ElseIf) {
            self.advance();
            let cond = self.parse_expr()?;
            self.expect(TokenKind::Then)?;
            let result = self.parse_expr()?;
            branches.push((cond, result));
        }

        let default = if self.peek_kind() == Some(TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let (_, _, rpos) = self.expect(TokenKind::End)?;
        Ok(Expr::If(branches, default, Loc::new(lpos, rpos)))
    }

    /// CASE subject (WHEN value THEN result)* (ELSE expr)? END
    fn parse_case(&mut self) -> ExprResult<Expr> {
        let (lpos, _, _) = self.expect(TokenKind::Case)?;
        let subject = self.parse_expr()?;

        let mut branches = Vec::new();
        while self.peek_kind() == Some(TokenKind::When) {
            self.advance();
            let value = self.parse_expr()?;
            self.expect(TokenKind::Then)?;
            let result = self.parse_expr()?;
            branches.push((value, result));
        }

        let default = if self.peek_kind() == Some(TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let (_, _, rpos) = self.expect(TokenKind::End)?;
        Ok(Expr::Case(
            Box::new(subject),
            branches,
            default,
            Loc::new(lpos, rpos),
        ))
    }

    fn parse_or(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_and()?;

        while self.peek_kind() == Some(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(BinaryOp::Or, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_not()?;

        while self.peek_kind() == Some(TokenKind::And) {
            self.advance();
            let right = self.parse_not()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(BinaryOp::And, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> ExprResult<Expr> {
        if self.peek_kind() == Some(TokenKind::Not) {
            let (lpos, _, _) = *self.advance().unwrap();
            let operand = self.parse_not()?;
            let loc = Loc::new(lpos, operand.get_loc().end as usize);
            return Ok(Expr::Op1(UnaryOp::Not, Box::new(operand), loc));
        }
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Eq) => BinaryOp::Eq,
                Some(TokenKind::Neq) => BinaryOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    fn parse_comparison(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Lte) => BinaryOp::Lte,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Gte) => BinaryOp::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ExprResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BinaryOp::Mul,
                Some(TokenKind::Div) => BinaryOp::Div,
                Some(TokenKind::Mod) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ExprResult<Expr> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                let (lpos, _, _) = *self.advance().unwrap();
                let operand = self.parse_unary()?;
                let loc = Loc::new(lpos, operand.get_loc().end as usize);
                Ok(Expr::Op1(UnaryOp::Negative, Box::new(operand), loc))
            }
            Some(TokenKind::Plus) => {
                // unary plus is a no-op
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// `^` binds tighter than unary minus on the left and is
    /// right-associative.
    fn parse_power(&mut self) -> ExprResult<Expr> {
        let base = self.parse_primary()?;

        if self.peek_kind() == Some(TokenKind::Exp) {
            self.advance();
            let exponent = self.parse_unary()?;
            let loc = Loc::new(
                base.get_loc().start as usize,
                exponent.get_loc().end as usize,
            );
            return Ok(Expr::Op2(
                BinaryOp::Exp,
                Box::new(base),
                Box::new(exponent),
                loc,
            ));
        }

        Ok(base)
    }

    fn parse_primary(&mut self) -> ExprResult<Expr> {
        let (start, tok, end) = match self.peek() {
            Some(spanned) => *spanned,
            None => {
                let pos = self.eof_position();
                return Err(ExprError {
                    start: pos as u16,
                    end: (pos + 1) as u16,
                    code: ErrorCode::UnrecognizedEof,
                });
            }
        };

        match tok {
            Token::Num(text) => {
                self.advance();
                match text.parse::<f64>() {
                    Ok(n) => Ok(Expr::Const(text.to_string(), n, Loc::new(start, end))),
                    Err(_) => Err(ExprError {
                        start: start as u16,
                        end: end as u16,
                        code: ErrorCode::ExpectedNumber,
                    }),
                }
            }
            Token::Str(text) => {
                self.advance();
                Ok(Expr::Str(text.to_string(), Loc::new(start, end)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true, Loc::new(start, end)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false, Loc::new(start, end)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Null(Loc::new(start, end)))
            }
            Token::FieldRef(name) => {
                self.advance();
                Ok(Expr::Field(
                    canonicalize(strip_shelf_prefix(name)),
                    Loc::new(start, end),
                ))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            Token::LBrace => self.parse_lod(),
            Token::Ident(name) => self.parse_call(name),
            _ => Err(ExprError {
                start: start as u16,
                end: end as u16,
                code: ErrorCode::UnrecognizedToken,
            }),
        }
    }

    /// `{FIXED dims : expr}`, `{INCLUDE dims : expr}`, `{EXCLUDE dims :
    /// expr}` or the table-scoped shorthand `{expr}`.
    fn parse_lod(&mut self) -> ExprResult<Expr> {
        let (lpos, _, _) = self.expect(TokenKind::LBrace)?;

        let kind = match self.peek_kind() {
            Some(TokenKind::Fixed) => {
                self.advance();
                Some(LodKind::Fixed)
            }
            Some(TokenKind::Include) => {
                self.advance();
                Some(LodKind::Include)
            }
            Some(TokenKind::Exclude) => {
                self.advance();
                Some(LodKind::Exclude)
            }
            _ => None,
        };

        let (kind, dims) = match kind {
            None => {
                // `{expr}`: fix to the whole table
                (LodKind::Fixed, Vec::new())
            }
            Some(kind) => {
                let mut dims = Vec::new();
                while self.peek_kind() == Some(TokenKind::FieldRef) {
                    let (_, tok, _) = *self.advance().unwrap();
                    if let Token::FieldRef(name) = tok {
                        dims.push(canonicalize(strip_shelf_prefix(name)));
                    }
                    if self.peek_kind() == Some(TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::Colon)?;
                (kind, dims)
            }
        };

        let inner = self.parse_expr()?;
        let (_, _, rpos) = self.expect(TokenKind::RBrace)?;

        if kind != LodKind::Fixed && dims.is_empty() {
            return Err(ExprError {
                start: lpos as u16,
                end: rpos as u16,
                code: ErrorCode::BadLodSpec,
            });
        }

        Ok(Expr::Lod(kind, dims, Box::new(inner), Loc::new(lpos, rpos)))
    }

    fn parse_call(&mut self, name: &str) -> ExprResult<Expr> {
        let (lpos, _, ident_end) = *self.advance().unwrap();
        let func = name.to_lowercase();

        if self.peek_kind() != Some(TokenKind::LParen) {
            // bare identifiers are not part of the grammar; fields are
            // always bracketed
            return Err(ExprError {
                start: lpos as u16,
                end: ident_end as u16,
                code: ErrorCode::UnrecognizedToken,
            });
        }
        self.advance();

        let mut args = Vec::new();
        if self.peek_kind() != Some(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.peek_kind() == Some(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let (_, _, rpos) = self.expect(TokenKind::RParen)?;
        let loc = Loc::new(lpos, rpos);

        if let Some(agg) = AggFunc::from_name(&func) {
            if args.len() == 1 {
                let arg = args.pop().unwrap();
                return Ok(Expr::Agg(agg, Box::new(arg), loc));
            }
            // two-argument MIN/MAX is the row-level pairwise form, not
            // an aggregation
            if (func == "min" || func == "max") && args.len() == 2 {
                return Ok(Expr::App(func, args, loc));
            }
            return Err(ExprError {
                start: lpos as u16,
                end: rpos as u16,
                code: ErrorCode::BadFunctionArgs,
            });
        }

        if let Some(win) = WindowFunc::from_name(&func) {
            return self.build_window(win, args, loc);
        }

        // three-argument IIF is a conditional; the four-argument form
        // (with an unknown-branch) has no structural counterpart and is
        // left for the translator's closest-match path
        if func == "iif" && args.len() == 3 {
            let else_expr = args.pop().unwrap();
            let then_expr = args.pop().unwrap();
            let cond = args.pop().unwrap();
            return Ok(Expr::If(
                vec![(cond, then_expr)],
                Some(Box::new(else_expr)),
                loc,
            ));
        }

        Ok(Expr::App(func, args, loc))
    }

    fn build_window(
        &mut self,
        func: WindowFunc,
        mut args: Vec<Expr>,
        loc: Loc,
    ) -> ExprResult<Expr> {
        let mut frame = WindowFrame::default();

        match func {
            WindowFunc::WindowSum
            | WindowFunc::WindowAvg
            | WindowFunc::WindowMin
            | WindowFunc::WindowMax => {
                // trailing integer constants are frame offsets
                if args.len() == 3 {
                    let end = const_offset(&args[2]);
                    let start = const_offset(&args[1]);
                    if let (Some(start), Some(end)) = (start, end) {
                        frame = WindowFrame {
                            start: Some(start),
                            end: Some(end),
                        };
                        args.truncate(1);
                    }
                }
            }
            WindowFunc::Lookup => {
                if args.len() == 2
                    && let Some(offset) = const_offset(&args[1])
                {
                    frame.start = Some(offset);
                    args.truncate(1);
                }
            }
            WindowFunc::Rank => {
                // RANK(expr, 'asc'|'desc'); direction defaults to
                // descending and does not change the node shape
                if args.len() == 2 && matches!(args[1], Expr::Str(_, _)) {
                    args.truncate(1);
                }
            }
            _ => {}
        }

        let expr = if args.is_empty() {
            None
        } else if args.len() == 1 {
            Some(Box::new(args.pop().unwrap()))
        } else {
            return Err(ExprError {
                start: loc.start,
                end: loc.end,
                code: ErrorCode::BadFunctionArgs,
            });
        };

        Ok(Expr::Window {
            func,
            expr,
            frame,
            ordering: self.ctx.ordering.clone(),
            partition: self.ctx.partition.clone(),
            loc,
        })
    }
}

/// Shelf references arrive as `derivation:Field:role` triples (e.g.
/// `none:Category:nk`); formulas reference fields directly.  Accept
/// both.
fn strip_shelf_prefix(name: &str) -> &str {
    let parts: Vec<&str> = name.split(':').collect();
    if parts.len() == 3 { parts[1] } else { name }
}

fn const_offset(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Const(_, n, _) if n.fract() == 0.0 => Some(*n as i64),
        Expr::Op1(UnaryOp::Negative, inner, _) => const_offset(inner).map(|n| -n),
        _ => None,
    }
}
