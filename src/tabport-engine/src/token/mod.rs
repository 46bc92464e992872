// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Tokenizer for the source calculation language.

use std::str::CharIndices;

use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{ErrorCode, ExprError};

#[cfg(test)]
mod test;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Token<'input> {
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
    Ident(&'input str),
    Num(&'input str),
    /// String literal contents, quotes stripped.
    Str(&'input str),
    /// `[Field Name]` contents, brackets stripped.
    FieldRef(&'input str),
}

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, ExprError> {
    Err(ExprError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

pub type Spanned<T> = (usize, T, usize);

const KEYWORDS: &[(&str, Token<'static>)] = &[
    ("if", If),
    ("then", Then),
    ("elseif", ElseIf),
    ("else", Else),
    ("end", End),
    ("case", Case),
    ("when", When),
    ("and", And),
    ("or", Or),
    ("not", Not),
    ("true", True),
    ("false", False),
    ("null", Null),
    ("fixed", Fixed),
    ("include", Include),
    ("exclude", Exclude),
];

fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c)
}

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.lookahead = self.chars.next();
        self.lookahead
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        self.take_until(|c| !keep_going(c))
    }

    fn identifierish(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let end = match self.take_while(is_identifier_continue) {
            Some(end) => end,
            None => self.text.len(),
        };
        let word = &self.text[idx0..end];
        let lower_word = word.to_lowercase();

        let tok = KEYWORDS
            .iter()
            .filter(|&&(w, _)| w == lower_word)
            .map(|(_, t)| *t)
            .next()
            .unwrap_or(Ident(word));

        (idx0, tok, end)
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let mut end = match self.take_while(|c| c.is_ascii_digit()) {
            Some(end) => end,
            None => self.text.len(),
        };

        if let Some((_, '.')) = self.lookahead {
            self.bump();
            end = match self.take_while(|c| c.is_ascii_digit()) {
                Some(end) => end,
                None => self.text.len(),
            };
        }

        if let Some((exp_idx, c)) = self.lookahead
            && (c == 'e' || c == 'E')
        {
            // only consume the exponent if digits (or a sign) follow;
            // otherwise 'e' starts an identifier like `2end`
            let rest = &self.text[exp_idx + 1..];
            let mut chars = rest.chars();
            let next = chars.next();
            let consumes = match next {
                Some(c2) if c2.is_ascii_digit() => true,
                Some('+') | Some('-') => chars.next().is_some_and(|c3| c3.is_ascii_digit()),
                _ => false,
            };
            if consumes {
                self.bump(); // the 'e'
                if let Some((_, c2)) = self.lookahead
                    && (c2 == '+' || c2 == '-')
                {
                    self.bump();
                }
                end = match self.take_while(|c| c.is_ascii_digit()) {
                    Some(end) => end,
                    None => self.text.len(),
                };
            }
        }

        (idx0, Num(&self.text[idx0..end]), end)
    }

    fn field_ref(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, ExprError> {
        // eat the opening '['
        self.bump();

        match self.take_until(|c| c == ']') {
            Some(idx1) => {
                // eat the trailing ']'
                self.bump();
                Ok((idx0, FieldRef(&self.text[idx0 + 1..idx1]), idx1 + 1))
            }
            None => error(UnclosedFieldRef, idx0, self.text.len()),
        }
    }

    fn string(&mut self, idx0: usize, quote: char) -> Result<Spanned<Token<'input>>, ExprError> {
        // eat the opening quote
        self.bump();

        match self.take_until(|c| c == quote) {
            Some(idx1) => {
                // eat the trailing quote
                self.bump();
                Ok((idx0, Str(&self.text[idx0 + 1..idx1]), idx1 + 1))
            }
            None => error(UnclosedString, idx0, self.text.len()),
        }
    }

    fn line_comment_end(&mut self) {
        self.take_until(|c| c == '\n');
    }

    fn block_comment_end(&mut self, idx0: usize) -> Result<(), ExprError> {
        // positioned on the '*' after '/'
        self.bump();
        loop {
            match self.take_until(|c| c == '*') {
                Some(_) => {
                    if let Some((_, '/')) = self.bump() {
                        self.bump(); // consume the '/'
                        return Ok(());
                    }
                }
                None => {
                    return error(UnclosedComment, idx0, self.text.len());
                }
            }
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, ExprError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, ExprError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '/')) => match self.bump() {
                    Some((_, '/')) => {
                        self.line_comment_end();
                        continue;
                    }
                    Some((_, '*')) => match self.block_comment_end(i) {
                        Ok(()) => continue,
                        Err(err) => Some(Err(err)),
                    },
                    // we've already bumped, don't consume
                    _ => Some(Ok((i, Div, i + 1))),
                },
                Some((i, '=')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Eq, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Eq, i + 1))),
                    }
                }
                Some((i, '!')) => match self.bump() {
                    Some((_, '=')) => self.consume(i, Neq, 2),
                    _ => Some(error(UnrecognizedToken, i, i + 1)),
                },
                Some((i, '<')) => {
                    match self.bump() {
                        Some((_, '>')) => self.consume(i, Neq, 2),
                        Some((_, '=')) => self.consume(i, Lte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Lt, i + 1))),
                    }
                }
                Some((i, '>')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Gte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Gt, i + 1))),
                    }
                }
                Some((i, '+')) => self.consume(i, Plus, 1),
                Some((i, '-')) => self.consume(i, Minus, 1),
                Some((i, '*')) => self.consume(i, Mul, 1),
                Some((i, '%')) => self.consume(i, Mod, 1),
                Some((i, '^')) => self.consume(i, Exp, 1),
                Some((i, '(')) => self.consume(i, LParen, 1),
                Some((i, ')')) => self.consume(i, RParen, 1),
                Some((i, '{')) => self.consume(i, LBrace, 1),
                Some((i, '}')) => self.consume(i, RBrace, 1),
                Some((i, ':')) => self.consume(i, Colon, 1),
                Some((i, ',')) => self.consume(i, Comma, 1),
                Some((i, '[')) => Some(self.field_ref(i)),
                Some((i, c)) if c == '\'' || c == '"' => Some(self.string(i, c)),
                Some((i, c)) if c.is_ascii_digit() || c == '.' => Some(Ok(self.number(i))),
                Some((i, c)) if is_identifier_start(c) => Some(Ok(self.identifierish(i))),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, _)) => Some(error(UnrecognizedToken, i, i + 1)),
                None => None,
            };
        }
    }
}
