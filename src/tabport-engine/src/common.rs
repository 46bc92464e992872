// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

/// A canonicalized identifier: lowercase, whitespace collapsed to
/// underscores.  Field references in formulas and entity names in the
/// workbook are compared in canonical form.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    XmlDeserialization,
    MalformedDocument,
    DuplicateName,
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    UnclosedComment,
    UnclosedString,
    UnclosedFieldRef,
    ExpectedNumber,
    ExpectedIdent,
    EmptyExpression,
    BadLodSpec,
    BadFunctionArgs,
    CircularDependency,
    UnknownDependency,
    UnresolvedJoinReference,
    UnresolvedFieldProjection,
    SchemaValidation,
    UnsupportedType,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            XmlDeserialization => "xml_deserialization",
            MalformedDocument => "malformed_document",
            DuplicateName => "duplicate_name",
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            UnclosedComment => "unclosed_comment",
            UnclosedString => "unclosed_string",
            UnclosedFieldRef => "unclosed_field_ref",
            ExpectedNumber => "expected_number",
            ExpectedIdent => "expected_ident",
            EmptyExpression => "empty_expression",
            BadLodSpec => "bad_lod_spec",
            BadFunctionArgs => "bad_function_args",
            CircularDependency => "circular_dependency",
            UnknownDependency => "unknown_dependency",
            UnresolvedJoinReference => "unresolved_join_reference",
            UnresolvedFieldProjection => "unresolved_field_projection",
            SchemaValidation => "schema_validation",
            UnsupportedType => "unsupported_type",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

/// An error scoped to a single formula, with byte offsets into the
/// offending expression text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExprError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

impl From<Error> for ExprError {
    fn from(err: Error) -> Self {
        ExprError {
            code: err.code,
            start: 0,
            end: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Import,
    Model,
    Translation,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Import => "ImportError",
            ErrorKind::Model => "ModelError",
            ErrorKind::Translation => "TranslationError",
            ErrorKind::Validation => "ValidationError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;
pub type ExprResult<T> = result::Result<T, ExprError>;

/// A recorded, traceable approximation: every non-exact decision the
/// pipeline makes leaves exactly one of these behind.  The log is the
/// user-facing account of what could not be carried over verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assumption {
    /// The entity the decision was made for (field, join, worksheet).
    pub location: String,
    pub source_text: String,
    pub target_text: String,
    pub reason: String,
}

#[macro_export]
macro_rules! import_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Import,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

/// Lowercase a name and collapse runs of whitespace to single
/// underscores.  Quoted and bracketed forms are expected to have been
/// stripped by the caller -- this operates on the bare name.
pub fn canonicalize(name: &str) -> Ident {
    let name = name.trim();

    let mut result = String::with_capacity(name.len());
    let mut in_ws = false;
    for c in name.chars() {
        if c.is_whitespace() {
            in_ws = true;
            continue;
        }
        if in_ws && !result.is_empty() {
            result.push('_');
        }
        in_ws = false;
        for lc in c.to_lowercase() {
            result.push(lc);
        }
    }

    result
}

/// Deterministic identifier for an emitted entity.  Hashing (kind,
/// scope, name) instead of generating UUIDs keeps repeated runs on
/// identical input byte-identical.
pub fn stable_id(kind: &str, scope: &str, name: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(scope.as_bytes());
    hasher.update([0u8]);
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!("order_date", canonicalize("Order Date"));
        assert_eq!("a_b", canonicalize("   a b"));
        assert_eq!("a_b", canonicalize("a \n b"));
        assert_eq!("sales", canonicalize("Sales"));
        assert_eq!("å_b", canonicalize("Å\nb"));
        assert_eq!("profit_ratio", canonicalize("Profit  Ratio"));
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_id("column", "Orders", "Sales");
        let b = stable_id("column", "Orders", "Sales");
        assert_eq!(a, b);
        assert_eq!(16, a.len());

        // scope participates in the hash
        let c = stable_id("column", "Returns", "Sales");
        assert_ne!(a, c);
        // as does kind
        let d = stable_id("measure", "Orders", "Sales");
        assert_ne!(a, d);
    }

    #[test]
    fn test_error_display() {
        let err = Error::new(
            ErrorKind::Import,
            ErrorCode::MalformedDocument,
            Some("no datasources".to_owned()),
        );
        assert_eq!(
            "ImportError{malformed_document: no datasources}",
            format!("{err}")
        );
    }
}
