// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod ast;
pub mod common;
pub mod datamodel;
pub mod dax;
pub mod depgraph;
pub mod emit;
pub mod field;
pub mod parser;
pub mod project;
pub mod relationship;
pub mod report;
mod token;
pub mod translate;
pub mod validate;

pub use self::common::{
    Assumption, Error, ErrorCode, Ident, Result, canonicalize, stable_id,
};
pub use self::datamodel::WorkbookModel;
pub use self::emit::{Document, EmittedArtifactSet};
pub use self::project::{Conversion, ConvertOptions, EntityIssue, convert};
