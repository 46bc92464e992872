// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::io::BufRead;

pub use tabport_engine::{self as engine, Result};
use tabport_engine::datamodel::WorkbookModel;

pub mod twb;

/// Read a source workbook document and extract the normalized model.
/// The caller owns archive unpacking; the reader must yield the bare
/// XML document with encoding already resolved.
pub fn open_twb(reader: &mut dyn BufRead) -> Result<WorkbookModel> {
    twb::workbook_from_reader(reader)
}
