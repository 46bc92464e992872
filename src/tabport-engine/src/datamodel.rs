// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The normalized workbook model: what the extractor produces and every
//! later stage reads.  Instances are immutable once extraction finishes;
//! derived artifacts (dependency graphs, translations, relationships,
//! visual specs) never write back into this structure.

use crate::common::{Ident, canonicalize};

/// Closed set of column data types.  Source types we don't recognize
/// are carried as `Unsupported` and surfaced as advisory issues, never
/// dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Number,
    Integer,
    String,
    Date,
    DateTime,
    Boolean,
    Unsupported,
}

impl DataType {
    pub fn from_source(datatype: &str) -> DataType {
        match datatype.to_ascii_lowercase().as_str() {
            "real" | "float" | "double" => DataType::Number,
            "integer" | "int" => DataType::Integer,
            "string" | "str" => DataType::String,
            "date" => DataType::Date,
            "datetime" => DataType::DateTime,
            "boolean" | "bool" => DataType::Boolean,
            _ => DataType::Unsupported,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Number | DataType::Integer)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Dimension,
    Measure,
}

/// Default aggregation declared on a column in the source document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Aggregation {
    #[default]
    None,
    Sum,
    Avg,
    Min,
    Max,
    Count,
    CountD,
}

impl Aggregation {
    pub fn from_source(agg: &str) -> Aggregation {
        match agg.to_ascii_lowercase().as_str() {
            "sum" => Aggregation::Sum,
            "avg" | "average" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "count" | "cnt" => Aggregation::Count,
            "countd" => Aggregation::CountD,
            _ => Aggregation::None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub role: Role,
    pub default_aggregation: Aggregation,
    /// Declared key uniqueness; drives cardinality inference when this
    /// column appears in a join clause.
    pub is_unique_key: bool,
}

impl Column {
    pub fn ident(&self) -> Ident {
        canonicalize(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub name: String,
    /// Internal id of the datasource this table came from.
    pub datasource: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn ident(&self) -> Ident {
        canonicalize(&self.name)
    }

    pub fn get_column(&self, ident: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.ident() == ident)
    }
}

/// A named formula owned by a table.  The expression text is carried
/// raw here; parsing happens in a later stage so one bad formula can't
/// take the rest of the model down with it.
#[derive(Clone, Debug, PartialEq)]
pub struct CalculatedField {
    pub name: String,
    /// Display caption, when the source gives the field an internal
    /// name like `Calculation_12345`.
    pub caption: Option<String>,
    pub table: String,
    pub formula: String,
}

impl CalculatedField {
    pub fn ident(&self) -> Ident {
        canonicalize(self.caption.as_deref().unwrap_or(&self.name))
    }

    pub fn display_name(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn from_source(join: &str) -> JoinType {
        match join.to_ascii_lowercase().as_str() {
            "left" => JoinType::Left,
            "right" => JoinType::Right,
            "full" | "fullouter" => JoinType::Full,
            _ => JoinType::Inner,
        }
    }
}

/// One equality clause of the source join graph.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
    /// Source marked this join for bidirectional filtering.
    pub bidirectional_filter: bool,
}

/// Mark classes the source declares on a worksheet pane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkClass {
    Automatic,
    Bar,
    Line,
    Area,
    Pie,
    Square,
    Circle,
    Shape,
    Text,
    Multipolygon,
    Unknown,
}

impl MarkClass {
    pub fn from_source(class: &str) -> MarkClass {
        match class {
            "Automatic" => MarkClass::Automatic,
            "Bar" => MarkClass::Bar,
            "Line" => MarkClass::Line,
            "Area" => MarkClass::Area,
            "Pie" => MarkClass::Pie,
            "Square" => MarkClass::Square,
            "Circle" => MarkClass::Circle,
            "Shape" => MarkClass::Shape,
            "Text" => MarkClass::Text,
            "Multipolygon" => MarkClass::Multipolygon,
            _ => MarkClass::Unknown,
        }
    }
}

/// A field placed on a worksheet shelf, with the derivation the shelf
/// applies (`none`, `sum`, `avg`, `cnt`, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct ShelfField {
    pub field: String,
    pub derivation: Option<String>,
}

impl ShelfField {
    pub fn ident(&self) -> Ident {
        canonicalize(&self.field)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorksheetFilter {
    pub field: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Worksheet {
    pub name: String,
    pub rows_shelf: Vec<ShelfField>,
    pub cols_shelf: Vec<ShelfField>,
    pub mark: MarkClass,
    pub filters: Vec<WorksheetFilter>,
}

impl Worksheet {
    pub fn ident(&self) -> Ident {
        canonicalize(&self.name)
    }

    pub fn shelf_fields(&self) -> impl Iterator<Item = &ShelfField> {
        self.rows_shelf.iter().chain(self.cols_shelf.iter())
    }
}

/// Position rectangle in dashboard coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        let vals = [self.x, self.y, self.width, self.height];
        vals.iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneKind {
    Worksheet,
    QuickFilter,
    Layout,
}

/// A dashboard zone: either a placed worksheet, a quick filter, or a
/// layout container we only keep for its geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub kind: ZoneKind,
    pub worksheet: Option<String>,
    /// For quick-filter zones, the field being filtered.
    pub field: Option<String>,
    pub rect: Rect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dashboard {
    pub name: String,
    /// Declared size of the dashboard canvas (width, height).
    pub size: (f64, f64),
    pub zones: Vec<Zone>,
}

impl Dashboard {
    pub fn ident(&self) -> Ident {
        canonicalize(&self.name)
    }
}

/// A cross-worksheet filter action declared in the source document.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterAction {
    pub name: String,
    pub source_worksheet: String,
    pub target_worksheets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub data_type: DataType,
    pub current_value: Option<String>,
}

impl Parameter {
    pub fn ident(&self) -> Ident {
        canonicalize(&self.name)
    }
}

/// Root of the pipeline: everything extracted from one source
/// workbook.  Calculated fields keep their declaration order; the
/// dependency resolver uses it as the deterministic tie-break.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct WorkbookModel {
    pub name: String,
    pub tables: Vec<Table>,
    pub calculated_fields: Vec<CalculatedField>,
    pub joins: Vec<Join>,
    pub worksheets: Vec<Worksheet>,
    pub dashboards: Vec<Dashboard>,
    pub actions: Vec<FilterAction>,
    pub parameters: Vec<Parameter>,
}

impl WorkbookModel {
    pub fn get_table(&self, ident: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.ident() == ident)
    }

    pub fn get_worksheet(&self, ident: &str) -> Option<&Worksheet> {
        self.worksheets.iter().find(|w| w.ident() == ident)
    }

    pub fn get_field(&self, ident: &str) -> Option<&CalculatedField> {
        self.calculated_fields.iter().find(|f| f.ident() == ident)
    }

    pub fn get_parameter(&self, ident: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.ident() == ident)
    }

    /// The table owning a plain column, searched by canonical column
    /// ident.  Column names are not guaranteed unique across tables;
    /// first declaration wins, matching shelf-reference resolution in
    /// the source tool.
    pub fn table_of_column(&self, column: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.columns.iter().any(|c| c.ident() == column))
    }
}
