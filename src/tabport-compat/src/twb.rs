// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Serde bindings for the source workbook XML and the extraction pass
//! that turns a parsed document into the engine's normalized model.
//!
//! Extraction never mutates its input and fails fast only on
//! structural problems: a missing container is `MalformedDocument`,
//! colliding names within one scope are `DuplicateName`.  Everything
//! else (unknown data types, unparseable formulas) is carried through
//! and handled downstream.

use std::collections::{BTreeSet, HashMap};
use std::io::BufRead;

use serde::Deserialize;

use tabport_engine::common::{Ident, Result, canonicalize};
use tabport_engine::datamodel::{
    Aggregation, CalculatedField, Column, Dashboard, DataType, FilterAction, Join, JoinType,
    MarkClass, Parameter, Rect, Role, ShelfField, Table, WorkbookModel, Worksheet,
    WorksheetFilter, Zone, ZoneKind,
};
use tabport_engine::import_err;

/// The reserved datasource holding workbook parameters rather than
/// data.
const PARAMETERS_DATASOURCE: &str = "Parameters";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename = "workbook")]
pub struct Workbook {
    #[serde(rename = "@version", default)]
    pub version: String,
    pub datasources: Option<Datasources>,
    pub worksheets: Option<Worksheets>,
    pub dashboards: Option<Dashboards>,
    pub actions: Option<Actions>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Datasources {
    #[serde(rename = "datasource", default)]
    pub datasources: Vec<Datasource>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Datasource {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@caption")]
    pub caption: Option<String>,
    pub connection: Option<Connection>,
    #[serde(rename = "column", default)]
    pub columns: Vec<XmlColumn>,
}

impl Datasource {
    /// Captions override internal names everywhere a table or field is
    /// displayed.
    pub fn display_name(&self) -> &str {
        self.caption.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Connection {
    #[serde(rename = "@class", default)]
    pub class: String,
    pub relation: Option<Relation>,
    pub cols: Option<ColumnMappings>,
}

/// The physical relation tree: `table` leaves joined by `join` nodes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Relation {
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@join")]
    pub join: Option<String>,
    #[serde(rename = "@filter-direction")]
    pub filter_direction: Option<String>,
    #[serde(rename = "clause", default)]
    pub clauses: Vec<Clause>,
    #[serde(rename = "relation", default)]
    pub relations: Vec<Relation>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Clause {
    #[serde(rename = "@type", default)]
    pub kind: String,
    #[serde(rename = "expression", default)]
    pub expressions: Vec<Expression>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Expression {
    #[serde(rename = "@op", default)]
    pub op: String,
    #[serde(rename = "expression", default)]
    pub expressions: Vec<Expression>,
}

/// Local-to-remote column correspondences of a federated connection,
/// e.g. `key='[Sales]' value='[Orders].[Sales]'`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ColumnMappings {
    #[serde(rename = "map", default)]
    pub maps: Vec<ColumnMap>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ColumnMap {
    #[serde(rename = "@key", default)]
    pub key: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct XmlColumn {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@caption")]
    pub caption: Option<String>,
    #[serde(rename = "@datatype", default)]
    pub datatype: String,
    #[serde(rename = "@role")]
    pub role: Option<String>,
    #[serde(rename = "@aggregation")]
    pub aggregation: Option<String>,
    #[serde(rename = "@unique")]
    pub unique: Option<bool>,
    /// Current value, for parameter columns.
    #[serde(rename = "@value")]
    pub value: Option<String>,
    pub calculation: Option<Calculation>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Calculation {
    #[serde(rename = "@class", default)]
    pub class: String,
    #[serde(rename = "@formula")]
    pub formula: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Worksheets {
    #[serde(rename = "worksheet", default)]
    pub worksheets: Vec<XmlWorksheet>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct XmlWorksheet {
    #[serde(rename = "@name", default)]
    pub name: String,
    pub table: Option<WorksheetTable>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WorksheetTable {
    pub view: Option<View>,
    pub panes: Option<Panes>,
    pub rows: Option<String>,
    pub cols: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct View {
    #[serde(rename = "datasource-dependencies", default)]
    pub dependencies: Vec<DatasourceDependencies>,
    #[serde(rename = "filter", default)]
    pub filters: Vec<Filter>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DatasourceDependencies {
    #[serde(rename = "@datasource", default)]
    pub datasource: String,
    #[serde(rename = "column", default)]
    pub columns: Vec<XmlColumn>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Filter {
    #[serde(rename = "@column", default)]
    pub column: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Panes {
    #[serde(rename = "pane", default)]
    pub panes: Vec<Pane>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Pane {
    pub mark: Option<Mark>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Mark {
    #[serde(rename = "@class", default)]
    pub class: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Dashboards {
    #[serde(rename = "dashboard", default)]
    pub dashboards: Vec<XmlDashboard>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct XmlDashboard {
    #[serde(rename = "@name", default)]
    pub name: String,
    pub size: Option<Size>,
    pub zones: Option<Zones>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Size {
    #[serde(rename = "@maxwidth")]
    pub maxwidth: Option<f64>,
    #[serde(rename = "@maxheight")]
    pub maxheight: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Zones {
    #[serde(rename = "zone", default)]
    pub zones: Vec<XmlZone>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct XmlZone {
    #[serde(rename = "@type-v2")]
    pub kind: Option<String>,
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@worksheet")]
    pub worksheet: Option<String>,
    #[serde(rename = "@param")]
    pub param: Option<String>,
    #[serde(rename = "@x", default)]
    pub x: f64,
    #[serde(rename = "@y", default)]
    pub y: f64,
    #[serde(rename = "@w", default)]
    pub w: f64,
    #[serde(rename = "@h", default)]
    pub h: f64,
    #[serde(rename = "zone", default)]
    pub zones: Vec<XmlZone>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Actions {
    #[serde(rename = "action", default)]
    pub actions: Vec<XmlAction>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct XmlAction {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@caption")]
    pub caption: Option<String>,
    pub source: Option<ActionSource>,
    pub command: Option<ActionCommand>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ActionSource {
    #[serde(rename = "@worksheet")]
    pub worksheet: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ActionCommand {
    #[serde(rename = "@command", default)]
    pub command: String,
    #[serde(rename = "param", default)]
    pub params: Vec<ActionParam>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ActionParam {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@value", default)]
    pub value: String,
}

pub fn workbook_from_reader(reader: &mut dyn BufRead) -> Result<WorkbookModel> {
    use quick_xml::de;
    let workbook: Workbook = match de::from_reader(reader) {
        Ok(workbook) => workbook,
        Err(err) => {
            return import_err!(XmlDeserialization, err.to_string());
        }
    };

    extract(&workbook)
}

/// A calculated field as declared in the document, before reference
/// normalization.
struct RawCalc {
    name: String,
    caption: Option<String>,
    table: String,
    formula: String,
}

impl RawCalc {
    fn ident(&self) -> Ident {
        canonicalize(self.caption.as_deref().unwrap_or(&self.name))
    }
}

/// Build the normalized model from a deserialized workbook document.
pub fn extract(workbook: &Workbook) -> Result<WorkbookModel> {
    let Some(datasources) = workbook.datasources.as_ref() else {
        return import_err!(
            MalformedDocument,
            "workbook has no datasources container".to_string()
        );
    };
    if datasources.datasources.is_empty() {
        return import_err!(
            MalformedDocument,
            "workbook declares no datasources".to_string()
        );
    }
    let Some(worksheets) = workbook.worksheets.as_ref() else {
        return import_err!(
            MalformedDocument,
            "workbook has no worksheets container".to_string()
        );
    };
    let Some(dashboards) = workbook.dashboards.as_ref() else {
        return import_err!(
            MalformedDocument,
            "workbook has no dashboards container".to_string()
        );
    };

    let mut model = WorkbookModel::default();
    let mut raw_calcs: Vec<RawCalc> = Vec::new();
    // internal reference -> display name, applied to formulas, shelves
    // and filter targets
    let mut aliases: HashMap<Ident, String> = HashMap::new();
    // datasource internal name -> its first table's display name
    let mut primary_table: HashMap<String, String> = HashMap::new();

    for ds in &datasources.datasources {
        if ds.name == PARAMETERS_DATASOURCE {
            extract_parameters(ds, &mut model)?;
            continue;
        }
        if model.name.is_empty() {
            model.name = ds.display_name().to_string();
        }
        extract_datasource(ds, &mut model, &mut raw_calcs, &mut aliases, &mut primary_table)?;
    }

    // calculations can also be declared (or re-declared) in a
    // worksheet's dependency list
    for ws in &worksheets.worksheets {
        let Some(table) = ws.table.as_ref() else {
            return import_err!(
                MalformedDocument,
                format!("worksheet '{}' has no table node", ws.name)
            );
        };
        let Some(view) = table.view.as_ref() else {
            continue;
        };
        for dep in &view.dependencies {
            let Some(owner) = primary_table.get(&dep.datasource) else {
                continue;
            };
            for col in &dep.columns {
                let Some(formula) = col.calculation.as_ref().and_then(|c| c.formula.as_ref())
                else {
                    continue;
                };
                push_calc(
                    &mut raw_calcs,
                    RawCalc {
                        name: strip_brackets(&col.name).to_string(),
                        caption: col.caption.clone(),
                        table: owner.clone(),
                        formula: formula.clone(),
                    },
                )?;
            }
        }
    }

    for calc in &raw_calcs {
        if let Some(caption) = &calc.caption {
            let internal = canonicalize(&calc.name);
            if internal != canonicalize(caption) {
                aliases.insert(internal, caption.clone());
            }
        }
    }

    for calc in raw_calcs {
        model.calculated_fields.push(CalculatedField {
            formula: rewrite_formula(&calc.formula, &aliases),
            name: calc.name,
            caption: calc.caption,
            table: calc.table,
        });
    }

    let mut seen_worksheets: BTreeSet<Ident> = BTreeSet::new();
    for ws in &worksheets.worksheets {
        if !seen_worksheets.insert(canonicalize(&ws.name)) {
            return import_err!(DuplicateName, format!("worksheet '{}'", ws.name));
        }
        let Some(table) = ws.table.as_ref() else {
            continue;
        };
        let rows_shelf = table
            .rows
            .as_deref()
            .map(|t| parse_shelf(t, &aliases))
            .unwrap_or_default();
        let cols_shelf = table
            .cols
            .as_deref()
            .map(|t| parse_shelf(t, &aliases))
            .unwrap_or_default();
        let mark = table
            .panes
            .as_ref()
            .and_then(|p| p.panes.first())
            .and_then(|p| p.mark.as_ref())
            .map(|m| MarkClass::from_source(&m.class))
            .unwrap_or(MarkClass::Automatic);
        let filters = table
            .view
            .as_ref()
            .map(|v| {
                v.filters
                    .iter()
                    .filter_map(|f| parse_field_ref(&f.column, &aliases))
                    .map(|field| WorksheetFilter { field })
                    .collect()
            })
            .unwrap_or_default();
        model.worksheets.push(Worksheet {
            name: ws.name.clone(),
            rows_shelf,
            cols_shelf,
            mark,
            filters,
        });
    }

    let worksheet_names: HashMap<Ident, String> = model
        .worksheets
        .iter()
        .map(|w| (w.ident(), w.name.clone()))
        .collect();

    let mut seen_dashboards: BTreeSet<Ident> = BTreeSet::new();
    for dashboard in &dashboards.dashboards {
        if !seen_dashboards.insert(canonicalize(&dashboard.name)) {
            return import_err!(DuplicateName, format!("dashboard '{}'", dashboard.name));
        }
        let declared = dashboard
            .size
            .as_ref()
            .map(|s| (s.maxwidth.unwrap_or(0.0), s.maxheight.unwrap_or(0.0)))
            .unwrap_or((0.0, 0.0));
        let size = if declared.0 > 0.0 && declared.1 > 0.0 {
            declared
        } else {
            dashboard
                .zones
                .as_ref()
                .and_then(|z| root_layout_size(&z.zones))
                .unwrap_or((0.0, 0.0))
        };
        let mut zones = Vec::new();
        if let Some(z) = dashboard.zones.as_ref() {
            for zone in &z.zones {
                flatten_zone(zone, &worksheet_names, &aliases, &mut zones);
            }
        }
        model.dashboards.push(Dashboard {
            name: dashboard.name.clone(),
            size,
            zones,
        });
    }

    if let Some(actions) = workbook.actions.as_ref() {
        for action in &actions.actions {
            let Some(command) = action.command.as_ref() else {
                continue;
            };
            if command.command != "tsc:filter" {
                continue;
            }
            let Some(source) = action.source.as_ref().and_then(|s| s.worksheet.clone()) else {
                continue;
            };
            let targets: Vec<String> = command
                .params
                .iter()
                .filter(|p| p.name == "target")
                .map(|p| p.value.clone())
                .collect();
            if targets.is_empty() {
                continue;
            }
            model.actions.push(FilterAction {
                name: action
                    .caption
                    .clone()
                    .unwrap_or_else(|| strip_brackets(&action.name).to_string()),
                source_worksheet: source,
                target_worksheets: targets,
            });
        }
    }

    Ok(model)
}

fn extract_datasource(
    ds: &Datasource,
    model: &mut WorkbookModel,
    raw_calcs: &mut Vec<RawCalc>,
    aliases: &mut HashMap<Ident, String>,
    primary_table: &mut HashMap<String, String>,
) -> Result<()> {
    // physical tables come from the connection's relation tree; a
    // datasource without one is a single logical table named by its
    // caption
    let mut table_names: Vec<String> = Vec::new();
    let relation = ds.connection.as_ref().and_then(|c| c.relation.as_ref());
    if let Some(relation) = relation {
        collect_tables(relation, &mut table_names);
    }
    if table_names.is_empty() {
        table_names.push(ds.display_name().to_string());
    }
    primary_table.insert(ds.name.clone(), table_names[0].clone());

    let mut tables: Vec<Table> = Vec::new();
    for name in &table_names {
        let ident = canonicalize(name);
        if model.get_table(&ident).is_some() || tables.iter().any(|t| t.ident() == ident) {
            return import_err!(DuplicateName, format!("table '{name}'"));
        }
        tables.push(Table {
            name: name.clone(),
            datasource: ds.name.clone(),
            columns: Vec::new(),
        });
    }

    // local column name -> (owning table, remote column name)
    let mut mapping: HashMap<Ident, (String, String)> = HashMap::new();
    if let Some(cols) = ds.connection.as_ref().and_then(|c| c.cols.as_ref()) {
        for map in &cols.maps {
            if let Some((table, column)) = parse_endpoint(&map.value) {
                mapping.insert(canonicalize(strip_brackets(&map.key)), (table, column));
            }
        }
    }
    // a mapping onto a table the relation tree doesn't declare falls
    // back to the primary table
    let owner_index = |local: &str| -> usize {
        mapping
            .get(&canonicalize(local))
            .and_then(|(t, _)| {
                let ident = canonicalize(t);
                table_names.iter().position(|n| canonicalize(n) == ident)
            })
            .unwrap_or(0)
    };

    for col in &ds.columns {
        let local = strip_brackets(&col.name).to_string();
        if let Some(calc) = col.calculation.as_ref() {
            if let Some(formula) = calc.formula.as_ref() {
                let owner = table_names[owner_index(&local)].clone();
                push_calc(
                    raw_calcs,
                    RawCalc {
                        name: local,
                        caption: col.caption.clone(),
                        table: owner,
                        formula: formula.clone(),
                    },
                )?;
            }
            continue;
        }

        let remote = mapping
            .get(&canonicalize(&local))
            .map(|(_, c)| c.clone())
            .unwrap_or_else(|| local.clone());
        if canonicalize(&remote) != canonicalize(&local) {
            aliases.insert(canonicalize(&local), remote.clone());
        }

        let data_type = DataType::from_source(&col.datatype);
        let role = match col.role.as_deref() {
            Some("measure") => Role::Measure,
            Some("dimension") => Role::Dimension,
            _ if data_type.is_numeric() => Role::Measure,
            _ => Role::Dimension,
        };
        let table = &mut tables[owner_index(&local)];
        if table.columns.iter().any(|c| c.ident() == canonicalize(&remote)) {
            return import_err!(
                DuplicateName,
                format!("column '{}' on table '{}'", remote, table.name)
            );
        }
        table.columns.push(Column {
            name: remote,
            data_type,
            role,
            default_aggregation: col
                .aggregation
                .as_deref()
                .map(Aggregation::from_source)
                .unwrap_or_default(),
            is_unique_key: col.unique.unwrap_or(false),
        });
    }

    if let Some(relation) = relation {
        collect_joins(relation, &mut model.joins);
    }
    model.tables.extend(tables);
    Ok(())
}

fn extract_parameters(ds: &Datasource, model: &mut WorkbookModel) -> Result<()> {
    for col in &ds.columns {
        let name = col
            .caption
            .clone()
            .unwrap_or_else(|| strip_brackets(&col.name).to_string());
        if model.get_parameter(&canonicalize(&name)).is_some() {
            return import_err!(DuplicateName, format!("parameter '{name}'"));
        }
        model.parameters.push(Parameter {
            name,
            data_type: DataType::from_source(&col.datatype),
            current_value: col.value.clone(),
        });
    }
    Ok(())
}

fn push_calc(calcs: &mut Vec<RawCalc>, calc: RawCalc) -> Result<()> {
    let ident = calc.ident();
    if let Some(existing) = calcs.iter().find(|c| c.ident() == ident) {
        // worksheets re-declare the datasource's calculations in their
        // dependency lists; identical re-declarations are not
        // collisions
        if existing.formula == calc.formula {
            return Ok(());
        }
        return import_err!(
            DuplicateName,
            format!(
                "calculated field '{}'",
                calc.caption.as_deref().unwrap_or(&calc.name)
            )
        );
    }
    calcs.push(calc);
    Ok(())
}

fn collect_tables(relation: &Relation, out: &mut Vec<String>) {
    if relation.kind == "table"
        && let Some(name) = relation.name.as_ref()
    {
        out.push(name.clone());
    }
    for child in &relation.relations {
        collect_tables(child, out);
    }
}

fn collect_joins(relation: &Relation, out: &mut Vec<Join>) {
    if relation.kind == "join" {
        let join_type = JoinType::from_source(relation.join.as_deref().unwrap_or("inner"));
        let bidirectional = relation.filter_direction.as_deref() == Some("both");
        for clause in relation.clauses.iter().filter(|c| c.kind == "join") {
            for expr in &clause.expressions {
                if expr.op != "=" || expr.expressions.len() != 2 {
                    continue;
                }
                let left = parse_endpoint(&expr.expressions[0].op);
                let right = parse_endpoint(&expr.expressions[1].op);
                if let (Some((lt, lc)), Some((rt, rc))) = (left, right) {
                    out.push(Join {
                        join_type,
                        left_table: lt,
                        left_column: lc,
                        right_table: rt,
                        right_column: rc,
                        bidirectional_filter: bidirectional,
                    });
                }
            }
        }
    }
    for child in &relation.relations {
        collect_joins(child, out);
    }
}

fn flatten_zone(
    zone: &XmlZone,
    worksheets: &HashMap<Ident, String>,
    aliases: &HashMap<Ident, String>,
    out: &mut Vec<Zone>,
) {
    let rect = Rect::new(zone.x, zone.y, zone.w, zone.h);
    if zone.kind.as_deref() == Some("filter") {
        if let Some(field) = zone
            .param
            .as_deref()
            .and_then(|p| parse_field_ref(p, aliases))
        {
            out.push(Zone {
                kind: ZoneKind::QuickFilter,
                worksheet: None,
                field: Some(field),
                rect,
            });
        }
    } else {
        let named = zone
            .worksheet
            .as_deref()
            .or(zone.name.as_deref())
            .and_then(|w| worksheets.get(&canonicalize(w)));
        match named {
            Some(worksheet) => out.push(Zone {
                kind: ZoneKind::Worksheet,
                worksheet: Some(worksheet.clone()),
                field: None,
                rect,
            }),
            None => out.push(Zone {
                kind: ZoneKind::Layout,
                worksheet: None,
                field: None,
                rect,
            }),
        }
    }
    for child in &zone.zones {
        flatten_zone(child, worksheets, aliases, out);
    }
}

/// The canvas size of a dashboard without a declared `size`: the
/// largest root layout container.
fn root_layout_size(zones: &[XmlZone]) -> Option<(f64, f64)> {
    let mut best: Option<(f64, f64)> = None;
    for zone in zones {
        if zone.kind.as_deref() == Some("layout-basic")
            && zone.x == 0.0
            && zone.y == 0.0
            && best.map(|(w, h)| zone.w * zone.h > w * h).unwrap_or(true)
        {
            best = Some((zone.w, zone.h));
        }
        if let Some(nested) = root_layout_size(&zone.zones)
            && best.map(|(w, h)| nested.0 * nested.1 > w * h).unwrap_or(true)
        {
            best = Some(nested);
        }
    }
    best
}

fn strip_brackets(name: &str) -> &str {
    name.trim_start_matches('[').trim_end_matches(']')
}

fn bracket_groups(text: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('[') {
        let Some(len) = rest[start + 1..].find(']') else {
            break;
        };
        groups.push(&rest[start + 1..start + 1 + len]);
        rest = &rest[start + 1 + len + 1..];
    }
    groups
}

/// `[Orders].[Order ID]` -> ("Orders", "Order ID").
fn parse_endpoint(op: &str) -> Option<(String, String)> {
    let groups = bracket_groups(op);
    if groups.len() == 2 {
        Some((groups[0].to_string(), groups[1].to_string()))
    } else {
        None
    }
}

fn resolve_alias(field: &str, aliases: &HashMap<Ident, String>) -> String {
    aliases
        .get(&canonicalize(field))
        .cloned()
        .unwrap_or_else(|| field.to_string())
}

/// Shelf text carries references like
/// `[federated.0aqz].[none:Category:nk]`: the middle segment of the
/// triple is the field, the first the shelf derivation.
fn parse_shelf(text: &str, aliases: &HashMap<Ident, String>) -> Vec<ShelfField> {
    let mut out = Vec::new();
    for group in bracket_groups(text) {
        let parts: Vec<&str> = group.split(':').collect();
        if parts.len() < 3 {
            continue;
        }
        let field = parts[1];
        if field == "Measure Names" || field == "Multiple Values" {
            continue;
        }
        out.push(ShelfField {
            field: resolve_alias(field, aliases),
            derivation: if parts[0].is_empty() {
                None
            } else {
                Some(parts[0].to_string())
            },
        });
    }
    out
}

/// The field a filter or quick-filter zone targets: the last bracket
/// group of its column reference, with any derivation wrapper
/// stripped.
fn parse_field_ref(text: &str, aliases: &HashMap<Ident, String>) -> Option<String> {
    let groups = bracket_groups(text);
    let group = groups.last()?;
    let parts: Vec<&str> = group.split(':').collect();
    let field = if parts.len() >= 2 { parts[1] } else { parts[0] };
    if field.is_empty() || field == "Measure Names" || field == "Multiple Values" {
        return None;
    }
    Some(resolve_alias(field, aliases))
}

/// Normalize field references in a formula: qualified references drop
/// their datasource qualifier, and internal calculation names are
/// replaced with their captions, so references line up with the names
/// the model carries.  String literals are left untouched.
fn rewrite_formula(formula: &str, aliases: &HashMap<Ident, String>) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut rest = formula;
    let mut quote: Option<char> = None;
    while let Some(c) = rest.chars().next() {
        let c_len = c.len_utf8();
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
                rest = &rest[c_len..];
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
                rest = &rest[c_len..];
            }
            None if c == '[' => {
                let Some(len) = rest[1..].find(']') else {
                    out.push(c);
                    rest = &rest[c_len..];
                    continue;
                };
                let name = &rest[1..1 + len];
                let after = &rest[1 + len + 1..];
                if after.starts_with(".[") {
                    // `[Qualifier].[Field]`: drop the qualifier
                    rest = &after[1..];
                    continue;
                }
                out.push('[');
                out.push_str(&resolve_alias(name, aliases));
                out.push(']');
                rest = after;
            }
            None => {
                out.push(c);
                rest = &rest[c_len..];
            }
        }
    }
    out
}
