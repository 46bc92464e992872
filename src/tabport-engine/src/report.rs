// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Maps worksheets to visual specifications and dashboards to report
//! pages, then renders the report document set.
//!
//! Field projections may only reference columns and measures that the
//! model emitter actually produced; a projection that doesn't resolve
//! is dropped on its own (the visual survives) and reported.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;

use crate::common::{Assumption, Error, ErrorCode, ErrorKind, Ident, canonicalize, stable_id};
use crate::datamodel::{
    DataType, MarkClass, Rect, ShelfField, WorkbookModel, Worksheet, ZoneKind,
};
use crate::emit::{Document, SemanticModel};
use crate::translate::{FieldKind, TranslatedExpression};

/// Which structural version of the target document set to emit; the
/// descriptor comes from the (external) templating collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetSchema {
    pub pbir_version: String,
    pub report_schema_version: String,
    pub pages_schema_version: String,
    pub page_schema_version: String,
    pub visual_schema_version: String,
    pub version_schema_version: String,
}

impl Default for TargetSchema {
    fn default() -> Self {
        TargetSchema {
            pbir_version: "4.0".to_string(),
            report_schema_version: "3.1.0".to_string(),
            pages_schema_version: "1.0.0".to_string(),
            page_schema_version: "2.0.0".to_string(),
            visual_schema_version: "2.5.0".to_string(),
            version_schema_version: "1.0.0".to_string(),
        }
    }
}

impl TargetSchema {
    fn schema_url(&self, kind: &str, version: &str) -> String {
        format!(
            "https://developer.microsoft.com/json-schemas/fabric/item/report/definition/{kind}/{version}/schema.json"
        )
    }
}

/// Closed set of visual types the mapper can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisualType {
    ColumnChart,
    LineChart,
    AreaChart,
    PieChart,
    ScatterChart,
    Map,
    TableEx,
    Slicer,
}

impl VisualType {
    pub fn name(&self) -> &'static str {
        match self {
            VisualType::ColumnChart => "columnChart",
            VisualType::LineChart => "lineChart",
            VisualType::AreaChart => "areaChart",
            VisualType::PieChart => "pieChart",
            VisualType::ScatterChart => "scatterChart",
            VisualType::Map => "map",
            VisualType::TableEx => "tableEx",
            VisualType::Slicer => "slicer",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Category,
    Values,
}

impl Bucket {
    fn name(&self) -> &'static str {
        match self {
            Bucket::Category => "Category",
            Bucket::Values => "Values",
        }
    }
}

/// A field projection resolved against the emitted model.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    pub bucket: Bucket,
    pub entity: String,
    pub property: String,
    pub is_measure: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VisualSpec {
    /// Source worksheet this visual was mapped from.
    pub worksheet: Ident,
    pub id: String,
    pub visual_type: VisualType,
    pub projections: Vec<Projection>,
    pub rect: Rect,
    /// Resolved worksheet filters, carried as visual-level filters.
    pub filters: Vec<Projection>,
}

/// A cross-visual interaction declared on a page, mapped from a source
/// filter action.
#[derive(Clone, Debug, PartialEq)]
pub struct PageInteraction {
    pub name: String,
    pub source_visual: String,
    pub target_visual: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PageSpec {
    /// Source dashboard (or standalone worksheet) this page came from.
    pub source: Ident,
    pub id: String,
    pub display_name: String,
    pub width: f64,
    pub height: f64,
    pub visuals: Vec<VisualSpec>,
    pub interactions: Vec<PageInteraction>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportResult {
    pub pages: Vec<PageSpec>,
    pub documents: BTreeMap<String, Document>,
    /// Projections dropped because their field does not exist in the
    /// emitted model.
    pub excluded: Vec<(String, Error)>,
    pub assumptions: Vec<Assumption>,
}

const DEFAULT_PAGE_WIDTH: f64 = 1280.0;
const DEFAULT_PAGE_HEIGHT: f64 = 720.0;

struct FieldResolver<'a> {
    workbook: &'a WorkbookModel,
    model: &'a SemanticModel,
    translations: BTreeMap<Ident, &'a TranslatedExpression>,
}

impl<'a> FieldResolver<'a> {
    fn new(
        workbook: &'a WorkbookModel,
        model: &'a SemanticModel,
        translations: &'a [TranslatedExpression],
    ) -> Self {
        FieldResolver {
            workbook,
            model,
            translations: translations.iter().map(|t| (t.ident.clone(), t)).collect(),
        }
    }

    /// Resolve a canonical field ident to (entity, property,
    /// is_measure), checking the emitted model for existence.
    fn resolve(&self, ident: &str) -> Option<(String, String, bool)> {
        if let Some(t) = self.translations.get(ident) {
            if self.model.has_field(&t.table, &t.name) {
                return Some((
                    t.table.clone(),
                    t.name.clone(),
                    t.kind == FieldKind::Measure,
                ));
            }
            return None;
        }
        let table = self.workbook.table_of_column(ident)?;
        let column = table.get_column(ident)?;
        if self.model.has_field(&table.name, &column.name) {
            Some((table.name.clone(), column.name.clone(), false))
        } else {
            None
        }
    }

    fn is_date(&self, ident: &str) -> bool {
        self.workbook
            .table_of_column(ident)
            .and_then(|t| t.get_column(ident))
            .is_some_and(|c| matches!(c.data_type, DataType::Date | DataType::DateTime))
    }
}

pub fn map_report(
    workbook: &WorkbookModel,
    model: &SemanticModel,
    translations: &[TranslatedExpression],
    project: &str,
    schema: &TargetSchema,
    layout_hints: &BTreeMap<Ident, Rect>,
) -> ReportResult {
    let mut result = ReportResult::default();
    let resolver = FieldResolver::new(workbook, model, translations);

    let mut placed: BTreeSet<Ident> = BTreeSet::new();

    for dashboard in &workbook.dashboards {
        let page_id = stable_id("page", project, &dashboard.name);
        let (width, height) = if dashboard.size.0 > 0.0 && dashboard.size.1 > 0.0 {
            dashboard.size
        } else {
            (DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT)
        };

        let mut page = PageSpec {
            source: dashboard.ident(),
            id: page_id,
            display_name: dashboard.name.clone(),
            width,
            height,
            visuals: Vec::new(),
            interactions: Vec::new(),
        };

        for zone in &dashboard.zones {
            match zone.kind {
                ZoneKind::Worksheet => {
                    let Some(name) = &zone.worksheet else {
                        continue;
                    };
                    let ws_ident = canonicalize(name);
                    let Some(ws) = workbook.get_worksheet(&ws_ident) else {
                        continue;
                    };
                    placed.insert(ws_ident);
                    let rect = effective_rect(zone.rect, &ws.ident(), layout_hints);
                    page.visuals.push(map_worksheet(
                        ws,
                        &page.display_name,
                        rect,
                        &resolver,
                        &mut result,
                    ));
                }
                ZoneKind::QuickFilter => {
                    let Some(field) = &zone.field else {
                        continue;
                    };
                    let ident = canonicalize(field);
                    match resolver.resolve(&ident) {
                        Some((entity, property, is_measure)) => {
                            page.visuals.push(VisualSpec {
                                worksheet: ident.clone(),
                                id: stable_id("visual", &dashboard.name, field),
                                visual_type: VisualType::Slicer,
                                projections: vec![Projection {
                                    bucket: Bucket::Values,
                                    entity,
                                    property,
                                    is_measure,
                                }],
                                rect: zone.rect,
                                filters: Vec::new(),
                            });
                        }
                        None => {
                            result.excluded.push((
                                format!("{}/{}", dashboard.name, field),
                                Error::new(
                                    ErrorKind::Model,
                                    ErrorCode::UnresolvedFieldProjection,
                                    Some(format!(
                                        "quick filter field '{field}' is not in the emitted model"
                                    )),
                                ),
                            ));
                        }
                    }
                }
                ZoneKind::Layout => {}
            }
        }

        result.pages.push(page);
    }

    // worksheets on no dashboard get standalone pages
    for ws in &workbook.worksheets {
        if placed.contains(&ws.ident()) {
            continue;
        }
        let page_id = stable_id("page", project, &ws.name);
        // standalone sheets have no declared layout; a hint wins, and
        // the fallback is the full page
        let mut rect = effective_rect(Rect::default(), &ws.ident(), layout_hints);
        if rect.width <= 0.0 || rect.height <= 0.0 {
            rect = Rect::new(0.0, 0.0, DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT);
        }
        let mut page = PageSpec {
            source: ws.ident(),
            id: page_id,
            display_name: ws.name.clone(),
            width: DEFAULT_PAGE_WIDTH,
            height: DEFAULT_PAGE_HEIGHT,
            visuals: Vec::new(),
            interactions: Vec::new(),
        };
        page.visuals
            .push(map_worksheet(ws, &ws.name, rect, &resolver, &mut result));
        result.pages.push(page);
    }

    // filter actions become cross-visual interactions on every page
    // holding both endpoints
    for action in &workbook.actions {
        let source = canonicalize(&action.source_worksheet);
        for target in &action.target_worksheets {
            let target = canonicalize(target);
            for page in result.pages.iter_mut() {
                let source_visual = page.visuals.iter().find(|v| v.worksheet == source);
                let target_visual = page.visuals.iter().find(|v| v.worksheet == target);
                if let (Some(s), Some(t)) = (source_visual, target_visual) {
                    page.interactions.push(PageInteraction {
                        name: action.name.clone(),
                        source_visual: s.id.clone(),
                        target_visual: t.id.clone(),
                    });
                }
            }
        }
    }

    render_report_documents(&mut result, project, schema);
    result
}

fn effective_rect(declared: Rect, ws_ident: &str, hints: &BTreeMap<Ident, Rect>) -> Rect {
    // a declared layout always wins; hints only fill gaps
    if declared.width > 0.0 && declared.height > 0.0 {
        return declared;
    }
    hints.get(ws_ident).copied().unwrap_or(declared)
}

fn map_worksheet(
    ws: &Worksheet,
    page_name: &str,
    rect: Rect,
    resolver: &FieldResolver,
    result: &mut ReportResult,
) -> VisualSpec {
    let visual_type = classify_visual(ws, resolver, result);

    let mut projections = Vec::new();
    for shelf in ws.shelf_fields() {
        match resolve_projection(shelf, resolver) {
            Some(p) => projections.push(p),
            None => {
                result.excluded.push((
                    format!("{}/{}", ws.name, shelf.field),
                    Error::new(
                        ErrorKind::Model,
                        ErrorCode::UnresolvedFieldProjection,
                        Some(format!(
                            "'{}' is not in the emitted model; projection dropped",
                            shelf.field
                        )),
                    ),
                ));
                result.assumptions.push(Assumption {
                    location: ws.name.clone(),
                    source_text: shelf.field.clone(),
                    target_text: String::new(),
                    reason: "field projection referenced an unresolved or untranslated \
                             field and was dropped from the visual"
                        .to_string(),
                });
            }
        }
    }

    let mut filters = Vec::new();
    for filter in &ws.filters {
        let ident = canonicalize(&filter.field);
        if let Some((entity, property, is_measure)) = resolver.resolve(&ident) {
            filters.push(Projection {
                bucket: Bucket::Values,
                entity,
                property,
                is_measure,
            });
        }
    }

    VisualSpec {
        worksheet: ws.ident(),
        id: stable_id("visual", page_name, &ws.name),
        visual_type,
        projections,
        rect,
        filters,
    }
}

fn resolve_projection(shelf: &ShelfField, resolver: &FieldResolver) -> Option<Projection> {
    let ident = shelf.ident();
    let (entity, property, is_measure) = resolver.resolve(&ident)?;
    let aggregated = is_measure
        || shelf
            .derivation
            .as_deref()
            .is_some_and(|d| !d.eq_ignore_ascii_case("none"));
    Some(Projection {
        bucket: if aggregated {
            Bucket::Values
        } else {
            Bucket::Category
        },
        entity,
        property,
        is_measure,
    })
}

/// Deterministic lookup from the worksheet's declared mark/encoding
/// shape to a visual type.
fn classify_visual(
    ws: &Worksheet,
    resolver: &FieldResolver,
    result: &mut ReportResult,
) -> VisualType {
    let has_date_shelf = ws.shelf_fields().any(|s| resolver.is_date(&s.ident()));

    match ws.mark {
        MarkClass::Bar => VisualType::ColumnChart,
        MarkClass::Line => VisualType::LineChart,
        MarkClass::Area => VisualType::AreaChart,
        MarkClass::Pie => VisualType::PieChart,
        MarkClass::Square | MarkClass::Circle => VisualType::ScatterChart,
        MarkClass::Multipolygon => VisualType::Map,
        MarkClass::Text => VisualType::TableEx,
        MarkClass::Automatic if has_date_shelf => VisualType::LineChart,
        MarkClass::Automatic | MarkClass::Shape | MarkClass::Unknown => {
            result.assumptions.push(Assumption {
                location: ws.name.clone(),
                source_text: format!("{:?}", ws.mark),
                target_text: VisualType::TableEx.name().to_string(),
                reason: "mark class has no exact visual counterpart; defaulted to the \
                         generic table visual"
                    .to_string(),
            });
            VisualType::TableEx
        }
    }
}

fn projection_json(p: &Projection) -> serde_json::Value {
    let field = if p.is_measure {
        json!({
            "Measure": {
                "Expression": {"SourceRef": {"Entity": p.entity}},
                "Property": p.property,
            }
        })
    } else {
        json!({
            "Column": {
                "Expression": {"SourceRef": {"Entity": p.entity}},
                "Property": p.property,
            }
        })
    };
    json!({
        "field": field,
        "queryRef": format!("{}.{}", p.entity, p.property),
        "nativeQueryRef": p.property,
    })
}

fn visual_json(visual: &VisualSpec, schema: &TargetSchema, tab_order: usize) -> serde_json::Value {
    let mut query_state = serde_json::Map::new();
    for bucket in [Bucket::Category, Bucket::Values] {
        let projections: Vec<serde_json::Value> = visual
            .projections
            .iter()
            .filter(|p| p.bucket == bucket)
            .map(projection_json)
            .collect();
        if !projections.is_empty() {
            query_state.insert(
                bucket.name().to_string(),
                json!({"projections": projections}),
            );
        }
    }

    json!({
        "$schema": schema.schema_url("visualContainer", &schema.visual_schema_version),
        "name": visual.id,
        "position": {
            "x": visual.rect.x,
            "y": visual.rect.y,
            "z": 0,
            "height": visual.rect.height,
            "width": visual.rect.width,
            "tabOrder": tab_order,
        },
        "visual": {
            "visualType": visual.visual_type.name(),
            "query": {"queryState": query_state},
            "drillFilterOtherVisuals": true,
        },
    })
}

fn render_report_documents(result: &mut ReportResult, project: &str, schema: &TargetSchema) {
    let base = format!("{project}.Report");

    result.documents.insert(
        format!("{base}/definition.pbir"),
        Document::Json(json!({
            "version": schema.pbir_version,
            "datasetReference": {"byPath": {"path": format!("../{project}.SemanticModel")}},
        })),
    );

    result.documents.insert(
        format!("{base}/definition/report.json"),
        Document::Json(json!({
            "$schema": schema.schema_url("report", &schema.report_schema_version),
            "themeCollection": {},
            "settings": {
                "useStylableVisualContainerHeader": true,
                "defaultDrillFilterOtherVisuals": true,
            },
        })),
    );

    result.documents.insert(
        format!("{base}/definition/version.json"),
        Document::Json(json!({
            "$schema": schema.schema_url("versionMetadata", &schema.version_schema_version),
            "version": "2.0.0",
        })),
    );

    let page_order: Vec<&str> = result.pages.iter().map(|p| p.id.as_str()).collect();
    let active = page_order.first().copied().unwrap_or_default();
    result.documents.insert(
        format!("{base}/definition/pages/pages.json"),
        Document::Json(json!({
            "$schema": schema.schema_url("pagesMetadata", &schema.pages_schema_version),
            "pageOrder": page_order,
            "activePageName": active,
        })),
    );

    let mut docs = Vec::new();
    for page in &result.pages {
        let mut page_json = json!({
            "$schema": schema.schema_url("page", &schema.page_schema_version),
            "name": page.id,
            "displayName": page.display_name,
            "displayOption": "FitToPage",
            "width": page.width,
            "height": page.height,
        });
        if !page.interactions.is_empty() {
            let interactions: Vec<serde_json::Value> = page
                .interactions
                .iter()
                .map(|i| {
                    json!({
                        "name": i.name,
                        "source": i.source_visual,
                        "target": i.target_visual,
                        "type": "DataFilter",
                    })
                })
                .collect();
            page_json["visualInteractions"] = json!(interactions);
        }
        docs.push((
            format!("{base}/definition/pages/{}/page.json", page.id),
            Document::Json(page_json),
        ));

        for (i, visual) in page.visuals.iter().enumerate() {
            docs.push((
                format!(
                    "{base}/definition/pages/{}/visuals/{}/visual.json",
                    page.id, visual.id
                ),
                Document::Json(visual_json(visual, schema, i)),
            ));
        }
    }
    for (path, doc) in docs {
        result.documents.insert(path, doc);
    }
}
