// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! End-to-end: source document text in, validated project document set
//! out.

use tabport_compat::engine::emit::Document;
use tabport_compat::engine::project::{ConvertOptions, convert};
use tabport_compat::engine::report::VisualType;
use tabport_compat::engine::ErrorCode;
use tabport_compat::open_twb;

const SUPERSTORE: &str = r#"<?xml version='1.0' encoding='utf-8' ?>
<workbook version='18.1'>
  <datasources>
    <datasource name='federated.0aqz' caption='Superstore'>
      <connection class='federated'>
        <relation join='inner' type='join'>
          <clause type='join'>
            <expression op='='>
              <expression op='[Orders].[Order ID]' />
              <expression op='[Returns].[Order ID]' />
            </expression>
          </clause>
          <relation name='Orders' table='[Orders$]' type='table' />
          <relation name='Returns' table='[Returns$]' type='table' />
        </relation>
        <cols>
          <map key='[Order ID]' value='[Orders].[Order ID]' />
          <map key='[Order Date]' value='[Orders].[Order Date]' />
          <map key='[Sales]' value='[Orders].[Sales]' />
          <map key='[Profit]' value='[Orders].[Profit]' />
          <map key='[Category]' value='[Orders].[Category]' />
          <map key='[Order ID (Returns)]' value='[Returns].[Order ID]' />
          <map key='[Returned]' value='[Returns].[Returned]' />
        </cols>
      </connection>
      <column datatype='string' name='[Order ID]' role='dimension' type='nominal' unique='true' />
      <column datatype='date' name='[Order Date]' role='dimension' type='ordinal' />
      <column datatype='real' name='[Sales]' role='measure' type='quantitative' aggregation='Sum' />
      <column datatype='real' name='[Profit]' role='measure' type='quantitative' aggregation='Sum' />
      <column datatype='string' name='[Category]' role='dimension' type='nominal' />
      <column datatype='string' name='[Order ID (Returns)]' role='dimension' type='nominal' />
      <column datatype='string' name='[Returned]' role='dimension' type='nominal' />
      <column caption='Profit Ratio' datatype='real' name='[Calculation_543921]' role='measure' type='quantitative'>
        <calculation class='tableau' formula='SUM([Profit]) / SUM([Sales])' />
      </column>
    </datasource>
  </datasources>
  <worksheets>
    <worksheet name='Sales by Category'>
      <table>
        <view>
          <filter class='categorical' column='[federated.0aqz].[none:Category:nk]' />
        </view>
        <panes>
          <pane>
            <mark class='Bar' />
          </pane>
        </panes>
        <rows>[federated.0aqz].[sum:Sales:qk]</rows>
        <cols>[federated.0aqz].[none:Category:nk]</cols>
      </table>
    </worksheet>
    <worksheet name='Returns Detail'>
      <table>
        <view />
        <panes>
          <pane>
            <mark class='Text' />
          </pane>
        </panes>
        <rows>[federated.0aqz].[none:Returned:nk]</rows>
        <cols />
      </table>
    </worksheet>
  </worksheets>
  <dashboards>
    <dashboard name='Overview'>
      <size maxheight='900' maxwidth='1600' />
      <zones>
        <zone h='98304' id='3' type-v2='layout-basic' w='98304' x='0' y='0'>
          <zone h='49152' id='6' name='Sales by Category' w='49152' x='0' y='0' />
          <zone h='49152' id='7' name='Returns Detail' w='49152' x='0' y='49152' />
          <zone h='12288' id='8' type-v2='filter' param='[federated.0aqz].[none:Category:nk]' name='Category' w='24576' x='49152' y='0' />
        </zone>
      </zones>
    </dashboard>
  </dashboards>
  <actions>
    <action caption='Filter on select' name='[Action1]'>
      <activation auto-clear='true' type='on-select' />
      <source dashboard='Overview' type='sheet' worksheet='Sales by Category' />
      <command command='tsc:filter'>
        <param name='target' value='Returns Detail' />
      </command>
    </action>
  </actions>
</workbook>
"#;

#[test]
fn test_superstore_conversion() {
    let model = open_twb(&mut SUPERSTORE.as_bytes()).unwrap();
    let conversion = convert(&model, &ConvertOptions::new("Superstore")).unwrap();

    assert!(conversion.issues.is_empty());

    // the translated measure lands in the Orders table document
    let Document::Tmdl(orders) = conversion
        .artifacts
        .documents
        .get("Superstore.SemanticModel/definition/tables/Orders.tmdl")
        .unwrap()
    else {
        panic!("expected tmdl");
    };
    assert!(orders.contains(
        "measure 'Profit Ratio' = DIVIDE(SUM(Orders[Profit]), SUM(Orders[Sales]))"
    ));

    // one-to-many from the unique side, filtering one -> many
    let Document::Tmdl(rels) = conversion
        .artifacts
        .documents
        .get("Superstore.SemanticModel/definition/relationships.tmdl")
        .unwrap()
    else {
        panic!("expected tmdl");
    };
    assert!(rels.contains("fromColumn: Returns.'Order ID'"));
    assert!(rels.contains("toColumn: Orders.'Order ID'"));
    assert!(!rels.contains("crossFilteringBehavior"));

    // the dashboard becomes the only page: a bar chart, a table, and a
    // slicer wired by the filter action
    assert_eq!(1, conversion.artifacts.pages.len());
    let page = &conversion.artifacts.pages[0];
    assert_eq!("Overview", page.display_name);
    assert_eq!(3, page.visuals.len());
    assert_eq!(VisualType::ColumnChart, page.visuals[0].visual_type);
    assert_eq!(VisualType::TableEx, page.visuals[1].visual_type);
    assert_eq!(VisualType::Slicer, page.visuals[2].visual_type);
    assert_eq!(1, page.interactions.len());
    assert_eq!(page.visuals[0].id, page.interactions[0].source_visual);
    assert_eq!(page.visuals[1].id, page.interactions[0].target_visual);
}

#[test]
fn test_conversion_is_idempotent() {
    let model = open_twb(&mut SUPERSTORE.as_bytes()).unwrap();
    let first = convert(&model, &ConvertOptions::new("Superstore")).unwrap();

    let model = open_twb(&mut SUPERSTORE.as_bytes()).unwrap();
    let second = convert(&model, &ConvertOptions::new("Superstore")).unwrap();

    assert_eq!(first.artifacts, second.artifacts);
    assert_eq!(first.assumptions, second.assumptions);
}

#[test]
fn test_every_projection_resolves_in_the_emitted_model() {
    let model = open_twb(&mut SUPERSTORE.as_bytes()).unwrap();
    let conversion = convert(&model, &ConvertOptions::new("Superstore")).unwrap();

    // independent oracle for the referential-closure property the
    // validator also checks
    let semantic = &conversion.artifacts.model;
    for page in &conversion.artifacts.pages {
        for visual in &page.visuals {
            for p in visual.projections.iter().chain(visual.filters.iter()) {
                assert!(
                    semantic.has_field(&p.entity, &p.property),
                    "{}[{}] missing from the model",
                    p.entity,
                    p.property
                );
            }
        }
    }
    for rel in &semantic.relationships {
        for (table, column) in [
            (&rel.many_table, &rel.many_column),
            (&rel.one_table, &rel.one_column),
        ] {
            assert!(semantic.has_field(table, column));
        }
    }
}

#[test]
fn test_reference_cycle_excludes_only_the_cycle() {
    let input = r#"<workbook>
  <datasources>
    <datasource name='d' caption='Orders'>
      <column datatype='real' name='[Sales]' role='measure' />
      <column caption='A' datatype='real' name='[Calculation_1]' role='measure'>
        <calculation class='tableau' formula='[Calculation_2] + 1' />
      </column>
      <column caption='B' datatype='real' name='[Calculation_2]' role='measure'>
        <calculation class='tableau' formula='[Calculation_1] + 1' />
      </column>
      <column caption='Total Sales' datatype='real' name='[Calculation_3]' role='measure'>
        <calculation class='tableau' formula='SUM([Sales])' />
      </column>
    </datasource>
  </datasources>
  <worksheets />
  <dashboards />
</workbook>"#;

    let model = open_twb(&mut input.as_bytes()).unwrap();
    let conversion = convert(&model, &ConvertOptions::new("Orders")).unwrap();

    let cycle_issues: Vec<_> = conversion
        .issues
        .iter()
        .filter(|i| i.error.code == ErrorCode::CircularDependency)
        .collect();
    assert_eq!(2, cycle_issues.len());
    for issue in &cycle_issues {
        assert_eq!(Some("{a, b}".to_string()), issue.error.get_details());
    }

    // the standalone field still translates
    let Document::Tmdl(orders) = conversion
        .artifacts
        .documents
        .get("Orders.SemanticModel/definition/tables/Orders.tmdl")
        .unwrap()
    else {
        panic!("expected tmdl");
    };
    assert!(orders.contains("measure 'Total Sales' = SUM(Orders[Sales])"));
    assert!(!orders.contains("measure A"));
    assert!(!orders.contains("measure B"));
}

#[test]
fn test_syntax_error_degrades_one_field_and_is_reported() {
    let input = r#"<workbook>
  <datasources>
    <datasource name='d' caption='Orders'>
      <column datatype='real' name='[Sales]' role='measure' />
      <column caption='Broken' datatype='real' name='[Calculation_1]' role='measure'>
        <calculation class='tableau' formula='SUM([Sales]) +' />
      </column>
      <column caption='Total Sales' datatype='real' name='[Calculation_2]' role='measure'>
        <calculation class='tableau' formula='SUM([Sales])' />
      </column>
    </datasource>
  </datasources>
  <worksheets />
  <dashboards />
</workbook>"#;

    let model = open_twb(&mut input.as_bytes()).unwrap();
    let conversion = convert(&model, &ConvertOptions::new("Orders")).unwrap();

    assert_eq!(1, conversion.issues.len());
    assert_eq!("Broken", conversion.issues[0].entity);

    // the degraded field leaves an assumption naming its source text
    assert!(conversion
        .assumptions
        .iter()
        .any(|a| a.location == "Broken" && a.source_text == "SUM([Sales]) +"));

    let Document::Tmdl(orders) = conversion
        .artifacts
        .documents
        .get("Orders.SemanticModel/definition/tables/Orders.tmdl")
        .unwrap()
    else {
        panic!("expected tmdl");
    };
    assert!(orders.contains("measure 'Total Sales'"));
    assert!(!orders.contains("Broken"));
}
