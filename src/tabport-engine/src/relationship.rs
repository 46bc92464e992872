// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Converts the source join graph into explicit relationships with
//! inferred cardinality and cross-filter direction.

use crate::common::{Assumption, Error, ErrorCode, ErrorKind, canonicalize};
use crate::datamodel::{Join, WorkbookModel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToMany,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrossFilter {
    Single,
    Both,
}

/// A resolved relationship.  `from` is the "one" side for one-to-many
/// relationships; filter propagation runs from → to under
/// `CrossFilter::Single`.
#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub cardinality: Cardinality,
    pub cross_filter: CrossFilter,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationshipResult {
    pub relationships: Vec<Relationship>,
    /// Joins that referenced tables or columns missing from the model,
    /// with the reason; fatal for the relationship only.
    pub excluded: Vec<(String, Error)>,
    pub assumptions: Vec<Assumption>,
}

pub fn build_relationships(model: &WorkbookModel) -> RelationshipResult {
    let mut result = RelationshipResult::default();

    for join in &model.joins {
        match build_one(model, join, &mut result.assumptions) {
            Ok(rel) => result.relationships.push(rel),
            Err(err) => {
                let name = format!(
                    "{}.{} = {}.{}",
                    join.left_table, join.left_column, join.right_table, join.right_column
                );
                result.excluded.push((name, err));
            }
        }
    }

    result
}

fn build_one(
    model: &WorkbookModel,
    join: &Join,
    assumptions: &mut Vec<Assumption>,
) -> Result<Relationship, Error> {
    let left_unique = side_is_unique(model, &join.left_table, &join.left_column)?;
    let right_unique = side_is_unique(model, &join.right_table, &join.right_column)?;

    let (cardinality, from, to) = match (left_unique, right_unique) {
        (true, false) => (
            Cardinality::OneToMany,
            (&join.left_table, &join.left_column),
            (&join.right_table, &join.right_column),
        ),
        (false, true) => (
            Cardinality::OneToMany,
            (&join.right_table, &join.right_column),
            (&join.left_table, &join.left_column),
        ),
        (true, true) => (
            Cardinality::OneToOne,
            (&join.left_table, &join.left_column),
            (&join.right_table, &join.right_column),
        ),
        (false, false) => {
            let rel_text = format!(
                "{}[{}] <-> {}[{}]",
                join.left_table, join.left_column, join.right_table, join.right_column
            );
            assumptions.push(Assumption {
                location: format!("join {}.{}", join.left_table, join.right_table),
                source_text: format!(
                    "{}.{} = {}.{}",
                    join.left_table, join.left_column, join.right_table, join.right_column
                ),
                target_text: rel_text,
                reason: "neither join key is declared unique; emitted as many-to-many, \
                         which the target model resolves less efficiently and may not \
                         support on all storage modes"
                    .to_string(),
            });
            (
                Cardinality::ManyToMany,
                (&join.left_table, &join.left_column),
                (&join.right_table, &join.right_column),
            )
        }
    };

    let cross_filter = if join.bidirectional_filter {
        CrossFilter::Both
    } else {
        CrossFilter::Single
    };

    Ok(Relationship {
        from_table: from.0.clone(),
        from_column: from.1.clone(),
        to_table: to.0.clone(),
        to_column: to.1.clone(),
        cardinality,
        cross_filter,
    })
}

fn side_is_unique(model: &WorkbookModel, table: &str, column: &str) -> Result<bool, Error> {
    let table_ident = canonicalize(table);
    let Some(table) = model.get_table(&table_ident) else {
        return Err(Error::new(
            ErrorKind::Model,
            ErrorCode::UnresolvedJoinReference,
            Some(format!("table '{table}' does not exist in the model")),
        ));
    };
    let column_ident = canonicalize(column);
    let Some(column) = table.get_column(&column_ident) else {
        return Err(Error::new(
            ErrorKind::Model,
            ErrorCode::UnresolvedJoinReference,
            Some(format!(
                "column '{}' does not exist on table '{}'",
                column, table.name
            )),
        ));
    };
    Ok(column.is_unique_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datamodel::{Aggregation, Column, DataType, JoinType, Role, Table};

    fn key_column(name: &str, unique: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: DataType::String,
            role: Role::Dimension,
            default_aggregation: Aggregation::default(),
            is_unique_key: unique,
        }
    }

    fn join(left: (&str, &str), right: (&str, &str)) -> Join {
        Join {
            join_type: JoinType::Inner,
            left_table: left.0.to_string(),
            left_column: left.1.to_string(),
            right_table: right.0.to_string(),
            right_column: right.1.to_string(),
            bidirectional_filter: false,
        }
    }

    fn orders_model(orders_unique: bool, lines_unique: bool) -> WorkbookModel {
        WorkbookModel {
            name: "Superstore".to_string(),
            tables: vec![
                Table {
                    name: "Orders".to_string(),
                    datasource: "ds0".to_string(),
                    columns: vec![key_column("OrderID", orders_unique)],
                },
                Table {
                    name: "OrderLines".to_string(),
                    datasource: "ds0".to_string(),
                    columns: vec![key_column("OrderID", lines_unique)],
                },
            ],
            joins: vec![join(("Orders", "OrderID"), ("OrderLines", "OrderID"))],
            ..Default::default()
        }
    }

    #[test]
    fn test_unique_one_side_gives_one_to_many() {
        let model = orders_model(true, false);
        let result = build_relationships(&model);

        assert!(result.excluded.is_empty());
        assert!(result.assumptions.is_empty());
        assert_eq!(1, result.relationships.len());

        let rel = &result.relationships[0];
        assert_eq!(Cardinality::OneToMany, rel.cardinality);
        assert_eq!("Orders", rel.from_table);
        assert_eq!("OrderLines", rel.to_table);
        assert_eq!(CrossFilter::Single, rel.cross_filter);
    }

    #[test]
    fn test_unique_both_sides_gives_one_to_one() {
        let model = orders_model(true, true);
        let result = build_relationships(&model);
        assert_eq!(
            Cardinality::OneToOne,
            result.relationships[0].cardinality
        );
    }

    #[test]
    fn test_no_unique_side_gives_flagged_many_to_many() {
        let model = orders_model(false, false);
        let result = build_relationships(&model);
        assert_eq!(
            Cardinality::ManyToMany,
            result.relationships[0].cardinality
        );
        assert_eq!(1, result.assumptions.len());
    }

    #[test]
    fn test_bidirectional_marker_gives_both() {
        let mut model = orders_model(true, false);
        model.joins[0].bidirectional_filter = true;
        let result = build_relationships(&model);
        assert_eq!(CrossFilter::Both, result.relationships[0].cross_filter);
    }

    #[test]
    fn test_missing_table_excludes_relationship_only() {
        let mut model = orders_model(true, false);
        model.joins.push(join(("Orders", "OrderID"), ("Returns", "OrderID")));
        let result = build_relationships(&model);

        assert_eq!(1, result.relationships.len());
        assert_eq!(1, result.excluded.len());
        assert_eq!(
            ErrorCode::UnresolvedJoinReference,
            result.excluded[0].1.code
        );
    }

    #[test]
    fn test_missing_column_excludes_relationship_only() {
        let mut model = orders_model(true, false);
        model.joins.push(join(("Orders", "Nope"), ("OrderLines", "OrderID")));
        let result = build_relationships(&model);
        assert_eq!(1, result.relationships.len());
        assert_eq!(1, result.excluded.len());
    }
}
