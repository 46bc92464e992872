// Copyright 2026 The Tabport Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Dependency resolution over calculated fields.
//!
//! Nodes are field identifiers, edges the "references" relation;
//! entities never hold pointers at each other, so cycle detection and
//! ordering stay pure graph algorithms.  A true cycle excludes exactly
//! the fields on it (no valid order exists for them); everything else
//! translates normally.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::common::{Error, ErrorCode, ErrorKind, Ident};
use crate::field::Field;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// Field identifiers in evaluation order: every field appears
    /// after all fields it references, ties broken by declaration
    /// order.
    pub order: Vec<Ident>,
    /// Fields excluded from translation, with the reason.
    pub excluded: Vec<(Ident, Error)>,
    /// Field-to-field edges actually used for ordering.
    pub deps: BTreeMap<Ident, BTreeSet<Ident>>,
}

/// Build the dependency graph and evaluation order.
///
/// `columns` and `parameters` are the non-field identifiers a formula
/// may legitimately reference; anything outside those sets and the
/// field set is an unknown reference, which excludes the referencing
/// field.
pub fn resolve(
    fields: &[Field],
    columns: &BTreeSet<Ident>,
    parameters: &BTreeSet<Ident>,
) -> Resolution {
    let by_ident: HashMap<&str, &Field> =
        fields.iter().map(|f| (f.ident.as_str(), f)).collect();

    let mut excluded: BTreeMap<Ident, Error> = BTreeMap::new();

    // fields that failed to parse are placeholders: they don't
    // participate in ordering and poison their dependents
    for field in fields {
        if field.ast.is_none() {
            excluded.insert(
                field.ident.clone(),
                Error::new(
                    ErrorKind::Model,
                    ErrorCode::DoesNotExist,
                    Some(format!("'{}' has no parsed expression", field.name)),
                ),
            );
        }
    }

    // field-to-field edges, plus unknown-reference checks
    let mut deps: BTreeMap<Ident, BTreeSet<Ident>> = BTreeMap::new();
    for field in fields {
        if field.ast.is_none() {
            continue;
        }
        let mut field_deps = BTreeSet::new();
        for r in &field.refs {
            if by_ident.contains_key(r.as_str()) {
                field_deps.insert(r.clone());
            } else if !columns.contains(r) && !parameters.contains(r) {
                excluded.insert(
                    field.ident.clone(),
                    Error::new(
                        ErrorKind::Model,
                        ErrorCode::UnknownDependency,
                        Some(format!("'{}' references unknown field '{}'", field.name, r)),
                    ),
                );
            }
        }
        deps.insert(field.ident.clone(), field_deps);
    }

    // cycle detection: explicit DFS with a processing set so we can
    // name the whole cycle
    let mut finished: BTreeSet<Ident> = BTreeSet::new();
    let mut cycles: Vec<Vec<Ident>> = Vec::new();
    for field in fields {
        if field.ast.is_none() {
            continue;
        }
        let mut stack: Vec<Ident> = Vec::new();
        find_cycles(&field.ident, &deps, &mut stack, &mut finished, &mut cycles);
    }

    for cycle in &cycles {
        let mut members = cycle.clone();
        members.sort();
        let names = members.join(", ");
        for ident in cycle {
            excluded.insert(
                ident.clone(),
                Error::new(
                    ErrorKind::Model,
                    ErrorCode::CircularDependency,
                    Some(format!("{{{names}}}")),
                ),
            );
        }
    }

    // transitively poison dependents of excluded fields
    loop {
        let mut changed = false;
        for field in fields {
            if excluded.contains_key(&field.ident) {
                continue;
            }
            let Some(field_deps) = deps.get(&field.ident) else {
                continue;
            };
            if let Some(dep) = field_deps.iter().find(|d| excluded.contains_key(*d)) {
                excluded.insert(
                    field.ident.clone(),
                    Error::new(
                        ErrorKind::Model,
                        ErrorCode::UnknownDependency,
                        Some(format!(
                            "'{}' depends on excluded field '{}'",
                            field.name, dep
                        )),
                    ),
                );
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // Kahn's algorithm; the ready set is ordered by declaration index
    // so ties are broken deterministically
    let live: Vec<&Field> = fields
        .iter()
        .filter(|f| f.ast.is_some() && !excluded.contains_key(&f.ident))
        .collect();

    let mut remaining: HashMap<&str, BTreeSet<&str>> = live
        .iter()
        .map(|f| {
            let ds = deps[&f.ident]
                .iter()
                .filter(|d| !excluded.contains_key(*d))
                .map(|d| d.as_str())
                .collect::<BTreeSet<&str>>();
            (f.ident.as_str(), ds)
        })
        .collect();

    let decl_index: HashMap<&str, usize> =
        live.iter().map(|f| (f.ident.as_str(), f.decl_index)).collect();

    let mut ready: BTreeSet<(usize, &str)> = remaining
        .iter()
        .filter(|(_, ds)| ds.is_empty())
        .map(|(id, _)| (decl_index[id], *id))
        .collect();

    let mut order: Vec<Ident> = Vec::with_capacity(live.len());
    while let Some(&(idx, ident)) = ready.iter().next() {
        ready.remove(&(idx, ident));
        remaining.remove(ident);
        order.push(ident.to_string());

        for (other, ds) in remaining.iter_mut() {
            if ds.remove(ident) && ds.is_empty() {
                ready.insert((decl_index[other], *other));
            }
        }
    }

    // anything still remaining is unreachable only if cycle handling
    // missed it; that would be an internal error, surface it as such
    debug_assert!(remaining.is_empty());

    let excluded = excluded.into_iter().collect();
    Resolution {
        order,
        excluded,
        deps,
    }
}

fn find_cycles(
    ident: &Ident,
    deps: &BTreeMap<Ident, BTreeSet<Ident>>,
    stack: &mut Vec<Ident>,
    finished: &mut BTreeSet<Ident>,
    cycles: &mut Vec<Vec<Ident>>,
) {
    if finished.contains(ident) {
        return;
    }
    if let Some(pos) = stack.iter().position(|s| s == ident) {
        cycles.push(stack[pos..].to_vec());
        return;
    }
    let Some(field_deps) = deps.get(ident) else {
        return;
    };
    stack.push(ident.clone());
    for dep in field_deps {
        find_cycles(dep, deps, stack, finished, cycles);
    }
    stack.pop();
    finished.insert(ident.clone());
}
