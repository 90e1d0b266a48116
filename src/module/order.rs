//! Dependency ordering for module installation.

use std::{collections::BTreeSet, sync::Arc};

use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use thiserror::Error;
use tracing::{instrument, warn};

use super::{Module, ModuleCatalog};
use crate::domain::{CyclePolicy, ModuleName};

/// Errors raised while ordering modules for installation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DependencyError {
    /// Module dependencies form one or more cycles.
    #[error("circular module dependencies: {}", format_cycles(.0))]
    Cycle(Vec<Vec<ModuleName>>),
}

fn format_cycles(cycles: &[Vec<ModuleName>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            cycle
                .iter()
                .map(ModuleName::as_str)
                .collect::<Vec<_>>()
                .join(" ↔ ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Returns the modules reachable from `roots` so that every module comes
/// after its dependencies.
///
/// Roots are visited in the order given and dependencies in the order each
/// module declares them. Names missing from the catalog are skipped with a
/// warning.
///
/// # Errors
///
/// Returns [`DependencyError::Cycle`] if the reachable modules form a cycle
/// and `cycles` is [`CyclePolicy::Reject`]. Under [`CyclePolicy::Tolerate`]
/// the cycle is broken at the first module visited twice.
#[instrument(level = "debug", skip(catalog))]
pub fn install_order(
    roots: &[ModuleName],
    catalog: &ModuleCatalog,
    cycles: CyclePolicy,
) -> Result<Vec<Arc<dyn Module>>, DependencyError> {
    let found = find_cycles(roots, catalog);
    if !found.is_empty() {
        match cycles {
            CyclePolicy::Reject => return Err(DependencyError::Cycle(found)),
            CyclePolicy::Tolerate => {
                warn!(cycles = %format_cycles(&found), "breaking circular module dependencies");
            }
        }
    }

    let mut visited = BTreeSet::new();
    let mut order = Vec::new();
    for root in roots {
        visit(root, catalog, &mut visited, &mut order);
    }
    Ok(order)
}

fn visit(
    name: &ModuleName,
    catalog: &ModuleCatalog,
    visited: &mut BTreeSet<ModuleName>,
    order: &mut Vec<Arc<dyn Module>>,
) {
    if !visited.insert(name.clone()) {
        return;
    }
    let Some(module) = catalog.get(name) else {
        warn!(module = %name, "module not found in catalog, skipping");
        return;
    };
    for dependency in module.dependencies() {
        visit(dependency, catalog, visited, order);
    }
    order.push(Arc::clone(module));
}

/// Strongly connected components among the modules reachable from `roots`,
/// each sorted, plus self-dependencies.
fn find_cycles(roots: &[ModuleName], catalog: &ModuleCatalog) -> Vec<Vec<ModuleName>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    let mut pending: Vec<&ModuleName> = roots.iter().collect();
    let mut seen = BTreeSet::new();

    while let Some(name) = pending.pop() {
        if !seen.insert(name.as_str()) {
            continue;
        }
        graph.add_node(name.as_str());
        let Some(module) = catalog.get(name) else {
            continue;
        };
        for dependency in module.dependencies() {
            graph.add_edge(name.as_str(), dependency.as_str(), ());
            pending.push(dependency);
        }
    }

    let mut cycles: Vec<Vec<ModuleName>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|node| graph.contains_edge(*node, *node))
        })
        .map(|component| {
            let mut names: Vec<_> = component
                .into_iter()
                .filter_map(|node| ModuleName::new(node).ok())
                .collect();
            names.sort();
            names
        })
        .collect();
    cycles.sort();
    cycles
}
