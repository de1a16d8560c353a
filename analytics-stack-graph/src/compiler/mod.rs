//! Dependency graph compiler
//!
//! Orders provisioning operations from the edges discovered by the resolver
//! using Kahn's algorithm. Among nodes with no unmet dependency, the one
//! declared first always goes next, so an unchanged declaration set always
//! compiles to the same plan.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};

use log::{debug, info};

use crate::errors::{GraphError, Result};
use crate::model::{Declarations, LogicalId, ResourceDescriptor};
use crate::resolver::Reference;

mod cycle;
mod plan;

pub use plan::{Dependency, Operation, PlanStep, ProvisioningPlan};

/// Compile a fresh plan: every declared resource is created
///
/// # Errors
/// `UnknownResource` for an edge touching an undeclared id, `CyclicDependency`
/// with the minimal cycle when the graph is not acyclic.
pub fn compile(
    declarations: &Declarations,
    references: &BTreeSet<Reference>,
) -> Result<ProvisioningPlan> {
    build_plan(declarations, references, None)
}

/// Compile relative to a previously emitted plan
///
/// Resources the prior plan provisioned become updates, new ones are created,
/// and resources that are no longer declared are deleted in the prior
/// teardown order unless they were retained.
pub fn compile_against(
    declarations: &Declarations,
    references: &BTreeSet<Reference>,
    prior: &ProvisioningPlan,
) -> Result<ProvisioningPlan> {
    build_plan(declarations, references, Some(prior))
}

fn build_plan(
    declarations: &Declarations,
    references: &BTreeSet<Reference>,
    prior: Option<&ProvisioningPlan>,
) -> Result<ProvisioningPlan> {
    let edges = dependency_edges(declarations, references)?;
    let order = topological_order(declarations, &edges)?;

    let existing: HashSet<&LogicalId> = prior
        .map(|plan| plan.create_order().into_iter().collect())
        .unwrap_or_default();

    let mut steps = Vec::with_capacity(order.len());
    let mut teardown = Vec::new();
    let mut retained = Vec::new();

    for descriptor in &order {
        let operation = if existing.contains(&descriptor.logical_id) {
            Operation::Update
        } else {
            Operation::Create
        };
        steps.push(PlanStep::new(operation, (*descriptor).clone()));
    }

    for descriptor in order.iter().rev() {
        if descriptor.is_retained() {
            debug!("{} is retained on teardown", descriptor.logical_id);
            retained.push(descriptor.logical_id.clone());
        } else {
            teardown.push(PlanStep::new(Operation::Delete, (*descriptor).clone()));
        }
    }

    if let Some(prior) = prior {
        append_orphans(declarations, prior, &mut steps, &mut retained);
    }

    let plan = ProvisioningPlan {
        steps,
        teardown,
        retained,
        edges: edges
            .into_iter()
            .map(|(from, to)| Dependency { from, to })
            .collect(),
    };

    info!(
        "Compiled plan: {} step(s), {} teardown step(s), {} retained",
        plan.steps.len(),
        plan.teardown.len(),
        plan.retained.len()
    );
    Ok(plan)
}

/// Unique `(from, to)` pairs; several fields may reference the same resource
fn dependency_edges(
    declarations: &Declarations,
    references: &BTreeSet<Reference>,
) -> Result<BTreeSet<(LogicalId, LogicalId)>> {
    let mut edges = BTreeSet::new();

    for reference in references {
        for endpoint in [&reference.from, &reference.to] {
            if !declarations.contains(endpoint) {
                return Err(GraphError::unknown_resource(
                    &reference.from,
                    endpoint,
                    &reference.field,
                    declarations.closest(endpoint),
                ));
            }
        }
        edges.insert((reference.from.clone(), reference.to.clone()));
    }

    Ok(edges)
}

/// Ready node keyed by declaration index; `Reverse` turns the max-heap into a min-heap
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Ready(Reverse<usize>);

impl Ready {
    fn index(&self) -> usize {
        (self.0).0
    }
}

fn topological_order<'a>(
    declarations: &'a Declarations,
    edges: &BTreeSet<(LogicalId, LogicalId)>,
) -> Result<Vec<&'a ResourceDescriptor>> {
    let descriptors: Vec<_> = declarations.iter().collect();
    let n = descriptors.len();

    // dependents[i]: nodes that wait for i; references[i]: nodes i waits for
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut references: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];

    for (from, to) in edges {
        let (Some(from), Some(to)) = (declarations.position(from), declarations.position(to))
        else {
            continue;
        };
        dependents[to].push(from);
        references[from].push(to);
        in_degree[from] += 1;
    }
    for list in &mut references {
        list.sort_unstable();
    }

    let mut heap: BinaryHeap<Ready> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Ready(Reverse(index)))
        .collect();

    let mut sorted = Vec::with_capacity(n);
    while let Some(ready) = heap.pop() {
        let index = ready.index();
        debug!("Ordered {} at position {}", descriptors[index].logical_id, sorted.len());
        sorted.push(index);

        for &next in &dependents[index] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                heap.push(Ready(Reverse(next)));
            }
        }
    }

    if sorted.len() != n {
        let remaining: Vec<bool> = in_degree.iter().map(|&degree| degree > 0).collect();
        let cycle = cycle::minimal_cycle(&references, &remaining).unwrap_or_else(|| {
            (0..n).filter(|&index| remaining[index]).collect()
        });
        return Err(GraphError::CyclicDependency {
            cycle: cycle
                .into_iter()
                .map(|index| descriptors[index].logical_id.clone())
                .collect(),
        });
    }

    Ok(sorted.into_iter().map(|index| descriptors[index]).collect())
}

fn append_orphans(
    declarations: &Declarations,
    prior: &ProvisioningPlan,
    steps: &mut Vec<PlanStep>,
    retained: &mut Vec<LogicalId>,
) {
    let is_orphan = |step: &&PlanStep| !declarations.contains(step.logical_id());

    for step in prior.teardown.iter().filter(is_orphan) {
        debug!("{} is no longer declared; scheduling delete", step.logical_id());
        steps.push(PlanStep::new(Operation::Delete, step.descriptor.clone()));
    }

    let mut prior_provisioned: Vec<&PlanStep> = prior.provisioning_steps().collect();
    prior_provisioned.reverse();
    for step in prior_provisioned.into_iter().filter(is_orphan) {
        if step.descriptor.is_retained() && !retained.contains(step.logical_id()) {
            debug!("{} is no longer declared but retained", step.logical_id());
            retained.push(step.logical_id().clone());
        }
    }
}
