//! Apply/destroy executor
//!
//! Consumes a [`ProvisioningPlan`] and drives a [`ProvisioningBackend`].
//! Resources are grouped into dependency waves; everything in one wave has
//! all of its predecessors applied and is sent to the backend concurrently.
//! Deletes of resources dropped from the declarations only run once every
//! Create/Update of the plan has succeeded.

use std::collections::{BTreeMap, HashMap, HashSet};

use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::compiler::{Dependency, Operation, PlanStep, ProvisioningPlan};
use crate::model::{LogicalId, Properties, PropertyValue};

mod backend;
mod memory;

pub use backend::{ProvisionedResource, ProvisioningBackend, ResourceOutputs};
pub use memory::InMemoryBackend;

/// Per-resource failure reported by the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceError {
    pub logical_id: LogicalId,
    pub operation: Operation,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub created: Vec<LogicalId>,
    pub updated: Vec<LogicalId>,
    pub unchanged: Vec<LogicalId>,
    pub deleted: Vec<LogicalId>,
    pub errors: Vec<ResourceError>,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyResult {
    pub deleted: Vec<LogicalId>,
    pub retained: Vec<LogicalId>,
    pub errors: Vec<ResourceError>,
}

impl DestroyResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
}

pub struct Executor<'a, B: ProvisioningBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: ProvisioningBackend + ?Sized> Executor<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Apply the Create/Update entries of `plan`, then its orphan deletes
    pub async fn apply(&self, plan: &ProvisioningPlan) -> ApplyResult {
        let steps: Vec<&PlanStep> = plan.provisioning_steps().collect();
        let mut result = ApplyResult::default();
        let mut outputs: HashMap<LogicalId, ResourceOutputs> = HashMap::new();
        let mut failed: HashSet<&LogicalId> = HashSet::new();

        let depends_on = adjacency(plan, |edge| (&edge.from, &edge.to));
        let waves = waves(&steps, &depends_on);
        info!("Applying {} step(s) in {} wave(s)", steps.len(), waves.len());

        for wave in waves {
            let mut runnable = Vec::with_capacity(wave.len());
            for step in wave {
                let blocked_by = depends_on
                    .get(step.logical_id())
                    .and_then(|targets| targets.iter().find(|target| failed.contains(*target)));
                if let Some(blocker) = blocked_by {
                    warn!("Skipping {}: dependency {} failed", step.logical_id(), blocker);
                    failed.insert(step.logical_id());
                    result.errors.push(ResourceError {
                        logical_id: step.logical_id().clone(),
                        operation: step.operation,
                        message: format!("skipped: dependency '{blocker}' failed"),
                    });
                } else {
                    runnable.push(step);
                }
            }

            let applied = join_all(
                runnable
                    .iter()
                    .map(|step| self.apply_step(step, &outputs)),
            )
            .await;

            for (step, outcome) in runnable.into_iter().zip(applied) {
                let logical_id = step.logical_id().clone();
                match outcome {
                    Ok((outcome, resource_outputs)) => {
                        outputs.insert(logical_id.clone(), resource_outputs);
                        match outcome {
                            Outcome::Created => result.created.push(logical_id),
                            Outcome::Updated => result.updated.push(logical_id),
                            Outcome::Unchanged => result.unchanged.push(logical_id),
                        }
                    }
                    Err(message) => {
                        warn!("{} {} failed: {}", step.operation, logical_id, message);
                        failed.insert(step.logical_id());
                        result.errors.push(ResourceError {
                            logical_id,
                            operation: step.operation,
                            message,
                        });
                    }
                }
            }
        }

        let orphans: Vec<&PlanStep> = plan.orphan_deletes().collect();
        if !result.errors.is_empty() {
            if !orphans.is_empty() {
                warn!(
                    "Skipping {} delete(s): apply finished with {} error(s)",
                    orphans.len(),
                    result.errors.len()
                );
            }
            return result;
        }

        for step in orphans {
            match self.delete_step(step).await {
                Ok(()) => result.deleted.push(step.logical_id().clone()),
                Err(message) => result.errors.push(ResourceError {
                    logical_id: step.logical_id().clone(),
                    operation: Operation::Delete,
                    message,
                }),
            }
        }

        info!(
            "Apply finished: {} created, {} updated, {} unchanged, {} deleted, {} error(s)",
            result.created.len(),
            result.updated.len(),
            result.unchanged.len(),
            result.deleted.len(),
            result.errors.len()
        );
        result
    }

    /// Tear down the plan's `teardown` entries; dependents go first
    pub async fn destroy(&self, plan: &ProvisioningPlan) -> DestroyResult {
        let steps: Vec<&PlanStep> = plan.teardown.iter().collect();
        let mut result = DestroyResult {
            retained: plan.retained.clone(),
            ..DestroyResult::default()
        };
        let mut failed: HashSet<&LogicalId> = HashSet::new();

        // During teardown a node waits for everything that depends on it
        let waits_for = adjacency(plan, |edge| (&edge.to, &edge.from));
        let waves = waves(&steps, &waits_for);
        info!("Destroying {} resource(s) in {} wave(s)", steps.len(), waves.len());

        for wave in waves {
            let mut runnable = Vec::with_capacity(wave.len());
            for step in wave {
                let blocked_by = waits_for
                    .get(step.logical_id())
                    .and_then(|dependents| dependents.iter().find(|d| failed.contains(*d)));
                if let Some(blocker) = blocked_by {
                    warn!("Keeping {}: dependent {} was not deleted", step.logical_id(), blocker);
                    failed.insert(step.logical_id());
                    result.errors.push(ResourceError {
                        logical_id: step.logical_id().clone(),
                        operation: Operation::Delete,
                        message: format!("skipped: dependent '{blocker}' was not deleted"),
                    });
                } else {
                    runnable.push(step);
                }
            }

            let deleted = join_all(runnable.iter().map(|step| self.delete_step(step))).await;
            for (step, outcome) in runnable.into_iter().zip(deleted) {
                match outcome {
                    Ok(()) => result.deleted.push(step.logical_id().clone()),
                    Err(message) => {
                        warn!("delete {} failed: {}", step.logical_id(), message);
                        failed.insert(step.logical_id());
                        result.errors.push(ResourceError {
                            logical_id: step.logical_id().clone(),
                            operation: Operation::Delete,
                            message,
                        });
                    }
                }
            }
        }

        for logical_id in &result.retained {
            warn!("{} is retained and was left in place", logical_id);
        }
        info!(
            "Destroy finished: {} deleted, {} retained, {} error(s)",
            result.deleted.len(),
            result.retained.len(),
            result.errors.len()
        );
        result
    }

    async fn apply_step(
        &self,
        step: &PlanStep,
        outputs: &HashMap<LogicalId, ResourceOutputs>,
    ) -> std::result::Result<(Outcome, ResourceOutputs), String> {
        let descriptor = &step.descriptor;
        let resolved = resolve_properties(&descriptor.properties, outputs)?;

        let existing = self
            .backend
            .describe(&descriptor.logical_id)
            .await
            .map_err(|e| e.to_string())?;

        match existing {
            Some(current) if current.kind == descriptor.kind && current.properties == resolved => {
                debug!("{} is up to date", descriptor.logical_id);
                Ok((Outcome::Unchanged, current.outputs))
            }
            Some(_) => {
                debug!("{} differs from the backend; updating", descriptor.logical_id);
                let outputs = self
                    .backend
                    .update(descriptor, &resolved)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok((Outcome::Updated, outputs))
            }
            None => {
                debug!("{} does not exist; creating", descriptor.logical_id);
                let outputs = self
                    .backend
                    .create(descriptor, &resolved)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok((Outcome::Created, outputs))
            }
        }
    }

    async fn delete_step(&self, step: &PlanStep) -> std::result::Result<(), String> {
        let existing = self
            .backend
            .describe(step.logical_id())
            .await
            .map_err(|e| e.to_string())?;
        if existing.is_none() {
            debug!("{} is already gone", step.logical_id());
            return Ok(());
        }
        self.backend
            .delete(&step.descriptor)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Map each node to the nodes it must wait for, using `endpoints(edge) = (node, waits_for)`
fn adjacency<'p>(
    plan: &'p ProvisioningPlan,
    endpoints: impl Fn(&'p Dependency) -> (&'p LogicalId, &'p LogicalId),
) -> HashMap<&'p LogicalId, Vec<&'p LogicalId>> {
    let mut map: HashMap<&LogicalId, Vec<&LogicalId>> = HashMap::new();
    for edge in &plan.edges {
        let (node, waits_for) = endpoints(edge);
        map.entry(node).or_default().push(waits_for);
    }
    map
}

/// Group ordered steps into waves: a step lands one wave after the latest
/// step it waits for. Nodes outside `steps` are ignored.
fn waves<'s>(
    steps: &[&'s PlanStep],
    waits_for: &HashMap<&LogicalId, Vec<&LogicalId>>,
) -> Vec<Vec<&'s PlanStep>> {
    let mut level: HashMap<&LogicalId, usize> = HashMap::new();
    let mut grouped: BTreeMap<usize, Vec<&'s PlanStep>> = BTreeMap::new();

    for &step in steps {
        let wave = waits_for
            .get(step.logical_id())
            .into_iter()
            .flatten()
            .filter_map(|target| level.get(target))
            .map(|wave| wave + 1)
            .max()
            .unwrap_or(0);
        level.insert(step.logical_id(), wave);
        grouped.entry(wave).or_default().push(step);
    }

    grouped.into_values().collect()
}

fn resolve_properties(
    properties: &Properties,
    outputs: &HashMap<LogicalId, ResourceOutputs>,
) -> std::result::Result<serde_json::Value, String> {
    let mut resolved = serde_json::Map::new();
    for (key, value) in properties.iter() {
        resolved.insert(key.clone(), resolve_value(value, outputs)?);
    }
    Ok(serde_json::Value::Object(resolved))
}

fn resolve_value(
    value: &PropertyValue,
    outputs: &HashMap<LogicalId, ResourceOutputs>,
) -> std::result::Result<serde_json::Value, String> {
    Ok(match value {
        PropertyValue::Ref(reference) => {
            let attribute = outputs
                .get(&reference.resource)
                .and_then(|output| output.attribute(reference.attribute))
                .ok_or_else(|| format!("{reference} is not available"))?;
            serde_json::Value::String(reference.materialize(attribute))
        }
        PropertyValue::Bool(flag) => serde_json::Value::Bool(*flag),
        PropertyValue::Number(number) => serde_json::Value::Number(number.clone()),
        PropertyValue::String(text) => serde_json::Value::String(text.clone()),
        PropertyValue::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, outputs))
                .collect::<std::result::Result<_, _>>()?,
        ),
        PropertyValue::Map(entries) => {
            let mut map = serde_json::Map::new();
            for (key, entry) in entries {
                map.insert(key.clone(), resolve_value(entry, outputs)?);
            }
            serde_json::Value::Object(map)
        }
    })
}
