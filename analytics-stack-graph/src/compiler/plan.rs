//! Provisioning plan emitted by the compiler

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{GraphError, Result};
use crate::model::{LogicalId, ResourceDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// One-character marker used in plan listings
    pub fn symbol(self) -> char {
        match self {
            Self::Create => '+',
            Self::Update => '~',
            Self::Delete => '-',
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub operation: Operation,
    pub descriptor: ResourceDescriptor,
}

impl PlanStep {
    pub fn new(operation: Operation, descriptor: ResourceDescriptor) -> Self {
        Self {
            operation,
            descriptor,
        }
    }

    pub fn logical_id(&self) -> &LogicalId {
        &self.descriptor.logical_id
    }
}

/// `from` cannot be provisioned before `to`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub from: LogicalId,
    pub to: LogicalId,
}

/// Ordered, validated provisioning operations
///
/// `steps` holds Create/Update entries in dependency order followed by Delete
/// entries for resources that are no longer declared. `teardown` is the
/// reverse order used to destroy the whole stack, with retained resources
/// moved to `retained`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    pub steps: Vec<PlanStep>,
    pub teardown: Vec<PlanStep>,
    pub retained: Vec<LogicalId>,
    pub edges: Vec<Dependency>,
}

impl ProvisioningPlan {
    /// Logical ids in Create/Update order
    pub fn create_order(&self) -> Vec<&LogicalId> {
        self.steps
            .iter()
            .filter(|step| step.operation != Operation::Delete)
            .map(PlanStep::logical_id)
            .collect()
    }

    /// Logical ids in teardown order
    pub fn delete_order(&self) -> Vec<&LogicalId> {
        self.teardown.iter().map(PlanStep::logical_id).collect()
    }

    /// Create/Update steps
    pub fn provisioning_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps
            .iter()
            .filter(|step| step.operation != Operation::Delete)
    }

    /// Delete steps for resources dropped from the declarations
    pub fn orphan_deletes(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps
            .iter()
            .filter(|step| step.operation == Operation::Delete)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a previously emitted plan
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphError::io("read plan", path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}
