//! Local reference backend
//!
//! Keeps provisioned resources in memory, optionally persisted to a JSON
//! state file between runs. ARNs and URLs are rendered from an [`ArnContext`].

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use convert_case::{Case, Casing};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::backend::{ProvisionedResource, ProvisioningBackend, ResourceOutputs};
use crate::arn::ArnContext;
use crate::compiler::Operation;
use crate::errors::{GraphError, Result};
use crate::model::{LogicalId, ResourceDescriptor};

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackendState {
    resources: BTreeMap<LogicalId, ProvisionedResource>,
}

#[derive(Debug)]
pub struct InMemoryBackend {
    context: ArnContext,
    resources: Mutex<BTreeMap<LogicalId, ProvisionedResource>>,
    operations: Mutex<Vec<(Operation, LogicalId)>>,
    failures: HashSet<LogicalId>,
}

impl InMemoryBackend {
    pub fn new(context: ArnContext) -> Self {
        Self {
            context,
            resources: Mutex::new(BTreeMap::new()),
            operations: Mutex::new(Vec::new()),
            failures: HashSet::new(),
        }
    }

    /// Every create, update or delete of `logical_id` fails
    #[must_use]
    pub fn with_failure(mut self, logical_id: impl Into<LogicalId>) -> Self {
        self.failures.insert(logical_id.into());
        self
    }

    /// Restore a backend from a state file; a missing file is an empty state
    pub async fn load(path: &Path, context: ArnContext) -> Result<Self> {
        let backend = Self::new(context);
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state at {}, starting empty", path.display());
                return Ok(backend);
            }
            Err(e) => return Err(GraphError::io("read state", path, e)),
        };

        let state: BackendState = serde_json::from_str(&content)?;
        info!(
            "Loaded {} resource(s) from {}",
            state.resources.len(),
            path.display()
        );
        *backend.resources.lock().await = state.resources;
        Ok(backend)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let state = BackendState {
            resources: self.resources.lock().await.clone(),
        };
        let content = serde_json::to_string_pretty(&state)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| GraphError::io("write state", path, e))?;
        info!(
            "Saved {} resource(s) to {}",
            state.resources.len(),
            path.display()
        );
        Ok(())
    }

    /// Mutating calls in the order they happened
    pub async fn operations(&self) -> Vec<(Operation, LogicalId)> {
        self.operations.lock().await.clone()
    }

    pub async fn get(&self, logical_id: &str) -> Option<ProvisionedResource> {
        self.resources.lock().await.get(logical_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.resources.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.lock().await.is_empty()
    }

    async fn record(&self, operation: Operation, descriptor: &ResourceDescriptor) -> Result<()> {
        self.operations
            .lock()
            .await
            .push((operation, descriptor.logical_id.clone()));
        if self.failures.contains(&descriptor.logical_id) {
            return Err(GraphError::backend(format!(
                "{operation} of {} '{}' rejected",
                descriptor.kind, descriptor.logical_id
            )));
        }
        Ok(())
    }

    fn outputs(&self, descriptor: &ResourceDescriptor, resolved: &serde_json::Value) -> ResourceOutputs {
        let name = resolved
            .get(descriptor.kind.name_field())
            .and_then(serde_json::Value::as_str)
            .map_or_else(
                || descriptor.logical_id.as_str().to_case(Case::Kebab),
                str::to_string,
            );
        ResourceOutputs {
            arn: self.context.arn_for(descriptor.kind, &name),
            url: self.context.url_for(descriptor.kind, &name),
            name,
        }
    }

    async fn store(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &serde_json::Value,
    ) -> ResourceOutputs {
        let outputs = self.outputs(descriptor, resolved);
        self.resources.lock().await.insert(
            descriptor.logical_id.clone(),
            ProvisionedResource {
                kind: descriptor.kind,
                properties: resolved.clone(),
                outputs: outputs.clone(),
            },
        );
        outputs
    }
}

#[async_trait]
impl ProvisioningBackend for InMemoryBackend {
    async fn describe(&self, logical_id: &LogicalId) -> Result<Option<ProvisionedResource>> {
        Ok(self.get(logical_id).await)
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &serde_json::Value,
    ) -> Result<ResourceOutputs> {
        self.record(Operation::Create, descriptor).await?;
        Ok(self.store(descriptor, resolved).await)
    }

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &serde_json::Value,
    ) -> Result<ResourceOutputs> {
        self.record(Operation::Update, descriptor).await?;
        Ok(self.store(descriptor, resolved).await)
    }

    async fn delete(&self, descriptor: &ResourceDescriptor) -> Result<()> {
        self.record(Operation::Delete, descriptor).await?;
        self.resources.lock().await.remove(&descriptor.logical_id);
        Ok(())
    }
}
