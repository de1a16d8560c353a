//! Provisioning backend boundary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::model::{Attribute, LogicalId, ResourceDescriptor, ResourceKind};

/// Attributes a provisioned resource exposes to its dependents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOutputs {
    pub arn: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ResourceOutputs {
    pub fn attribute(&self, attribute: Attribute) -> Option<&str> {
        match attribute {
            Attribute::Arn => Some(&self.arn),
            Attribute::Name => Some(&self.name),
            Attribute::Url => self.url.as_deref(),
        }
    }
}

/// What the backend currently holds for a logical id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedResource {
    pub kind: ResourceKind,
    /// Properties with every deferred reference materialized
    pub properties: serde_json::Value,
    pub outputs: ResourceOutputs,
}

/// Performs the provider calls for one resource at a time
///
/// Implementations must be safe to call concurrently for resources that have
/// no dependency path between them. Retry and backoff are the backend's
/// business.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    async fn describe(&self, logical_id: &LogicalId) -> Result<Option<ProvisionedResource>>;

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &serde_json::Value,
    ) -> Result<ResourceOutputs>;

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        resolved: &serde_json::Value,
    ) -> Result<ResourceOutputs>;

    /// Remove a resource; an absent resource is not an error
    async fn delete(&self, descriptor: &ResourceDescriptor) -> Result<()>;
}
