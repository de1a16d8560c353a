//! Resource descriptor model
//!
//! Typed records for every provisionable entity of the analytics stack. A
//! descriptor is immutable once declared and is identified by its stable
//! logical id, never by anything a provider assigns.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod declarations;
mod properties;

pub use declarations::Declarations;
pub use properties::{Attribute, DeferredRef, Properties, PropertyValue};

/// Stable, declaration-time identifier of a resource descriptor
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LogicalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LogicalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Deref for LogicalId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for LogicalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Kinds of provisionable entities
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ResourceKind {
    Table,
    Bucket,
    Function,
    Role,
    Policy,
    Crawler,
    DataCatalog,
    WorkGroup,
    Application,
    User,
    Service,
}

impl ResourceKind {
    pub const ALL: [Self; 11] = [
        Self::Table,
        Self::Bucket,
        Self::Function,
        Self::Role,
        Self::Policy,
        Self::Crawler,
        Self::DataCatalog,
        Self::WorkGroup,
        Self::Application,
        Self::User,
        Self::Service,
    ];

    /// Whether a resource of this kind produces the given attribute once provisioned
    pub fn exposes(self, attribute: Attribute) -> bool {
        match attribute {
            Attribute::Arn | Attribute::Name => true,
            Attribute::Url => matches!(self, Self::Service | Self::Bucket),
        }
    }

    /// Principals are the only kinds a policy can be attached to
    pub fn is_principal(self) -> bool {
        matches!(self, Self::Role | Self::User)
    }

    /// Property holding the provider-facing name of this kind
    pub fn name_field(self) -> &'static str {
        match self {
            Self::Policy => "policyName",
            _ => "name",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Table => "Table",
            Self::Bucket => "Bucket",
            Self::Function => "Function",
            Self::Role => "Role",
            Self::Policy => "Policy",
            Self::Crawler => "Crawler",
            Self::DataCatalog => "DataCatalog",
            Self::WorkGroup => "WorkGroup",
            Self::Application => "Application",
            Self::User => "User",
            Self::Service => "Service",
        };
        f.write_str(name)
    }
}

/// Teardown behavior; never affects creation order
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
}

/// A provisionable entity as declared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub logical_id: LogicalId,
    pub kind: ResourceKind,
    /// Literal values or `{"Ref": {"resource", "attribute", "suffix"}}` markers
    #[serde(default)]
    #[schemars(with = "BTreeMap<String, serde_json::Value>")]
    pub properties: Properties,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
}

impl ResourceDescriptor {
    pub fn new(
        logical_id: impl Into<LogicalId>,
        kind: ResourceKind,
        properties: Properties,
        removal_policy: RemovalPolicy,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            properties,
            removal_policy,
        }
    }

    /// Literal provider-facing name, if the descriptor declares one
    pub fn physical_name(&self) -> Option<&str> {
        self.properties.get_str(self.kind.name_field())
    }

    pub fn is_retained(&self) -> bool {
        self.removal_policy == RemovalPolicy::Retain
    }
}
