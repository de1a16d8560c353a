//! Persisted declaration form
//!
//! A manifest is a JSON document listing resource descriptors in declaration
//! order plus the policies to synthesize for them. Policies are declared after
//! every resource, in the order they are listed.

use std::path::Path;

use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::arn::ArnContext;
use crate::errors::{GraphError, Result};
use crate::model::{Declarations, LogicalId, ResourceDescriptor};
use crate::synthesis::StatementSpec;
use crate::validation::{GrammarRegistry, NamingConfig};

/// A policy to synthesize and attach to a principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    pub logical_id: LogicalId,
    pub principal: LogicalId,
    /// Defaults to the kebab-cased logical id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    pub statements: Vec<StatementSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub context: ArnContext,
    /// Naming grammars; the built-in registry when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphError::io("read manifest", path, e))?;
        let manifest = Self::from_json(&content)
            .map_err(|e| GraphError::manifest(format!("{}: {e}", path.display())))?;
        info!(
            "Loaded manifest {} ({} resource(s), {} policy(ies))",
            path.display(),
            manifest.resources.len(),
            manifest.policies.len()
        );
        Ok(manifest)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Declare every resource in order, then synthesize and declare each policy
    pub fn declarations(&self) -> Result<Declarations> {
        let mut declarations = Declarations::new();
        for descriptor in &self.resources {
            declarations.push(descriptor.clone())?;
        }
        for policy in &self.policies {
            declarations.attach_policy(
                policy.logical_id.clone(),
                &policy.principal,
                policy.policy_name.as_deref(),
                &policy.statements,
            )?;
        }
        Ok(declarations)
    }

    /// Registry compiled from `naming`, or the built-in grammars
    pub fn naming_registry(&self) -> Result<GrammarRegistry> {
        match &self.naming {
            Some(config) => GrammarRegistry::from_config(config),
            None => Ok(GrammarRegistry::builtin()),
        }
    }

    /// JSON schema of the manifest format
    pub fn json_schema() -> Result<String> {
        Ok(serde_json::to_string_pretty(&schemars::schema_for!(Manifest))?)
    }
}
