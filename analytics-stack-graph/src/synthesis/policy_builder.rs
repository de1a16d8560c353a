//! Deterministic policy document construction

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{ResourceRef, StatementSpec};
use crate::model::{DeferredRef, PropertyValue};

pub const POLICY_VERSION: &str = "2012-10-17";

/// Actions on catalog-level APIs that have no narrower resource ARN
pub const WILDCARD_ACTIONS: &[&str] = &[
    "athena:ListDataCatalogs",
    "athena:ListEngineVersions",
    "athena:ListWorkGroups",
    "glue:GetCatalogImportStatus",
    "lakeformation:GetDataAccess",
    "s3:ListAllMyBuckets",
];

/// Policy statement as it appears in the emitted document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub sid: String,
    pub effect: String,
    pub action: Vec<String>,
    pub resource: Vec<ResourceRef>,
}

impl Statement {
    pub fn allow(sid: impl Into<String>, action: Vec<String>, resource: Vec<ResourceRef>) -> Self {
        Self {
            sid: sid.into(),
            effect: "Allow".to_string(),
            action,
            resource,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }
}

/// Build one statement: actions sorted and de-duplicated, resources
/// de-duplicated in declaration order
pub fn build_statement(spec: &StatementSpec) -> Statement {
    let actions: BTreeSet<&String> = spec.actions.iter().collect();

    let mut resources: Vec<ResourceRef> = Vec::with_capacity(spec.resources.len());
    for resource in &spec.resources {
        if !resources.contains(resource) {
            resources.push(resource.clone());
        }
    }

    Statement::allow(
        spec.sid.clone(),
        actions.into_iter().cloned().collect(),
        resources,
    )
}

/// One statement per spec, in spec order; statements are never merged
pub fn build_document(specs: &[StatementSpec]) -> PolicyDocument {
    PolicyDocument::new(specs.iter().map(build_statement).collect())
}

/// `service:Action`, where the action may carry a trailing wildcard
pub(crate) fn is_action(action: &str) -> bool {
    let Some((service, name)) = action.split_once(':') else {
        return false;
    };
    !service.is_empty()
        && service
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '*')
}

fn resource_value(resource: &ResourceRef) -> PropertyValue {
    match resource {
        ResourceRef::Arn(pattern) => PropertyValue::from(pattern.as_str()),
        ResourceRef::Of { resource, suffix } => {
            let mut reference = DeferredRef::arn(resource.clone());
            reference.suffix = suffix.clone();
            PropertyValue::from(reference)
        }
        ResourceRef::Wildcard => PropertyValue::from("*"),
    }
}

impl From<&PolicyDocument> for PropertyValue {
    fn from(document: &PolicyDocument) -> Self {
        let statements: Vec<PropertyValue> = document
            .statement
            .iter()
            .map(|statement| {
                let mut entries = BTreeMap::new();
                entries.insert("Sid".to_string(), PropertyValue::from(statement.sid.as_str()));
                entries.insert(
                    "Effect".to_string(),
                    PropertyValue::from(statement.effect.as_str()),
                );
                entries.insert(
                    "Action".to_string(),
                    PropertyValue::from(statement.action.clone()),
                );
                entries.insert(
                    "Resource".to_string(),
                    PropertyValue::List(statement.resource.iter().map(resource_value).collect()),
                );
                PropertyValue::Map(entries)
            })
            .collect();

        let mut entries = BTreeMap::new();
        entries.insert(
            "Version".to_string(),
            PropertyValue::from(document.version.as_str()),
        );
        entries.insert("Statement".to_string(), PropertyValue::List(statements));
        PropertyValue::Map(entries)
    }
}
