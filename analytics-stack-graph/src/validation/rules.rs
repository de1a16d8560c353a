//! Naming rules applied per resource kind

use std::fmt::Debug;

use regex::Regex;

use super::{ConstraintViolation, ValidationScope, ViolationReason};
use crate::model::ResourceDescriptor;

/// A single check the validator applies to descriptors of one kind
pub trait NamingRule: Debug + Send + Sync {
    /// Inspect a descriptor; `None` when it passes
    fn check(
        &self,
        descriptor: &ResourceDescriptor,
        scope: &ValidationScope,
    ) -> Option<ConstraintViolation>;
}

fn violation(
    descriptor: &ResourceDescriptor,
    field: &str,
    value: &str,
    reason: ViolationReason,
    rule: impl Into<String>,
) -> ConstraintViolation {
    ConstraintViolation {
        logical_id: descriptor.logical_id.clone(),
        kind: descriptor.kind,
        field: field.to_string(),
        value: value.to_string(),
        reason,
        rule: rule.into(),
    }
}

/// Literal field value must match a regular expression
///
/// Deferred values are skipped: they are validated on the resource they
/// originate from.
#[derive(Debug, Clone)]
pub struct PatternRule {
    field: String,
    pattern: Regex,
}

impl PatternRule {
    pub fn new(field: impl Into<String>, pattern: Regex) -> Self {
        Self {
            field: field.into(),
            pattern,
        }
    }
}

impl NamingRule for PatternRule {
    fn check(
        &self,
        descriptor: &ResourceDescriptor,
        _scope: &ValidationScope,
    ) -> Option<ConstraintViolation> {
        let value = descriptor.properties.get_str(&self.field)?;
        if self.pattern.is_match(value) {
            return None;
        }
        Some(violation(
            descriptor,
            &self.field,
            value,
            ViolationReason::GrammarMismatch,
            self.pattern.as_str(),
        ))
    }
}

/// Source table names the query layer cannot address must go through a crawler
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryLayerTableRule;

impl QueryLayerTableRule {
    pub const GRAMMAR: &'static str = "^[A-Za-z0-9_]+$";
}

impl NamingRule for QueryLayerTableRule {
    fn check(
        &self,
        descriptor: &ResourceDescriptor,
        scope: &ValidationScope,
    ) -> Option<ConstraintViolation> {
        let name = descriptor.physical_name()?;
        let addressable = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if addressable || scope.is_crawled(&descriptor.logical_id) {
            return None;
        }
        Some(violation(
            descriptor,
            descriptor.kind.name_field(),
            name,
            ViolationReason::RequiresNameTranslation,
            Self::GRAMMAR,
        ))
    }
}

/// Crawlers may only populate the configured default database
#[derive(Debug, Clone)]
pub struct DefaultDatabaseRule {
    database: String,
}

impl DefaultDatabaseRule {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }
}

impl NamingRule for DefaultDatabaseRule {
    fn check(
        &self,
        descriptor: &ResourceDescriptor,
        _scope: &ValidationScope,
    ) -> Option<ConstraintViolation> {
        let database = descriptor.properties.get_str("databaseName")?;
        if database == self.database {
            return None;
        }
        Some(violation(
            descriptor,
            "databaseName",
            database,
            ViolationReason::NonDefaultDatabase,
            format!("databaseName == \"{}\"", self.database),
        ))
    }
}
