//! Naming and constraint validation
//!
//! Downstream services impose their own identifier grammars. The query layer
//! in particular rejects hyphens that the source tables happily accept, which is
//! why the stack routes tables through a crawler that translates names. All
//! problems in a declaration set are collected and reported together; any
//! violation blocks compilation.

use std::collections::HashSet;
use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::model::{Declarations, LogicalId, ResourceKind};

mod config;
mod rules;

pub use config::{FieldGrammar, GrammarRegistry, NamingConfig};
pub use rules::{DefaultDatabaseRule, NamingRule, PatternRule, QueryLayerTableRule};

/// Why a field was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationReason {
    /// Literal value does not match the service grammar
    GrammarMismatch,
    /// Source table name is not a valid query-layer identifier and no crawler translates it
    RequiresNameTranslation,
    /// Database other than the configured default while the default is required
    NonDefaultDatabase,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::GrammarMismatch => "does not match grammar",
            Self::RequiresNameTranslation => "requires name translation",
            Self::NonDefaultDatabase => "is not the default database",
        };
        f.write_str(text)
    }
}

/// A single naming problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintViolation {
    pub logical_id: LogicalId,
    pub kind: ResourceKind,
    pub field: String,
    pub value: String,
    pub reason: ViolationReason,
    /// Grammar or rule that was applied
    pub rule: String,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' {} '{}' {} ({})",
            self.kind, self.logical_id, self.field, self.value, self.reason, self.rule
        )
    }
}

/// Cross-descriptor facts rules may need
#[derive(Debug, Default)]
pub struct ValidationScope {
    crawled_tables: HashSet<LogicalId>,
}

impl ValidationScope {
    /// Collect the tables some crawler holds a deferred reference to
    pub fn from_declarations(declarations: &Declarations) -> Self {
        let crawled_tables = declarations
            .iter()
            .filter(|descriptor| descriptor.kind == ResourceKind::Crawler)
            .flat_map(|crawler| crawler.properties.deferred_refs())
            .filter(|(_, reference)| {
                declarations
                    .get(&reference.resource)
                    .is_some_and(|target| target.kind == ResourceKind::Table)
            })
            .map(|(_, reference)| reference.resource.clone())
            .collect();

        Self { crawled_tables }
    }

    pub fn is_crawled(&self, table: &LogicalId) -> bool {
        self.crawled_tables.contains(table)
    }
}

/// Apply every registered rule to every descriptor and collect the violations
pub fn validate(declarations: &Declarations, registry: &GrammarRegistry) -> Vec<ConstraintViolation> {
    let scope = ValidationScope::from_declarations(declarations);
    let mut violations = Vec::new();

    for descriptor in declarations {
        for rule in registry.rules_for(descriptor.kind) {
            if let Some(violation) = rule.check(descriptor, &scope) {
                debug!("Naming violation: {}", violation);
                violations.push(violation);
            }
        }
    }

    info!(
        "Validated {} descriptors: {} violation(s)",
        declarations.len(),
        violations.len()
    );
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeferredRef, Properties, RemovalPolicy};
    use rstest::rstest;

    fn single(kind: ResourceKind, properties: Properties) -> Declarations {
        let mut declarations = Declarations::new();
        declarations
            .declare("Subject", kind, properties, RemovalPolicy::Destroy)
            .unwrap();
        declarations
    }

    #[rstest]
    #[case("athena-dynamo-db-connector", true)]
    #[case("dynamodb", true)]
    #[case("athena_db", true)]
    #[case("Athena_DB", false)]
    #[case("athena db", false)]
    #[case("", false)]
    fn test_catalog_name_grammar(#[case] name: &str, #[case] accepted: bool) {
        let declarations = single(
            ResourceKind::DataCatalog,
            Properties::new().with("name", name),
        );
        let violations = validate(&declarations, &GrammarRegistry::builtin());
        assert_eq!(violations.is_empty(), accepted, "{name}: {violations:?}");
        if !accepted {
            assert_eq!(violations[0].reason, ViolationReason::GrammarMismatch);
            assert_eq!(violations[0].field, "name");
        }
    }

    #[rstest]
    #[case("analytics", true)]
    #[case("Analytics_2024", true)]
    #[case("analytics-db", false)]
    fn test_query_layer_database_name(#[case] database: &str, #[case] accepted: bool) {
        let declarations = single(
            ResourceKind::Crawler,
            Properties::new().with("databaseName", database),
        );
        let violations = validate(&declarations, &GrammarRegistry::builtin());
        assert_eq!(violations.is_empty(), accepted, "{database}: {violations:?}");
    }

    #[test]
    fn test_hyphenated_table_requires_translation_without_crawler() {
        let declarations = single(
            ResourceKind::Table,
            Properties::new().with("name", "customer-events"),
        );
        let violations = validate(&declarations, &GrammarRegistry::builtin());

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].reason, ViolationReason::RequiresNameTranslation);
        assert_eq!(violations[0].value, "customer-events");
    }

    #[test]
    fn test_crawled_hyphenated_table_is_accepted() {
        let mut declarations = Declarations::new();
        declarations
            .declare(
                "Events",
                ResourceKind::Table,
                Properties::new().with("name", "customer-events"),
                RemovalPolicy::Retain,
            )
            .unwrap();
        declarations
            .declare(
                "TableCrawler",
                ResourceKind::Crawler,
                Properties::new()
                    .with("databaseName", "analytics")
                    .with("target", DeferredRef::name("Events")),
                RemovalPolicy::Destroy,
            )
            .unwrap();

        let violations = validate(&declarations, &GrammarRegistry::builtin());
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn test_violations_are_batched() {
        let mut declarations = Declarations::new();
        declarations
            .declare(
                "Catalog",
                ResourceKind::DataCatalog,
                Properties::new().with("name", "Athena_DB"),
                RemovalPolicy::Destroy,
            )
            .unwrap();
        declarations
            .declare(
                "Spill",
                ResourceKind::Bucket,
                Properties::new().with("name", "Spill_Bucket"),
                RemovalPolicy::Destroy,
            )
            .unwrap();
        declarations
            .declare(
                "Events",
                ResourceKind::Table,
                Properties::new().with("name", "customer-events"),
                RemovalPolicy::Destroy,
            )
            .unwrap();

        let violations = validate(&declarations, &GrammarRegistry::builtin());
        let ids: Vec<&str> = violations.iter().map(|v| v.logical_id.as_str()).collect();
        assert_eq!(ids, vec!["Catalog", "Spill", "Events"]);
    }

    #[test]
    fn test_deferred_names_are_not_checked() {
        let mut declarations = Declarations::new();
        declarations
            .declare("Function", ResourceKind::Function, Properties::new(), RemovalPolicy::Destroy)
            .unwrap();
        declarations
            .declare(
                "Catalog",
                ResourceKind::DataCatalog,
                Properties::new().with("name", DeferredRef::name("Function")),
                RemovalPolicy::Destroy,
            )
            .unwrap();

        assert!(validate(&declarations, &GrammarRegistry::builtin()).is_empty());
    }

    #[test]
    fn test_violation_display() {
        let violation = ConstraintViolation {
            logical_id: LogicalId::from("Catalog"),
            kind: ResourceKind::DataCatalog,
            field: "name".to_string(),
            value: "Athena_DB".to_string(),
            reason: ViolationReason::GrammarMismatch,
            rule: "^[a-z0-9_-]{1,64}$".to_string(),
        };
        assert_eq!(
            violation.to_string(),
            "DataCatalog 'Catalog' name 'Athena_DB' does not match grammar (^[a-z0-9_-]{1,64}$)"
        );
    }
}
