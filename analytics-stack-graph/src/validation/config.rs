//! Naming-grammar registry and its JSON configuration

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::rules::{DefaultDatabaseRule, NamingRule, PatternRule, QueryLayerTableRule};
use crate::errors::{GraphError, Result};
use crate::model::ResourceKind;

/// Grammar for one field of one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldGrammar {
    pub kind: ResourceKind,
    pub field: String,
    /// Regular expression the literal value must match in full
    pub pattern: String,
}

impl FieldGrammar {
    pub fn new(kind: ResourceKind, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            pattern: pattern.into(),
        }
    }
}

/// Injected naming configuration
///
/// Downstream services can add grammars here without touching the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct NamingConfig {
    pub grammars: Vec<FieldGrammar>,
    /// Flag query-layer tables that would need a crawler to be addressable
    pub translate_table_names: bool,
    /// Only allow crawlers to populate `default_database_name`
    pub require_default_database: bool,
    pub default_database_name: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        use ResourceKind::{
            Bucket, Crawler, DataCatalog, Function, Policy, Role, Service, Table, User, WorkGroup,
        };

        let grammars = vec![
            FieldGrammar::new(DataCatalog, "name", r"^[a-z0-9_-]{1,64}$"),
            FieldGrammar::new(Crawler, "databaseName", r"^[A-Za-z0-9_]{1,255}$"),
            FieldGrammar::new(Crawler, "name", r"^[A-Za-z0-9_.-]{1,255}$"),
            FieldGrammar::new(Table, "name", r"^[A-Za-z0-9_.-]{3,255}$"),
            FieldGrammar::new(Bucket, "name", r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$"),
            FieldGrammar::new(Function, "name", r"^[A-Za-z0-9_-]{1,64}$"),
            FieldGrammar::new(Role, "name", r"^[A-Za-z0-9+=,.@_-]{1,64}$"),
            FieldGrammar::new(User, "name", r"^[A-Za-z0-9+=,.@_-]{1,64}$"),
            FieldGrammar::new(Policy, "policyName", r"^[A-Za-z0-9+=,.@_-]{1,128}$"),
            FieldGrammar::new(WorkGroup, "name", r"^[A-Za-z0-9._-]{1,128}$"),
            FieldGrammar::new(Service, "name", r"^[A-Za-z0-9][A-Za-z0-9_-]{3,39}$"),
        ];

        Self {
            grammars,
            translate_table_names: true,
            require_default_database: false,
            default_database_name: "default".to_string(),
        }
    }
}

impl NamingConfig {
    /// Read a naming configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphError::io("read naming config", path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Per-kind naming rules consumed by the validator
#[derive(Debug, Default)]
pub struct GrammarRegistry {
    rules: BTreeMap<ResourceKind, Vec<Box<dyn NamingRule>>>,
}

impl GrammarRegistry {
    /// Registry with no rules at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a naming configuration
    ///
    /// # Errors
    /// `Configuration` when a pattern is not a valid regular expression.
    pub fn from_config(config: &NamingConfig) -> Result<Self> {
        let mut registry = Self::empty();

        for grammar in &config.grammars {
            let pattern = Regex::new(&grammar.pattern).map_err(|e| {
                GraphError::configuration(format!(
                    "invalid grammar for {}.{}: {e}",
                    grammar.kind, grammar.field
                ))
            })?;
            registry.register(grammar.kind, PatternRule::new(&grammar.field, pattern));
        }

        if config.translate_table_names {
            registry.register(ResourceKind::Table, QueryLayerTableRule);
        }
        if config.require_default_database {
            registry.register(
                ResourceKind::Crawler,
                DefaultDatabaseRule::new(&config.default_database_name),
            );
        }

        debug!(
            "Compiled naming registry: {} rule(s) over {} kind(s)",
            registry.rules.values().map(Vec::len).sum::<usize>(),
            registry.rules.len()
        );
        Ok(registry)
    }

    /// The built-in grammars
    #[allow(clippy::expect_used)]
    pub fn builtin() -> Self {
        Self::from_config(&NamingConfig::default()).expect("built-in grammars are valid")
    }

    /// Add a rule for a kind; rules run in registration order
    pub fn register(&mut self, kind: ResourceKind, rule: impl NamingRule + 'static) {
        self.rules.entry(kind).or_default().push(Box::new(rule));
    }

    pub fn rules_for(&self, kind: ResourceKind) -> impl Iterator<Item = &dyn NamingRule> {
        self.rules
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|rule| rule.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Declarations, Properties, RemovalPolicy};
    use crate::validation::{validate, ViolationReason};

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let config = NamingConfig {
            grammars: vec![FieldGrammar::new(ResourceKind::Bucket, "name", "^[a-z")],
            ..NamingConfig::default()
        };
        match GrammarRegistry::from_config(&config) {
            Err(GraphError::Configuration { message }) => {
                assert!(message.contains("Bucket.name"), "{message}");
            }
            other => panic!("Expected Configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_default_database_restriction_is_opt_in() {
        let mut declarations = Declarations::new();
        declarations
            .declare(
                "TableCrawler",
                ResourceKind::Crawler,
                Properties::new().with("databaseName", "analytics"),
                RemovalPolicy::Destroy,
            )
            .unwrap();

        assert!(validate(&declarations, &GrammarRegistry::builtin()).is_empty());

        let strict = NamingConfig {
            require_default_database: true,
            ..NamingConfig::default()
        };
        let violations = validate(
            &declarations,
            &GrammarRegistry::from_config(&strict).unwrap(),
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].reason, ViolationReason::NonDefaultDatabase);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: NamingConfig =
            serde_json::from_str(r#"{"requireDefaultDatabase": true}"#).unwrap();
        assert!(config.require_default_database);
        assert_eq!(config.default_database_name, "default");
        assert_eq!(config.grammars, NamingConfig::default().grammars);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("naming.json");
        std::fs::write(
            &path,
            r#"{"grammars": [{"kind": "Bucket", "field": "name", "pattern": "^[a-z]+$"}]}"#,
        )
        .unwrap();

        let config = NamingConfig::load(&path).unwrap();
        assert_eq!(config.grammars.len(), 1);
        assert!(config.translate_table_names);
    }

    #[test]
    fn test_empty_registry_accepts_everything() {
        let registry = GrammarRegistry::empty();
        assert_eq!(registry.rules_for(ResourceKind::DataCatalog).count(), 0);
    }
}
