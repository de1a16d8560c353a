//! Least-privilege policy synthesis
//!
//! Turns a principal and a list of statements into a Policy descriptor whose
//! document names upstream resources through deferred ARN references. The
//! resolver then sees one edge per named resource, so the policy always
//! compiles after everything it grants access to.

use convert_case::{Case, Casing};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::{GraphError, Result};
use crate::model::{
    Declarations, DeferredRef, LogicalId, Properties, PropertyValue, RemovalPolicy,
    ResourceDescriptor, ResourceKind,
};

pub mod policy_builder;

pub use policy_builder::{build_document, build_statement, PolicyDocument, Statement, WILDCARD_ACTIONS};

/// Resource a statement grants access to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ResourceRefRepr", into = "ResourceRefRepr")]
pub enum ResourceRef {
    /// Concrete ARN pattern
    Arn(String),
    /// ARN of a declared resource, optionally with a suffix such as `/*`
    Of {
        resource: LogicalId,
        suffix: Option<String>,
    },
    /// Unscoped `*`, only for catalog-level actions
    Wildcard,
}

impl ResourceRef {
    pub fn arn(pattern: impl Into<String>) -> Self {
        Self::Arn(pattern.into())
    }

    pub fn of(resource: impl Into<LogicalId>) -> Self {
        Self::Of {
            resource: resource.into(),
            suffix: None,
        }
    }

    pub fn of_with_suffix(resource: impl Into<LogicalId>, suffix: impl Into<String>) -> Self {
        Self::Of {
            resource: resource.into(),
            suffix: Some(suffix.into()),
        }
    }
}

/// Manifest form: `"*"`, an ARN string, or `{"of": "LogicalId", "suffix": "/*"}`
#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
enum ResourceRefRepr {
    Pattern(String),
    Of {
        of: LogicalId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
}

impl From<ResourceRefRepr> for ResourceRef {
    fn from(repr: ResourceRefRepr) -> Self {
        match repr {
            ResourceRefRepr::Pattern(pattern) if pattern == "*" => Self::Wildcard,
            ResourceRefRepr::Pattern(pattern) => Self::Arn(pattern),
            ResourceRefRepr::Of { of, suffix } => Self::Of {
                resource: of,
                suffix,
            },
        }
    }
}

impl From<ResourceRef> for ResourceRefRepr {
    fn from(reference: ResourceRef) -> Self {
        match reference {
            ResourceRef::Arn(pattern) => Self::Pattern(pattern),
            ResourceRef::Of { resource, suffix } => Self::Of {
                of: resource,
                suffix,
            },
            ResourceRef::Wildcard => Self::Pattern("*".to_string()),
        }
    }
}

/// Requested grant before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatementSpec {
    pub sid: String,
    pub actions: Vec<String>,
    #[schemars(with = "Vec<ResourceRefRepr>")]
    pub resources: Vec<ResourceRef>,
}

impl StatementSpec {
    pub fn new(sid: impl Into<String>, actions: Vec<String>, resources: Vec<ResourceRef>) -> Self {
        Self {
            sid: sid.into(),
            actions,
            resources,
        }
    }
}

/// Provider-facing policy name derived from the policy's logical id
pub fn default_policy_name(policy_id: &LogicalId) -> String {
    policy_id.as_str().to_case(Case::Kebab)
}

/// Build a Policy descriptor attaching `statements` to `principal`
///
/// # Errors
/// `InvalidPolicy` when the principal is not a declared Role or User or a
/// statement is not least-privilege; `UnresolvedResourceRef` when a statement
/// names a logical id that is not declared.
pub fn synthesize(
    policy_id: impl Into<LogicalId>,
    principal: &LogicalId,
    policy_name: Option<&str>,
    statements: &[StatementSpec],
    declarations: &Declarations,
) -> Result<ResourceDescriptor> {
    let policy_id = policy_id.into();

    let principal_kind = match declarations.get(principal) {
        Some(descriptor) if descriptor.kind.is_principal() => descriptor.kind,
        Some(descriptor) => {
            return Err(GraphError::invalid_policy(
                &policy_id,
                format!(
                    "principal '{principal}' is a {}, expected Role or User",
                    descriptor.kind
                ),
            ))
        }
        None => {
            return Err(GraphError::invalid_policy(
                &policy_id,
                format!("principal '{principal}' is not declared"),
            ))
        }
    };

    if statements.is_empty() {
        return Err(GraphError::invalid_policy(&policy_id, "no statements"));
    }

    let mut seen_sids: Vec<&str> = Vec::with_capacity(statements.len());
    for statement in statements {
        check_statement(&policy_id, statement, declarations)?;
        if seen_sids.contains(&statement.sid.as_str()) {
            return Err(GraphError::invalid_policy(
                &policy_id,
                format!("duplicate sid '{}'", statement.sid),
            ));
        }
        seen_sids.push(&statement.sid);
    }

    let document = build_document(statements);
    let policy_name = policy_name.map_or_else(|| default_policy_name(&policy_id), str::to_string);
    debug!(
        "Synthesized {} ({} statement(s)) for {} '{}'",
        policy_id,
        document.statement.len(),
        principal_kind,
        principal
    );

    let properties = Properties::new()
        .with("policyName", policy_name)
        .with("principal", DeferredRef::name(principal.clone()))
        .with("principalKind", principal_kind.to_string())
        .with("document", PropertyValue::from(&document));

    Ok(ResourceDescriptor::new(
        policy_id,
        ResourceKind::Policy,
        properties,
        RemovalPolicy::Destroy,
    ))
}

fn check_statement(
    policy_id: &LogicalId,
    statement: &StatementSpec,
    declarations: &Declarations,
) -> Result<()> {
    let sid = &statement.sid;
    if sid.is_empty() || !sid.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GraphError::invalid_policy(
            policy_id,
            format!("sid '{sid}' must be non-empty and alphanumeric"),
        ));
    }
    if statement.actions.is_empty() {
        return Err(GraphError::invalid_policy(
            policy_id,
            format!("statement '{sid}' has no actions"),
        ));
    }
    if let Some(action) = statement
        .actions
        .iter()
        .find(|action| !policy_builder::is_action(action))
    {
        return Err(GraphError::invalid_policy(
            policy_id,
            format!("statement '{sid}' action '{action}' is not of the form service:Action"),
        ));
    }
    if statement.resources.is_empty() {
        return Err(GraphError::invalid_policy(
            policy_id,
            format!("statement '{sid}' has no resources"),
        ));
    }

    for resource in &statement.resources {
        match resource {
            ResourceRef::Arn(pattern) if !pattern.starts_with("arn:") => {
                return Err(GraphError::invalid_policy(
                    policy_id,
                    format!("statement '{sid}' resource '{pattern}' is not an ARN"),
                ));
            }
            ResourceRef::Arn(_) => {}
            ResourceRef::Of { resource, .. } => {
                if !declarations.contains(resource) {
                    return Err(GraphError::unresolved_resource_ref(policy_id, sid, resource));
                }
            }
            ResourceRef::Wildcard => {
                if let Some(action) = statement
                    .actions
                    .iter()
                    .find(|action| !WILDCARD_ACTIONS.contains(&action.as_str()))
                {
                    return Err(GraphError::invalid_policy(
                        policy_id,
                        format!(
                            "statement '{sid}' grants '{action}' on '*'; only catalog-level actions may use the wildcard"
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}

impl Declarations {
    /// Synthesize a policy for `principal` and declare it
    pub fn attach_policy(
        &mut self,
        policy_id: impl Into<LogicalId>,
        principal: &LogicalId,
        policy_name: Option<&str>,
        statements: &[StatementSpec],
    ) -> Result<LogicalId> {
        let descriptor = synthesize(policy_id, principal, policy_name, statements, self)?;
        self.push(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::model::Properties;
    use crate::resolver::resolve_references;

    fn create_test_declarations() -> Declarations {
        let mut declarations = Declarations::new();
        for (id, kind) in [
            ("ResultsBucket", ResourceKind::Bucket),
            ("QueryRole", ResourceKind::Role),
            ("QueryWorkGroup", ResourceKind::WorkGroup),
        ] {
            declarations
                .declare(id, kind, Properties::new(), RemovalPolicy::Destroy)
                .unwrap();
        }
        declarations
    }

    fn statement(sid: &str, actions: &[&str], resources: Vec<ResourceRef>) -> StatementSpec {
        StatementSpec::new(sid, actions.iter().map(|a| a.to_string()).collect(), resources)
    }

    fn expect_invalid(result: Result<ResourceDescriptor>, fragment: &str) {
        match result {
            Err(GraphError::InvalidPolicy { message, .. }) => {
                assert!(message.contains(fragment), "'{message}' should mention '{fragment}'");
            }
            other => panic!("Expected InvalidPolicy, got {:?}", other),
        }
    }

    #[test]
    fn test_policy_compiles_after_its_resources() {
        let mut declarations = Declarations::new();
        declarations
            .declare("QueryRole", ResourceKind::Role, Properties::new(), RemovalPolicy::Destroy)
            .unwrap();
        let policy = synthesize(
            "QueryPolicy",
            &LogicalId::from("QueryRole"),
            None,
            &[statement(
                "WriteResults",
                &["s3:PutObject"],
                vec![ResourceRef::of_with_suffix("ResultsBucket", "/*")],
            )],
            &declarations,
        );
        // The bucket is declared after the policy would be; synthesis needs it first
        assert!(matches!(
            policy,
            Err(GraphError::UnresolvedResourceRef { .. })
        ));

        declarations
            .declare("ResultsBucket", ResourceKind::Bucket, Properties::new(), RemovalPolicy::Destroy)
            .unwrap();
        declarations
            .attach_policy(
                "QueryPolicy",
                &LogicalId::from("QueryRole"),
                None,
                &[statement(
                    "WriteResults",
                    &["s3:PutObject"],
                    vec![ResourceRef::of_with_suffix("ResultsBucket", "/*")],
                )],
            )
            .unwrap();

        let references = resolve_references(&declarations).unwrap();
        let plan = compile(&declarations, &references).unwrap();
        let order: Vec<&str> = plan.create_order().into_iter().map(|id| id.as_str()).collect();
        assert_eq!(order, vec!["QueryRole", "ResultsBucket", "QueryPolicy"]);

        let targets: Vec<(&str, &str)> = references
            .iter()
            .map(|r| (r.to.as_str(), r.field.as_str()))
            .collect();
        assert!(targets.contains(&("QueryRole", "principal")));
        assert!(targets.contains(&("ResultsBucket", "document.Statement[0].Resource[0]")));
    }

    #[test]
    fn test_descriptor_properties() {
        let declarations = create_test_declarations();
        let descriptor = synthesize(
            "MetabaseQueryPolicy",
            &LogicalId::from("QueryRole"),
            None,
            &[statement(
                "RunQueries",
                &["athena:StartQueryExecution", "athena:GetQueryResults"],
                vec![ResourceRef::of("QueryWorkGroup")],
            )],
            &declarations,
        )
        .unwrap();

        assert_eq!(descriptor.kind, ResourceKind::Policy);
        assert_eq!(descriptor.physical_name(), Some("metabase-query-policy"));
        assert_eq!(descriptor.properties.get_str("principalKind"), Some("Role"));

        let document = serde_json::to_value(descriptor.properties.get("document").unwrap()).unwrap();
        assert_eq!(
            document["Statement"][0]["Action"],
            serde_json::json!(["athena:GetQueryResults", "athena:StartQueryExecution"])
        );
    }

    #[test]
    fn test_unknown_resource_is_unresolved_ref() {
        let declarations = create_test_declarations();
        let result = synthesize(
            "QueryPolicy",
            &LogicalId::from("QueryRole"),
            None,
            &[statement("Read", &["s3:GetObject"], vec![ResourceRef::of("SpillBucket")])],
            &declarations,
        );
        match result {
            Err(GraphError::UnresolvedResourceRef { sid, resource, .. }) => {
                assert_eq!(sid, "Read");
                assert_eq!(resource.as_str(), "SpillBucket");
            }
            other => panic!("Expected UnresolvedResourceRef, got {:?}", other),
        }
    }

    #[test]
    fn test_wildcard_only_for_catalog_level_actions() {
        let declarations = create_test_declarations();
        let principal = LogicalId::from("QueryRole");

        let allowed = synthesize(
            "ListPolicy",
            &principal,
            None,
            &[statement(
                "ListCatalogs",
                &["athena:ListDataCatalogs", "athena:ListWorkGroups"],
                vec![ResourceRef::Wildcard],
            )],
            &declarations,
        );
        assert!(allowed.is_ok());

        expect_invalid(
            synthesize(
                "WidePolicy",
                &principal,
                None,
                &[statement(
                    "ReadAll",
                    &["athena:ListDataCatalogs", "s3:GetObject"],
                    vec![ResourceRef::Wildcard],
                )],
                &declarations,
            ),
            "s3:GetObject",
        );
    }

    #[test]
    fn test_statement_shape_errors() {
        let declarations = create_test_declarations();
        let principal = LogicalId::from("QueryRole");
        let bucket = || vec![ResourceRef::of("ResultsBucket")];

        let cases = vec![
            (vec![statement("", &["s3:GetObject"], bucket())], "sid"),
            (vec![statement("Read", &[], bucket())], "no actions"),
            (vec![statement("Read", &["GetObject"], bucket())], "service:Action"),
            (vec![statement("Read", &["s3:GetObject"], vec![])], "no resources"),
            (
                vec![statement("Read", &["s3:GetObject"], vec![ResourceRef::arn("bucket/*")])],
                "not an ARN",
            ),
            (
                vec![
                    statement("Read", &["s3:GetObject"], bucket()),
                    statement("Read", &["s3:PutObject"], bucket()),
                ],
                "duplicate sid",
            ),
            (vec![], "no statements"),
        ];

        for (statements, fragment) in cases {
            expect_invalid(
                synthesize("QueryPolicy", &principal, None, &statements, &declarations),
                fragment,
            );
        }
    }

    #[test]
    fn test_principal_must_be_role_or_user() {
        let declarations = create_test_declarations();
        expect_invalid(
            synthesize(
                "BucketPolicy",
                &LogicalId::from("ResultsBucket"),
                None,
                &[statement("Read", &["s3:GetObject"], vec![ResourceRef::of("ResultsBucket")])],
                &declarations,
            ),
            "expected Role or User",
        );
        expect_invalid(
            synthesize(
                "GhostPolicy",
                &LogicalId::from("GhostRole"),
                None,
                &[statement("Read", &["s3:GetObject"], vec![ResourceRef::of("ResultsBucket")])],
                &declarations,
            ),
            "not declared",
        );
    }

    #[test]
    fn test_resource_ref_manifest_form() {
        let refs: Vec<ResourceRef> = serde_json::from_value(serde_json::json!([
            "*",
            "arn:aws:glue:us-east-1:123456789012:catalog",
            {"of": "ResultsBucket", "suffix": "/*"},
            {"of": "QueryWorkGroup"}
        ]))
        .unwrap();

        assert_eq!(
            refs,
            vec![
                ResourceRef::Wildcard,
                ResourceRef::arn("arn:aws:glue:us-east-1:123456789012:catalog"),
                ResourceRef::of_with_suffix("ResultsBucket", "/*"),
                ResourceRef::of("QueryWorkGroup"),
            ]
        );
    }

    #[test]
    fn test_explicit_policy_name() {
        let declarations = create_test_declarations();
        let descriptor = synthesize(
            "QueryPolicy",
            &LogicalId::from("QueryRole"),
            Some("bi-query-access"),
            &[statement("Run", &["athena:StartQueryExecution"], vec![ResourceRef::of("QueryWorkGroup")])],
            &declarations,
        )
        .unwrap();
        assert_eq!(descriptor.physical_name(), Some("bi-query-access"));
    }
}
