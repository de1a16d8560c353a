//! Compile, apply and destroy whole stacks against the in-memory backend

use analytics_stack_graph::compiler::Operation;
use analytics_stack_graph::{
    analytics_stack, ArnContext, BlueprintConfig, Declarations, DeferredRef, Executor,
    GraphError, InMemoryBackend, LogicalId, Properties, RemovalPolicy, ResourceKind,
    ResourceRef, StackCompiler, StatementSpec,
};

fn position(order: &[&LogicalId], id: &str) -> usize {
    order
        .iter()
        .position(|candidate| candidate.as_str() == id)
        .unwrap_or_else(|| panic!("{id} missing from {order:?}"))
}

/// Bucket B, role R granted access to B through a policy, crawler C over R and table T
fn create_scenario() -> Declarations {
    let mut declarations = Declarations::new();
    declarations
        .declare(
            "B",
            ResourceKind::Bucket,
            Properties::new().with("name", "scenario-bucket"),
            RemovalPolicy::Destroy,
        )
        .unwrap();
    declarations
        .declare(
            "R",
            ResourceKind::Role,
            Properties::new()
                .with("name", "scenario-role")
                .with("assumedBy", "glue.amazonaws.com"),
            RemovalPolicy::Destroy,
        )
        .unwrap();
    declarations
        .declare(
            "T",
            ResourceKind::Table,
            Properties::new().with("name", "orders"),
            RemovalPolicy::Retain,
        )
        .unwrap();
    declarations
        .declare(
            "C",
            ResourceKind::Crawler,
            Properties::new()
                .with("name", "scenario-crawler")
                .with("role", DeferredRef::arn("R"))
                .with("databaseName", "default")
                .with("dynamoDbTargets", vec![DeferredRef::name("T")]),
            RemovalPolicy::Destroy,
        )
        .unwrap();
    declarations
        .attach_policy(
            "P",
            &LogicalId::from("R"),
            None,
            &[StatementSpec::new(
                "ReadBucket",
                vec!["s3:GetObject".to_string()],
                vec![ResourceRef::of_with_suffix("B", "/*")],
            )],
        )
        .unwrap();
    declarations
}

#[test]
fn test_scenario_create_and_delete_order() {
    let compiled = StackCompiler::builtin().compile(&create_scenario()).unwrap();
    let create = compiled.plan.create_order();
    let delete = compiled.plan.delete_order();

    assert_eq!(create.len(), 5);
    assert!(position(&create, "R") < position(&create, "C"));
    assert!(position(&create, "T") < position(&create, "C"));
    assert!(position(&create, "B") < position(&create, "P"));
    assert!(position(&create, "R") < position(&create, "P"));

    // T is retained: created, never deleted
    assert!(delete.iter().all(|id| id.as_str() != "T"));
    assert!(position(&delete, "C") < position(&delete, "R"));
    assert!(position(&delete, "P") < position(&delete, "B"));
    assert_eq!(compiled.plan.retained, vec![LogicalId::from("T")]);
}

#[test]
fn test_scenario_recompiles_identically() {
    let first = StackCompiler::builtin().compile(&create_scenario()).unwrap();
    let second = StackCompiler::builtin().compile(&create_scenario()).unwrap();

    assert_eq!(
        first.plan.to_json_pretty().unwrap(),
        second.plan.to_json_pretty().unwrap()
    );
}

#[test]
fn test_policy_on_undeclared_resource() {
    let mut declarations = create_scenario();
    let result = declarations.attach_policy(
        "Extra",
        &LogicalId::from("R"),
        None,
        &[StatementSpec::new(
            "ReadResults",
            vec!["s3:GetObject".to_string()],
            vec![ResourceRef::of("ResultsBucket")],
        )],
    );
    assert!(matches!(
        result,
        Err(GraphError::UnresolvedResourceRef { .. })
    ));
}

#[tokio::test]
async fn test_blueprint_apply_reapply_destroy() {
    let config = BlueprintConfig::default();
    let manifest = analytics_stack(&config).unwrap();
    let declarations = manifest.declarations().unwrap();
    let stack_compiler = StackCompiler::builtin();
    let compiled = stack_compiler.compile(&declarations).unwrap();

    let create = compiled.plan.create_order();
    assert!(position(&create, "CrawlerRolePolicy") < position(&create, "TableCrawler"));

    let backend = InMemoryBackend::new(config.context.clone());
    let executor = Executor::new(&backend);

    let applied = executor.apply(&compiled.plan).await;
    assert!(applied.is_success(), "errors: {:?}", applied.errors);
    assert_eq!(applied.created.len(), declarations.len());

    let workgroup = backend.get("QueryWorkGroup").await.unwrap();
    assert_eq!(
        workgroup.properties["outputLocation"],
        "s3://analytics-results-123456789012/results/"
    );
    let catalog = backend.get("DynamoCatalog").await.unwrap();
    assert_eq!(
        catalog.properties["function"],
        "arn:aws:lambda:us-east-1:123456789012:function:athena-dynamo-db-connector"
    );

    // Second run against the first plan changes nothing
    let recompiled = stack_compiler
        .compile_against(&declarations, &compiled.plan)
        .unwrap();
    assert!(recompiled
        .plan
        .steps
        .iter()
        .all(|step| step.operation == Operation::Update));
    let reapplied = executor.apply(&recompiled.plan).await;
    assert!(reapplied.is_success());
    assert_eq!(reapplied.unchanged.len(), declarations.len());
    assert!(reapplied.created.is_empty() && reapplied.updated.is_empty());

    let destroyed = executor.destroy(&compiled.plan).await;
    assert!(destroyed.is_success(), "errors: {:?}", destroyed.errors);
    assert_eq!(destroyed.retained, vec![LogicalId::from("CustomerEventsTable")]);
    assert_eq!(backend.len().await, 1);
    assert!(backend.get("CustomerEventsTable").await.is_some());
}

#[tokio::test]
async fn test_query_policy_resolves_to_concrete_arns() {
    let config = BlueprintConfig {
        bi_account_id: Some("210987654321".to_string()),
        context: ArnContext::new("aws", "eu-west-1", "111122223333"),
        ..BlueprintConfig::default()
    };
    let declarations = analytics_stack(&config).unwrap().declarations().unwrap();
    let compiled = StackCompiler::builtin().compile(&declarations).unwrap();

    let create = compiled.plan.create_order();
    for upstream in ["QueryWorkGroup", "DynamoCatalog", "ConnectorFunction", "ResultsBucket", "SpillBucket", "MetabaseQueryRole"] {
        assert!(position(&create, upstream) < position(&create, "MetabaseQueryPolicy"));
    }

    let backend = InMemoryBackend::new(config.context.clone());
    let applied = Executor::new(&backend).apply(&compiled.plan).await;
    assert!(applied.is_success(), "errors: {:?}", applied.errors);

    let policy = backend.get("MetabaseQueryPolicy").await.unwrap();
    let statements = policy.properties["document"]["Statement"].as_array().unwrap();
    let run_queries = statements
        .iter()
        .find(|statement| statement["Sid"] == "RunQueries")
        .unwrap();
    assert_eq!(
        run_queries["Resource"],
        serde_json::json!(["arn:aws:athena:eu-west-1:111122223333:workgroup/analytics-workgroup"])
    );
    assert_eq!(
        policy.properties["principal"],
        "analytics-metabase-query"
    );
}

#[tokio::test]
async fn test_failed_upstream_skips_its_dependents() {
    let declarations = create_scenario();
    let stack_compiler = StackCompiler::builtin();
    let compiled = stack_compiler.compile(&declarations).unwrap();

    let backend = InMemoryBackend::new(ArnContext::default()).with_failure("B");
    let applied = Executor::new(&backend).apply(&compiled.plan).await;

    let failed: Vec<&str> = applied.errors.iter().map(|e| e.logical_id.as_str()).collect();
    assert!(failed.contains(&"B"));
    assert!(failed.contains(&"P"));
    assert!(!failed.contains(&"C"));
    assert!(backend.get("C").await.is_some());
    assert!(backend.get("P").await.is_none());
}
