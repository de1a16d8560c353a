//! The analytics stack blueprint
//!
//! Builds the manifest for the full stack: a self-hosted BI service, the
//! source tables, a federated query layer over them (connector, catalog,
//! crawler, workgroup) and a scoped credential the BI service queries with.

use std::collections::HashSet;
use std::path::Path;

use convert_case::{Case, Casing};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::arn::ArnContext;
use crate::errors::{GraphError, Result};
use crate::manifest::{Manifest, PolicySpec};
use crate::model::{
    DeferredRef, LogicalId, Properties, RemovalPolicy, ResourceDescriptor, ResourceKind,
};
use crate::synthesis::{ResourceRef, StatementSpec};

const BI_IMAGE_DIRECTORY: &str = "./asset/business-intelligence";
const BI_IMAGE_PLATFORM: &str = "linux/amd64";
const BI_PORT: u64 = 3000;
const CONNECTOR_APPLICATION_ID: &str =
    "arn:aws:serverlessrepo:us-east-1:292517598671:applications/AthenaDynamoDBConnector";

const SERVICE: &str = "MetabaseService";
const SPILL_BUCKET: &str = "SpillBucket";
const RESULTS_BUCKET: &str = "ResultsBucket";
const CONNECTOR_APPLICATION: &str = "ConnectorApplication";
const CONNECTOR_FUNCTION: &str = "ConnectorFunction";
const CATALOG: &str = "DynamoCatalog";
const CRAWLER_ROLE: &str = "CrawlerRole";
const CRAWLER_ROLE_POLICY: &str = "CrawlerRolePolicy";
const CRAWLER: &str = "TableCrawler";
const WORKGROUP: &str = "QueryWorkGroup";
const BI_USER: &str = "MetabaseUser";
const BI_ROLE: &str = "MetabaseQueryRole";
const BI_POLICY: &str = "MetabaseQueryPolicy";

/// Parameters of the analytics stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct BlueprintConfig {
    pub context: ArnContext,
    /// Prefix of every generated provider name
    pub prefix: String,
    /// Source tables, by provider name
    pub tables: Vec<String>,
    /// Keep source tables on teardown
    pub retain_tables: bool,
    /// Database the crawler populates
    pub database_name: String,
    pub catalog_name: String,
    pub connector_function_name: String,
    pub service_name: String,
    /// Account the BI service runs in; a cross-account role is declared when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bi_account_id: Option<String>,
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        Self {
            context: ArnContext::default(),
            prefix: "analytics".to_string(),
            tables: vec!["customer-events".to_string()],
            retain_tables: true,
            database_name: "default".to_string(),
            catalog_name: "dynamodb".to_string(),
            connector_function_name: "athena-dynamo-db-connector".to_string(),
            service_name: "metabase".to_string(),
            bi_account_id: None,
        }
    }
}

impl BlueprintConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GraphError::io("read blueprint config", path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    fn check(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(GraphError::configuration("blueprint needs at least one table"));
        }
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table_logical_id(table)) {
                return Err(GraphError::configuration(format!(
                    "table '{table}' collides with another table's logical id"
                )));
            }
        }
        if let Some(account) = &self.bi_account_id {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(GraphError::configuration(format!(
                    "biAccountId '{account}' is not a 12-digit account id"
                )));
            }
        }
        Ok(())
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.prefix)
    }
}

/// `customer-events` declares as `CustomerEventsTable`
fn table_logical_id(table: &str) -> LogicalId {
    LogicalId::from(format!("{}Table", table.to_case(Case::Pascal)))
}

fn actions(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

fn resource(id: &str, kind: ResourceKind, properties: Properties) -> ResourceDescriptor {
    ResourceDescriptor::new(id, kind, properties, RemovalPolicy::Destroy)
}

/// Declare the whole analytics stack
///
/// # Errors
/// `Configuration` when the table list is empty or has colliding entries, or
/// when `bi_account_id` is not an account id.
pub fn analytics_stack(config: &BlueprintConfig) -> Result<Manifest> {
    config.check()?;
    let context = &config.context;
    let tables: Vec<LogicalId> = config.tables.iter().map(|t| table_logical_id(t)).collect();

    let mut resources = vec![resource(
        SERVICE,
        ResourceKind::Service,
        Properties::new().with("name", config.service_name.as_str()).with(
            "source",
            Properties::new()
                .with(
                    "imageAsset",
                    Properties::new()
                        .with("directory", BI_IMAGE_DIRECTORY)
                        .with("platform", BI_IMAGE_PLATFORM),
                )
                .with(
                    "imageConfiguration",
                    Properties::new().with("port", BI_PORT),
                ),
        ),
    )];

    let table_removal = if config.retain_tables {
        RemovalPolicy::Retain
    } else {
        RemovalPolicy::Destroy
    };
    for (logical_id, name) in tables.iter().zip(&config.tables) {
        resources.push(ResourceDescriptor::new(
            logical_id.clone(),
            ResourceKind::Table,
            Properties::new()
                .with("name", name.as_str())
                .with(
                    "partitionKey",
                    Properties::new().with("name", "id").with("type", "S"),
                )
                .with("billingMode", "PAY_PER_REQUEST"),
            table_removal,
        ));
    }

    resources.push(resource(
        SPILL_BUCKET,
        ResourceKind::Bucket,
        Properties::new().with("name", config.name(&format!("spill-{}", context.account))),
    ));
    resources.push(resource(
        RESULTS_BUCKET,
        ResourceKind::Bucket,
        Properties::new().with("name", config.name(&format!("results-{}", context.account))),
    ));

    resources.push(resource(
        CONNECTOR_APPLICATION,
        ResourceKind::Application,
        Properties::new()
            .with("name", config.name("dynamodb-connector"))
            .with("applicationId", CONNECTOR_APPLICATION_ID)
            .with(
                "parameters",
                Properties::new()
                    .with("AthenaCatalogName", config.connector_function_name.as_str())
                    .with("SpillBucket", DeferredRef::name(SPILL_BUCKET)),
            ),
    ));
    resources.push(resource(
        CONNECTOR_FUNCTION,
        ResourceKind::Function,
        Properties::new()
            .with("name", config.connector_function_name.as_str())
            .with("application", DeferredRef::arn(CONNECTOR_APPLICATION)),
    ));
    resources.push(resource(
        CATALOG,
        ResourceKind::DataCatalog,
        Properties::new()
            .with("name", config.catalog_name.as_str())
            .with("type", "LAMBDA")
            .with("function", DeferredRef::arn(CONNECTOR_FUNCTION)),
    ));

    resources.push(resource(
        CRAWLER_ROLE,
        ResourceKind::Role,
        Properties::new()
            .with("name", config.name("crawler-role"))
            .with("assumedBy", "glue.amazonaws.com"),
    ));
    resources.push(resource(
        CRAWLER,
        ResourceKind::Crawler,
        Properties::new()
            .with("name", config.name("table-crawler"))
            .with("role", DeferredRef::arn(CRAWLER_ROLE))
            .with("policy", DeferredRef::name(CRAWLER_ROLE_POLICY))
            .with("databaseName", config.database_name.as_str())
            .with(
                "dynamoDbTargets",
                tables
                    .iter()
                    .map(|t| DeferredRef::name(t.clone()))
                    .collect::<Vec<_>>(),
            ),
    ));
    resources.push(resource(
        WORKGROUP,
        ResourceKind::WorkGroup,
        Properties::new()
            .with("name", config.name("workgroup"))
            .with(
                "outputLocation",
                DeferredRef::url(RESULTS_BUCKET).with_suffix("/results/"),
            ),
    ));

    let bi_principal = match &config.bi_account_id {
        Some(account) => {
            debug!("Declaring cross-account query role for {account}");
            resource(
                BI_ROLE,
                ResourceKind::Role,
                Properties::new()
                    .with("name", config.name("metabase-query"))
                    .with(
                        "assumedBy",
                        format!("arn:{}:iam::{account}:root", context.partition),
                    ),
            )
        }
        None => resource(
            BI_USER,
            ResourceKind::User,
            Properties::new().with("name", config.name("metabase")),
        ),
    };
    let bi_principal_id = bi_principal.logical_id.clone();
    resources.push(bi_principal);

    let policies = vec![
        crawler_policy(config, &tables),
        query_policy(config, bi_principal_id),
    ];

    info!(
        "Blueprint declares {} resource(s) and {} policy(ies) over {} table(s)",
        resources.len(),
        policies.len(),
        tables.len()
    );
    Ok(Manifest {
        context: context.clone(),
        naming: None,
        resources,
        policies,
    })
}

fn crawler_policy(config: &BlueprintConfig, tables: &[LogicalId]) -> PolicySpec {
    let context = &config.context;
    PolicySpec {
        logical_id: LogicalId::from(CRAWLER_ROLE_POLICY),
        principal: LogicalId::from(CRAWLER_ROLE),
        policy_name: Some(config.name("crawler-policy")),
        statements: vec![
            StatementSpec::new(
                "DescribeSourceTables",
                actions(&["dynamodb:DescribeTable", "dynamodb:Scan"]),
                tables.iter().map(|t| ResourceRef::of(t.clone())).collect(),
            ),
            StatementSpec::new(
                "PopulateDatabase",
                actions(&[
                    "glue:GetDatabase",
                    "glue:GetTable",
                    "glue:CreateTable",
                    "glue:UpdateTable",
                    "glue:BatchCreatePartition",
                ]),
                vec![
                    ResourceRef::arn(context.glue_catalog_arn()),
                    ResourceRef::arn(context.glue_database_arn(&config.database_name)),
                    ResourceRef::arn(context.glue_tables_arn(&config.database_name)),
                ],
            ),
        ],
    }
}

fn query_policy(config: &BlueprintConfig, principal: LogicalId) -> PolicySpec {
    let context = &config.context;
    let glue_resources = vec![
        ResourceRef::arn(context.glue_catalog_arn()),
        ResourceRef::arn(context.glue_database_arn(&config.database_name)),
        ResourceRef::arn(context.glue_tables_arn(&config.database_name)),
    ];

    PolicySpec {
        logical_id: LogicalId::from(BI_POLICY),
        principal,
        policy_name: Some(config.name("metabase-query-policy")),
        statements: vec![
            StatementSpec::new(
                "RunQueries",
                actions(&[
                    "athena:StartQueryExecution",
                    "athena:StopQueryExecution",
                    "athena:GetQueryExecution",
                    "athena:GetQueryResults",
                    "athena:GetWorkGroup",
                ]),
                vec![ResourceRef::of(WORKGROUP)],
            ),
            StatementSpec::new(
                "ReadDataCatalog",
                actions(&["athena:GetDataCatalog"]),
                vec![ResourceRef::of(CATALOG)],
            ),
            StatementSpec::new(
                "InvokeConnector",
                actions(&["lambda:InvokeFunction"]),
                vec![ResourceRef::of(CONNECTOR_FUNCTION)],
            ),
            StatementSpec::new(
                "ReadGlueMetadata",
                actions(&[
                    "glue:GetDatabase",
                    "glue:GetDatabases",
                    "glue:GetTable",
                    "glue:GetTables",
                    "glue:GetPartition",
                    "glue:GetPartitions",
                ]),
                glue_resources,
            ),
            StatementSpec::new(
                "WriteQueryResults",
                actions(&[
                    "s3:GetBucketLocation",
                    "s3:GetObject",
                    "s3:ListBucket",
                    "s3:PutObject",
                    "s3:AbortMultipartUpload",
                ]),
                vec![
                    ResourceRef::of(RESULTS_BUCKET),
                    ResourceRef::of_with_suffix(RESULTS_BUCKET, "/*"),
                ],
            ),
            StatementSpec::new(
                "ReadSpill",
                actions(&["s3:GetBucketLocation", "s3:GetObject", "s3:ListBucket"]),
                vec![
                    ResourceRef::of(SPILL_BUCKET),
                    ResourceRef::of_with_suffix(SPILL_BUCKET, "/*"),
                ],
            ),
            StatementSpec::new(
                "ListCatalogs",
                actions(&[
                    "athena:ListDataCatalogs",
                    "athena:ListWorkGroups",
                    "athena:ListEngineVersions",
                    "s3:ListAllMyBuckets",
                ]),
                vec![ResourceRef::Wildcard],
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attribute, PropertyValue};

    fn create_test_config() -> BlueprintConfig {
        BlueprintConfig {
            tables: vec!["customer-events".to_string(), "orders".to_string()],
            ..BlueprintConfig::default()
        }
    }

    #[test]
    fn test_declares_every_stack_resource() {
        let manifest = analytics_stack(&create_test_config()).unwrap();
        let declarations = manifest.declarations().unwrap();

        for id in [
            SERVICE,
            "CustomerEventsTable",
            "OrdersTable",
            SPILL_BUCKET,
            RESULTS_BUCKET,
            CONNECTOR_APPLICATION,
            CONNECTOR_FUNCTION,
            CATALOG,
            CRAWLER_ROLE,
            CRAWLER,
            WORKGROUP,
            BI_USER,
            CRAWLER_ROLE_POLICY,
            BI_POLICY,
        ] {
            assert!(declarations.contains(id), "missing {id}");
        }
        assert!(!declarations.contains(BI_ROLE));
    }

    #[test]
    fn test_tables_are_retained_by_default() {
        let manifest = analytics_stack(&create_test_config()).unwrap();
        let table = manifest
            .resources
            .iter()
            .find(|d| d.logical_id.as_str() == "OrdersTable")
            .unwrap();
        assert!(table.is_retained());

        let config = BlueprintConfig {
            retain_tables: false,
            ..create_test_config()
        };
        let manifest = analytics_stack(&config).unwrap();
        assert!(manifest
            .resources
            .iter()
            .filter(|d| d.kind == ResourceKind::Table)
            .all(|d| !d.is_retained()));
    }

    #[test]
    fn test_service_image_asset() {
        let manifest = analytics_stack(&BlueprintConfig::default()).unwrap();
        let service = &manifest.resources[0];
        let source = service.properties.get("source").and_then(PropertyValue::as_map).unwrap();
        let asset = source["imageAsset"].as_map().unwrap();
        assert_eq!(asset["directory"].as_str(), Some("./asset/business-intelligence"));
        assert_eq!(asset["platform"].as_str(), Some("linux/amd64"));
        let image = source["imageConfiguration"].as_map().unwrap();
        assert_eq!(image["port"], PropertyValue::from(3000u64));
    }

    #[test]
    fn test_workgroup_writes_under_results_prefix() {
        let manifest = analytics_stack(&BlueprintConfig::default()).unwrap();
        let workgroup = manifest
            .resources
            .iter()
            .find(|d| d.logical_id.as_str() == WORKGROUP)
            .unwrap();
        let location = workgroup
            .properties
            .get("outputLocation")
            .and_then(PropertyValue::as_deferred)
            .unwrap();
        assert_eq!(location.resource.as_str(), RESULTS_BUCKET);
        assert_eq!(location.attribute, Attribute::Url);
        assert_eq!(location.suffix.as_deref(), Some("/results/"));
    }

    #[test]
    fn test_cross_account_role_replaces_user() {
        let config = BlueprintConfig {
            bi_account_id: Some("210987654321".to_string()),
            ..BlueprintConfig::default()
        };
        let manifest = analytics_stack(&config).unwrap();
        let declarations = manifest.declarations().unwrap();

        assert!(declarations.contains(BI_ROLE));
        assert!(!declarations.contains(BI_USER));
        let role = declarations.get(BI_ROLE).unwrap();
        assert_eq!(
            role.properties.get_str("assumedBy"),
            Some("arn:aws:iam::210987654321:root")
        );
        let policy = declarations.get(BI_POLICY).unwrap();
        assert_eq!(
            policy.properties.get_str("principalKind"),
            Some("Role")
        );
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let empty = BlueprintConfig {
            tables: Vec::new(),
            ..BlueprintConfig::default()
        };
        assert!(matches!(
            analytics_stack(&empty),
            Err(GraphError::Configuration { .. })
        ));

        let bad_account = BlueprintConfig {
            bi_account_id: Some("12345".to_string()),
            ..BlueprintConfig::default()
        };
        assert!(matches!(
            analytics_stack(&bad_account),
            Err(GraphError::Configuration { .. })
        ));

        let colliding = BlueprintConfig {
            tables: vec!["orders".to_string(), "Orders".to_string()],
            ..BlueprintConfig::default()
        };
        assert!(matches!(
            analytics_stack(&colliding),
            Err(GraphError::Configuration { .. })
        ));
    }

    #[test]
    fn test_query_policy_reads_only_glue_metadata() {
        let manifest = analytics_stack(&create_test_config()).unwrap();
        let policy = manifest
            .policies
            .iter()
            .find(|p| p.logical_id.as_str() == BI_POLICY)
            .unwrap();
        let glue = policy
            .statements
            .iter()
            .find(|s| s.sid == "ReadGlueMetadata")
            .unwrap();

        assert_eq!(glue.resources.len(), 3);
        for resource in &glue.resources {
            match resource {
                ResourceRef::Arn(arn) => assert!(arn.starts_with("arn:aws:glue:"), "{arn}"),
                other => panic!("unexpected glue resource {other:?}"),
            }
        }
    }

    #[test]
    fn test_crawler_waits_for_its_role_policy() {
        let manifest = analytics_stack(&create_test_config()).unwrap();
        let crawler = manifest
            .resources
            .iter()
            .find(|d| d.logical_id.as_str() == CRAWLER)
            .unwrap();
        let policy = crawler
            .properties
            .get("policy")
            .and_then(PropertyValue::as_deferred)
            .unwrap();
        assert_eq!(policy.resource.as_str(), CRAWLER_ROLE_POLICY);
        assert_eq!(policy.attribute, Attribute::Name);
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: BlueprintConfig =
            serde_json::from_str(r#"{"prefix": "bi", "tables": ["orders"]}"#).unwrap();
        assert_eq!(config.prefix, "bi");
        assert_eq!(config.service_name, "metabase");
        assert!(config.retain_tables);
        assert_eq!(config.bi_account_id, None);
    }
}
