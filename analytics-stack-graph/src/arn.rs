//! ARN rendering for declared resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::ResourceKind;

/// Partition, region and account used to render resource ARNs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArnContext {
    pub partition: String,
    pub region: String,
    pub account: String,
}

impl Default for ArnContext {
    fn default() -> Self {
        Self::new("aws", "us-east-1", "123456789012")
    }
}

impl ArnContext {
    pub fn new(
        partition: impl Into<String>,
        region: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            partition: partition.into(),
            region: region.into(),
            account: account.into(),
        }
    }

    /// ARN of a resource of `kind` with the given physical name
    pub fn arn_for(&self, kind: ResourceKind, name: &str) -> String {
        let Self {
            partition: p,
            region: r,
            account: a,
        } = self;
        match kind {
            ResourceKind::Bucket => format!("arn:{p}:s3:::{name}"),
            ResourceKind::Table => format!("arn:{p}:dynamodb:{r}:{a}:table/{name}"),
            ResourceKind::Function => format!("arn:{p}:lambda:{r}:{a}:function:{name}"),
            ResourceKind::Role => format!("arn:{p}:iam::{a}:role/{name}"),
            ResourceKind::Policy => format!("arn:{p}:iam::{a}:policy/{name}"),
            ResourceKind::User => format!("arn:{p}:iam::{a}:user/{name}"),
            ResourceKind::Crawler => format!("arn:{p}:glue:{r}:{a}:crawler/{name}"),
            ResourceKind::DataCatalog => format!("arn:{p}:athena:{r}:{a}:datacatalog/{name}"),
            ResourceKind::WorkGroup => format!("arn:{p}:athena:{r}:{a}:workgroup/{name}"),
            ResourceKind::Application => {
                format!("arn:{p}:serverlessrepo:{r}:{a}:applications/{name}")
            }
            ResourceKind::Service => format!("arn:{p}:apprunner:{r}:{a}:service/{name}"),
        }
    }

    /// URL of a resource, for the kinds that expose one
    pub fn url_for(&self, kind: ResourceKind, name: &str) -> Option<String> {
        match kind {
            ResourceKind::Bucket => Some(format!("s3://{name}")),
            ResourceKind::Service => Some(format!("https://{name}.{}.awsapprunner.com", self.region)),
            _ => None,
        }
    }

    /// ARN of the account's glue data catalog
    pub fn glue_catalog_arn(&self) -> String {
        format!("arn:{}:glue:{}:{}:catalog", self.partition, self.region, self.account)
    }

    pub fn glue_database_arn(&self, database: &str) -> String {
        format!(
            "arn:{}:glue:{}:{}:database/{database}",
            self.partition, self.region, self.account
        )
    }

    /// Pattern covering every table of a glue database
    pub fn glue_tables_arn(&self, database: &str) -> String {
        format!(
            "arn:{}:glue:{}:{}:table/{database}/*",
            self.partition, self.region, self.account
        )
    }
}
