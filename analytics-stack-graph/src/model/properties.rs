//! Property values and deferred references
//!
//! Properties may hold literal values or `DeferredRef` placeholders standing in
//! for attributes (ARN, name, URL) that only exist once the upstream resource is
//! provisioned. The model never resolves them; the resolver turns them into
//! edges and the executor materializes them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::LogicalId;

/// Attribute of a provisioned resource that another resource can depend on
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Attribute {
    #[default]
    Arn,
    Name,
    Url,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Arn => "Arn",
            Self::Name => "Name",
            Self::Url => "Url",
        };
        f.write_str(name)
    }
}

/// Placeholder for an attribute of another resource
///
/// Serialized as `{"Ref": {"resource": "...", "attribute": "Arn", "suffix": "/*"}}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RefMarker", into = "RefMarker")]
pub struct DeferredRef {
    pub resource: LogicalId,
    pub attribute: Attribute,
    /// Appended verbatim when the reference is materialized
    pub suffix: Option<String>,
}

impl DeferredRef {
    pub fn new(resource: impl Into<LogicalId>, attribute: Attribute) -> Self {
        Self {
            resource: resource.into(),
            attribute,
            suffix: None,
        }
    }

    pub fn arn(resource: impl Into<LogicalId>) -> Self {
        Self::new(resource, Attribute::Arn)
    }

    pub fn name(resource: impl Into<LogicalId>) -> Self {
        Self::new(resource, Attribute::Name)
    }

    pub fn url(resource: impl Into<LogicalId>) -> Self {
        Self::new(resource, Attribute::Url)
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Concrete value once the upstream attribute is known
    pub fn materialize(&self, attribute_value: &str) -> String {
        match &self.suffix {
            Some(suffix) => format!("{attribute_value}{suffix}"),
            None => attribute_value.to_string(),
        }
    }
}

impl fmt::Display for DeferredRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.resource, self.attribute)?;
        if let Some(suffix) = &self.suffix {
            f.write_str(suffix)?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RefMarker {
    #[serde(rename = "Ref")]
    target: RefTarget,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RefTarget {
    resource: LogicalId,
    #[serde(default)]
    attribute: Attribute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suffix: Option<String>,
}

impl From<RefMarker> for DeferredRef {
    fn from(marker: RefMarker) -> Self {
        Self {
            resource: marker.target.resource,
            attribute: marker.target.attribute,
            suffix: marker.target.suffix,
        }
    }
}

impl From<DeferredRef> for RefMarker {
    fn from(reference: DeferredRef) -> Self {
        Self {
            target: RefTarget {
                resource: reference.resource,
                attribute: reference.attribute,
                suffix: reference.suffix,
            },
        }
    }
}

/// A literal or deferred property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Ref(DeferredRef),
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&DeferredRef> {
        match self {
            Self::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    fn collect_refs<'a>(&'a self, path: String, out: &mut Vec<(String, &'a DeferredRef)>) {
        match self {
            Self::Ref(reference) => out.push((path, reference)),
            Self::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    item.collect_refs(format!("{path}[{index}]"), out);
                }
            }
            Self::Map(entries) => {
                for (key, value) in entries {
                    value.collect_refs(format!("{path}.{key}"), out);
                }
            }
            Self::Bool(_) | Self::Number(_) | Self::String(_) => {}
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<DeferredRef> for PropertyValue {
    fn from(reference: DeferredRef) -> Self {
        Self::Ref(reference)
    }
}

impl From<Properties> for PropertyValue {
    fn from(properties: Properties) -> Self {
        Self::Map(properties.0)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Ordered property map of a descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// Every deferred reference with the dotted path of the field holding it
    ///
    /// Paths use map keys joined by `.` and list positions in brackets, e.g.
    /// `document.Statement[0].Resource[1]`. Order is deterministic.
    pub fn deferred_refs(&self) -> Vec<(String, &DeferredRef)> {
        let mut refs = Vec::new();
        for (key, value) in &self.0 {
            value.collect_refs(key.clone(), &mut refs);
        }
        refs
    }
}
