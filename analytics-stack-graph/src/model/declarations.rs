//! Ordered declaration set

use std::collections::HashMap;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use super::{LogicalId, Properties, RemovalPolicy, ResourceDescriptor, ResourceKind};
use crate::errors::{GraphError, Result};

#[allow(clippy::unwrap_used)]
fn logical_id_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{0,254}$").unwrap())
}

/// Descriptors in declaration order, unique by logical id
///
/// Declaration order is the tie-breaker the compiler uses for every node that
/// has no ordering constraint, so it is part of the identity of a stack.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    descriptors: Vec<ResourceDescriptor>,
    positions: HashMap<LogicalId, usize>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource and return its logical id
    pub fn declare(
        &mut self,
        logical_id: impl Into<LogicalId>,
        kind: ResourceKind,
        properties: Properties,
        removal_policy: RemovalPolicy,
    ) -> Result<LogicalId> {
        self.push(ResourceDescriptor::new(
            logical_id,
            kind,
            properties,
            removal_policy,
        ))
    }

    /// Declare an already-built descriptor
    pub fn push(&mut self, descriptor: ResourceDescriptor) -> Result<LogicalId> {
        let logical_id = descriptor.logical_id.clone();
        if !logical_id_grammar().is_match(logical_id.as_str()) {
            return Err(GraphError::invalid_logical_id(
                logical_id.as_str(),
                "must start with a letter and contain only ASCII letters and digits (max 255)",
            ));
        }
        if let Some(existing) = self.get(&logical_id) {
            return Err(GraphError::duplicate_id(&logical_id, existing.kind));
        }

        debug!("Declared {} '{}'", descriptor.kind, logical_id);
        self.positions
            .insert(logical_id.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(logical_id)
    }

    pub fn get(&self, logical_id: &str) -> Option<&ResourceDescriptor> {
        self.position(logical_id).map(|index| &self.descriptors[index])
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.positions.contains_key(logical_id)
    }

    /// Declaration index of a logical id
    pub fn position(&self, logical_id: &str) -> Option<usize> {
        self.positions.get(logical_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Declared logical id most similar to `candidate`, for error messages
    pub(crate) fn closest(&self, candidate: &str) -> Option<LogicalId> {
        self.descriptors
            .iter()
            .map(|descriptor| {
                (
                    strsim::jaro_winkler(candidate, descriptor.logical_id.as_str()),
                    &descriptor.logical_id,
                )
            })
            .filter(|(score, _)| *score >= 0.8)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, id)| id.clone())
    }
}

impl<'a> IntoIterator for &'a Declarations {
    type Item = &'a ResourceDescriptor;
    type IntoIter = std::slice::Iter<'a, ResourceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.iter()
    }
}
