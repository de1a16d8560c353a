//! Reference resolution
//!
//! Scans every descriptor for deferred-reference markers and turns each one into
//! a dependency edge. This is a pure function of the declaration set, so a stack
//! can be recompiled any number of times without being declared again.

use std::collections::BTreeSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::{GraphError, Result};
use crate::model::{Attribute, Declarations, LogicalId};

/// Directed edge: `from.field` is computed from `attribute` of `to`,
/// so `to` has to exist before `from`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub from: LogicalId,
    pub to: LogicalId,
    pub field: String,
    pub attribute: Attribute,
}

/// Extract one reference per deferred-reference marker
///
/// # Errors
/// `UnknownResource` when a marker names a logical id that was never declared,
/// `UnsupportedAttribute` when the target kind never produces the attribute.
pub fn resolve_references(declarations: &Declarations) -> Result<BTreeSet<Reference>> {
    let mut references = BTreeSet::new();

    for descriptor in declarations {
        for (field, deferred) in descriptor.properties.deferred_refs() {
            let Some(target) = declarations.get(&deferred.resource) else {
                return Err(GraphError::unknown_resource(
                    &descriptor.logical_id,
                    &deferred.resource,
                    field,
                    declarations.closest(&deferred.resource),
                ));
            };

            if !target.kind.exposes(deferred.attribute) {
                return Err(GraphError::UnsupportedAttribute {
                    from: descriptor.logical_id.clone(),
                    to: deferred.resource.clone(),
                    field,
                    attribute: deferred.attribute,
                    kind: target.kind,
                });
            }

            debug!(
                "{}.{} -> {}.{}",
                descriptor.logical_id, field, deferred.resource, deferred.attribute
            );
            references.insert(Reference {
                from: descriptor.logical_id.clone(),
                to: deferred.resource.clone(),
                field,
                attribute: deferred.attribute,
            });
        }
    }

    info!(
        "Resolved {} references across {} descriptors",
        references.len(),
        declarations.len()
    );
    Ok(references)
}
