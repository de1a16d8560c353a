//! Error types for the analytics stack graph compiler
//!
//! Every compile-time failure is surfaced through [`GraphError`] before any
//! backend call is made. Naming violations are the only accumulated failure;
//! everything else stops compilation on first occurrence.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Attribute, LogicalId, ResourceKind};
use crate::validation::ConstraintViolation;

/// Result type alias for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while declaring, resolving, validating or compiling a stack
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// Two descriptors share the same logical id
    #[error("Duplicate logical id '{logical_id}': already declared as {existing}")]
    DuplicateId {
        logical_id: LogicalId,
        existing: ResourceKind,
    },

    /// Logical id does not follow the declaration grammar
    #[error("Invalid logical id '{logical_id}': {reason}")]
    InvalidLogicalId { logical_id: String, reason: String },

    /// A deferred reference points at a logical id that was never declared
    #[error("{from}.{field} references unknown resource '{to}'{}", Suggestion(.suggestion))]
    UnknownResource {
        from: LogicalId,
        to: LogicalId,
        field: String,
        suggestion: Option<LogicalId>,
    },

    /// A deferred reference asks for an attribute the target kind never produces
    #[error("{from}.{field} asks for {attribute} of '{to}', which a {kind} does not expose")]
    UnsupportedAttribute {
        from: LogicalId,
        to: LogicalId,
        field: String,
        attribute: Attribute,
        kind: ResourceKind,
    },

    /// Batched naming problems; blocks compilation
    #[error("{} naming constraint violation(s):\n{}", .0.len(), ViolationList(.0))]
    ConstraintViolations(Vec<ConstraintViolation>),

    /// The reference graph is not acyclic
    #[error("Cyclic dependency: {}", CyclePath(.cycle))]
    CyclicDependency { cycle: Vec<LogicalId> },

    /// A policy names a resource that is not among the declared descriptors
    #[error("Policy '{policy}' statement '{sid}' references unresolved resource '{resource}'")]
    UnresolvedResourceRef {
        policy: LogicalId,
        sid: String,
        resource: LogicalId,
    },

    /// Policy statements that would not produce a least-privilege document
    #[error("Invalid policy '{policy}': {message}")]
    InvalidPolicy { policy: LogicalId, message: String },

    /// Injected configuration (naming grammars, blueprint) is unusable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Manifest could not be turned into declarations
    #[error("Manifest error: {message}")]
    Manifest { message: String },

    /// Backend reported a failure outside of per-resource results
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// File system failure with operation and path context
    #[error("Failed to {operation} '{}': {source}", .path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    pub(crate) fn duplicate_id(logical_id: &LogicalId, existing: ResourceKind) -> Self {
        Self::DuplicateId {
            logical_id: logical_id.clone(),
            existing,
        }
    }

    pub(crate) fn invalid_logical_id(logical_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidLogicalId {
            logical_id: logical_id.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown_resource(
        from: &LogicalId,
        to: &LogicalId,
        field: impl Into<String>,
        suggestion: Option<LogicalId>,
    ) -> Self {
        Self::UnknownResource {
            from: from.clone(),
            to: to.clone(),
            field: field.into(),
            suggestion,
        }
    }

    pub(crate) fn unresolved_resource_ref(
        policy: &LogicalId,
        sid: impl Into<String>,
        resource: &LogicalId,
    ) -> Self {
        Self::UnresolvedResourceRef {
            policy: policy.clone(),
            sid: sid.into(),
            resource: resource.clone(),
        }
    }

    pub(crate) fn invalid_policy(policy: &LogicalId, message: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            policy: policy.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub(crate) fn io(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Naming violations carried by this error, if it is the batched kind
    pub fn violations(&self) -> &[ConstraintViolation] {
        match self {
            Self::ConstraintViolations(violations) => violations,
            _ => &[],
        }
    }
}

struct Suggestion<'a>(&'a Option<LogicalId>);

impl fmt::Display for Suggestion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(candidate) => write!(f, " (did you mean '{candidate}'?)"),
            None => Ok(()),
        }
    }
}

struct CyclePath<'a>(&'a [LogicalId]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.0 {
            write!(f, "{id} -> ")?;
        }
        match self.0.first() {
            Some(first) => write!(f, "{first}"),
            None => Ok(()),
        }
    }
}

struct ViolationList<'a>(&'a [ConstraintViolation]);

impl fmt::Display for ViolationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for violation in self.0 {
            writeln!(f, "  - {violation}")?;
        }
        Ok(())
    }
}
