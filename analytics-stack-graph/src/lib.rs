//! Core library for the analytics stack:
//! - Resource descriptors and deferred references
//! - Reference resolution and cross-service naming validation
//! - Deterministic provisioning plans with minimal-cycle diagnostics
//! - Least-privilege policy synthesis
//! - The apply/destroy executor boundary and a local in-memory backend
//!

pub mod arn;
pub mod blueprint;
pub mod compiler;
pub mod errors;
pub mod executor;
pub mod manifest;
pub mod model;
pub mod pipeline;
pub mod resolver;
pub mod synthesis;
pub mod validation;

// Re-exports for the common entry points
pub use arn::ArnContext;
pub use blueprint::{analytics_stack, BlueprintConfig};
pub use compiler::{compile, compile_against, Operation, PlanStep, ProvisioningPlan};
pub use errors::{GraphError, Result};
pub use executor::{ApplyResult, DestroyResult, Executor, InMemoryBackend, ProvisioningBackend};
pub use manifest::{Manifest, PolicySpec};
pub use model::{
    Attribute, Declarations, DeferredRef, LogicalId, Properties, PropertyValue, RemovalPolicy,
    ResourceDescriptor, ResourceKind,
};
pub use pipeline::{CompiledStack, StackCompiler};
pub use resolver::{resolve_references, Reference};
pub use synthesis::{synthesize, ResourceRef, StatementSpec};
pub use validation::{validate, ConstraintViolation, GrammarRegistry, NamingConfig};
