//! Compilation pipeline
//!
//! Runs resolve, validate and compile in one call so callers never hand a
//! plan with naming violations to the executor.

use std::collections::BTreeSet;

use log::info;
use serde::Serialize;

use crate::compiler::{self, ProvisioningPlan};
use crate::errors::{GraphError, Result};
use crate::model::Declarations;
use crate::resolver::{resolve_references, Reference};
use crate::validation::{validate, ConstraintViolation, GrammarRegistry, NamingConfig};

/// Output of a successful compilation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledStack {
    pub references: BTreeSet<Reference>,
    pub plan: ProvisioningPlan,
}

/// Compiles declaration sets against a naming registry
#[derive(Debug)]
#[non_exhaustive]
pub struct StackCompiler {
    registry: GrammarRegistry,
}

impl StackCompiler {
    pub fn new(registry: GrammarRegistry) -> Self {
        Self { registry }
    }

    /// Compiler with the built-in naming grammars
    pub fn builtin() -> Self {
        Self::new(GrammarRegistry::builtin())
    }

    pub fn from_config(config: &NamingConfig) -> Result<Self> {
        Ok(Self::new(GrammarRegistry::from_config(config)?))
    }

    /// Resolve and validate without ordering anything
    pub fn check(&self, declarations: &Declarations) -> Result<Vec<ConstraintViolation>> {
        resolve_references(declarations)?;
        Ok(validate(declarations, &self.registry))
    }

    /// Compile a fresh plan
    ///
    /// # Errors
    /// Any resolution error, `ConstraintViolations` with every naming problem
    /// found, or a compiler error.
    pub fn compile(&self, declarations: &Declarations) -> Result<CompiledStack> {
        self.run(declarations, None)
    }

    /// Compile relative to the plan of a previous run
    pub fn compile_against(
        &self,
        declarations: &Declarations,
        prior: &ProvisioningPlan,
    ) -> Result<CompiledStack> {
        self.run(declarations, Some(prior))
    }

    fn run(
        &self,
        declarations: &Declarations,
        prior: Option<&ProvisioningPlan>,
    ) -> Result<CompiledStack> {
        let references = resolve_references(declarations)?;

        let violations = validate(declarations, &self.registry);
        if !violations.is_empty() {
            return Err(GraphError::ConstraintViolations(violations));
        }

        let plan = match prior {
            Some(prior) => compiler::compile_against(declarations, &references, prior)?,
            None => compiler::compile(declarations, &references)?,
        };
        info!(
            "Compiled {} descriptor(s): {} reference(s), {} step(s), {} retained",
            declarations.len(),
            references.len(),
            plan.steps.len(),
            plan.retained.len()
        );
        Ok(CompiledStack { references, plan })
    }
}

impl Default for StackCompiler {
    fn default() -> Self {
        Self::builtin()
    }
}
