//! Human-readable rendering of plans, violations and executor results

use analytics_stack_graph::executor::ResourceError;
use analytics_stack_graph::{
    ApplyResult, ConstraintViolation, DestroyResult, Operation, PlanStep, ProvisioningPlan,
};
use colored::{ColoredString, Colorize};

fn symbol(operation: Operation) -> ColoredString {
    let symbol = operation.symbol().to_string();
    match operation {
        Operation::Create => symbol.green(),
        Operation::Update => symbol.yellow(),
        Operation::Delete => symbol.red(),
    }
}

fn print_step(step: &PlanStep) {
    println!(
        "  {} {} {}",
        symbol(step.operation),
        step.descriptor.kind,
        step.logical_id()
    );
}

pub fn print_violations(violations: &[ConstraintViolation]) {
    println!(
        "{} {} naming violation(s)",
        "Found".red().bold(),
        violations.len()
    );
    for violation in violations {
        println!("  {} {violation}", "x".red());
    }
}

pub fn print_plan(plan: &ProvisioningPlan) {
    println!("{} {} step(s)", "Plan:".bold(), plan.steps.len());
    for step in &plan.steps {
        print_step(step);
    }

    println!("{}", "Teardown order:".bold());
    for step in &plan.teardown {
        print_step(step);
    }

    if !plan.retained.is_empty() {
        println!("{}", "Retained on teardown:".bold());
        for logical_id in &plan.retained {
            println!("  {} {logical_id}", "=".cyan());
        }
    }
}

fn print_errors(errors: &[ResourceError]) {
    for error in errors {
        eprintln!(
            "  {} {} {}: {}",
            "!".red().bold(),
            error.operation,
            error.logical_id,
            error.message
        );
    }
}

pub fn print_apply_summary(result: &ApplyResult) {
    eprintln!(
        "{} {} created, {} updated, {} unchanged, {} deleted, {} error(s)",
        "Apply:".bold(),
        result.created.len(),
        result.updated.len(),
        result.unchanged.len(),
        result.deleted.len(),
        result.errors.len()
    );
    print_errors(&result.errors);
}

pub fn print_destroy_summary(result: &DestroyResult) {
    eprintln!(
        "{} {} deleted, {} retained, {} error(s)",
        "Destroy:".bold(),
        result.deleted.len(),
        result.retained.len(),
        result.errors.len()
    );
    for logical_id in &result.retained {
        eprintln!("  {} {logical_id} retained", "=".cyan());
    }
    print_errors(&result.errors);
}
