//! analytics-stack: validate, plan, apply and destroy analytics stack manifests
//!
//! Exit codes: 0 on success, 1 on compile errors or failed resources, 2 when
//! the manifest has naming violations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use analytics_stack_graph::{
    analytics_stack, BlueprintConfig, CompiledStack, Executor, GraphError, GrammarRegistry,
    InMemoryBackend, Manifest, NamingConfig, ProvisioningPlan, StackCompiler,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;

mod output;

const VIOLATIONS_EXIT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "analytics-stack")]
#[command(about = "Dependency graph compiler for the analytics stack")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Raise log verbosity (-v info, -vv debug); RUST_LOG still wins
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Naming grammar override shared by the compiling subcommands
#[derive(clap::Args, Debug)]
struct NamingArgs {
    /// Naming grammar configuration (JSON); replaces the manifest's own grammars
    #[arg(long, env = "ANALYTICS_STACK_NAMING")]
    naming: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a manifest for naming violations
    Validate {
        manifest: PathBuf,
        #[command(flatten)]
        naming: NamingArgs,
    },

    /// Print the provisioning plan of a manifest
    Plan {
        manifest: PathBuf,

        /// Plan emitted by a previous run; provisioned resources become updates
        #[arg(long)]
        prior: Option<PathBuf>,

        /// Print the serialized plan instead of the summary
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        naming: NamingArgs,
    },

    /// Provision a manifest against the local state backend
    Apply {
        manifest: PathBuf,

        /// State file of the local backend
        #[arg(long, env = "ANALYTICS_STACK_STATE")]
        state: PathBuf,

        /// Plan emitted by a previous run; resources it no longer declares are deleted
        #[arg(long)]
        prior: Option<PathBuf>,

        #[command(flatten)]
        naming: NamingArgs,
    },

    /// Tear down a manifest from the local state backend
    Destroy {
        manifest: PathBuf,

        /// State file of the local backend
        #[arg(long, env = "ANALYTICS_STACK_STATE")]
        state: PathBuf,

        #[command(flatten)]
        naming: NamingArgs,
    },

    /// Print the analytics stack blueprint as a manifest
    Blueprint {
        /// Blueprint configuration (JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the JSON schema of the manifest format
    Schema,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn print_error(e: &anyhow::Error) {
    eprintln!("{} {e}", "Error:".red().bold());
    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("  {} {cause}", "Caused by:".yellow());
        source = cause.source();
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Validate { manifest, naming } => validate(&manifest, &naming),
        Commands::Plan {
            manifest,
            prior,
            json,
            naming,
        } => plan(&manifest, prior.as_deref(), json, &naming),
        Commands::Apply {
            manifest,
            state,
            prior,
            naming,
        } => apply(&manifest, &state, prior.as_deref(), &naming).await,
        Commands::Destroy {
            manifest,
            state,
            naming,
        } => destroy(&manifest, &state, &naming).await,
        Commands::Blueprint { config } => blueprint(config.as_deref()),
        Commands::Schema => {
            println!("{}", Manifest::json_schema()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    Manifest::load(path).with_context(|| format!("Failed to load manifest {}", path.display()))
}

/// `--naming` wins over the manifest's grammars, which win over the built-in ones
fn stack_compiler(manifest: &Manifest, naming: &NamingArgs) -> Result<StackCompiler> {
    let registry = match &naming.naming {
        Some(path) => {
            let config = NamingConfig::load(path)
                .with_context(|| format!("Failed to load naming config {}", path.display()))?;
            GrammarRegistry::from_config(&config)?
        }
        None => manifest.naming_registry()?,
    };
    Ok(StackCompiler::new(registry))
}

/// Compile a manifest; naming violations are printed and yield `None`
fn compile(
    manifest: &Manifest,
    naming: &NamingArgs,
    prior: Option<&Path>,
) -> Result<Option<CompiledStack>> {
    let stack_compiler = stack_compiler(manifest, naming)?;
    let declarations = manifest.declarations()?;

    let compiled = match prior {
        Some(path) => {
            let prior = ProvisioningPlan::load(path)
                .with_context(|| format!("Failed to load prior plan {}", path.display()))?;
            stack_compiler.compile_against(&declarations, &prior)
        }
        None => stack_compiler.compile(&declarations),
    };

    match compiled {
        Ok(compiled) => Ok(Some(compiled)),
        Err(GraphError::ConstraintViolations(violations)) => {
            output::print_violations(&violations);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn validate(path: &Path, naming: &NamingArgs) -> Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let declarations = manifest.declarations()?;
    let violations = stack_compiler(&manifest, naming)?.check(&declarations)?;

    if violations.is_empty() {
        println!(
            "{} {} resource(s), no naming violations",
            "OK".green().bold(),
            declarations.len()
        );
        return Ok(ExitCode::SUCCESS);
    }
    output::print_violations(&violations);
    Ok(ExitCode::from(VIOLATIONS_EXIT))
}

fn plan(path: &Path, prior: Option<&Path>, json: bool, naming: &NamingArgs) -> Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let Some(compiled) = compile(&manifest, naming, prior)? else {
        return Ok(ExitCode::from(VIOLATIONS_EXIT));
    };

    if json {
        println!("{}", compiled.plan.to_json_pretty()?);
    } else {
        output::print_plan(&compiled.plan);
    }
    Ok(ExitCode::SUCCESS)
}

async fn apply(
    path: &Path,
    state: &Path,
    prior: Option<&Path>,
    naming: &NamingArgs,
) -> Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let Some(compiled) = compile(&manifest, naming, prior)? else {
        return Ok(ExitCode::from(VIOLATIONS_EXIT));
    };

    let backend = InMemoryBackend::load(state, manifest.context.clone())
        .await
        .with_context(|| format!("Failed to load state {}", state.display()))?;
    debug!("Applying {} step(s)", compiled.plan.steps.len());
    let result = Executor::new(&backend).apply(&compiled.plan).await;
    backend
        .save(state)
        .await
        .with_context(|| format!("Failed to save state {}", state.display()))?;

    output::print_apply_summary(&result);
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn destroy(path: &Path, state: &Path, naming: &NamingArgs) -> Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let Some(compiled) = compile(&manifest, naming, None)? else {
        return Ok(ExitCode::from(VIOLATIONS_EXIT));
    };

    let backend = InMemoryBackend::load(state, manifest.context.clone())
        .await
        .with_context(|| format!("Failed to load state {}", state.display()))?;
    let result = Executor::new(&backend).destroy(&compiled.plan).await;
    backend
        .save(state)
        .await
        .with_context(|| format!("Failed to save state {}", state.display()))?;

    output::print_destroy_summary(&result);
    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn blueprint(config: Option<&Path>) -> Result<ExitCode> {
    let config = match config {
        Some(path) => BlueprintConfig::load(path)
            .with_context(|| format!("Failed to load blueprint config {}", path.display()))?,
        None => BlueprintConfig::default(),
    };
    let manifest = analytics_stack(&config)?;
    println!("{}", manifest.to_json_pretty()?);
    Ok(ExitCode::SUCCESS)
}
