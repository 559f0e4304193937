use std::sync::Arc;

/// Reset SIGPIPE to default behavior so piping (e.g. `oraprov plan --json | jq`) exits cleanly
/// instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use oraprov::config::parser::{self, DEFAULT_MANIFEST};
use oraprov::config::types::{Ensure, Manifest};
use oraprov::config::validator;
use oraprov::discovery::registry::OraTabSource;
use oraprov::discovery::sqlplus::SqlPlusSource;
use oraprov::error::ProvisionError;
use oraprov::executor::engine::{PlanSummary, ReconcileEngine, StateSources};
use oraprov::executor::retry::with_retry;
use oraprov::executor::transport::{DryRunTransport, ShellTransport, Transport};
use oraprov::output::formatter;
use oraprov::provision::Provisioning;
use oraprov::resources::{self, Declaration};

/// oraprov - declarative Oracle database provisioning
#[derive(Parser)]
#[command(name = "oraprov", version, about, long_about = None)]
struct Cli {
    /// Path to manifest file or directory of .yaml files
    #[arg(short, long, default_value = DEFAULT_MANIFEST)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Working directory for locks (overrides settings.working_dir)
    #[arg(short, long)]
    working_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest without touching any database
    Validate,

    /// Show what apply would change
    Plan {
        /// Plan only resources whose address contains this text
        #[arg(short, long)]
        target: Vec<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile databases with the manifest
    Apply {
        /// Apply only resources whose address contains this text
        #[arg(short, long)]
        target: Vec<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,

        /// Print the commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove every declared resource, in reverse manifest order
    Destroy {
        /// Destroy only resources whose address contains this text
        #[arg(short, long)]
        target: Vec<String>,

        /// Skip confirmation prompt
        #[arg(long)]
        auto_approve: bool,

        /// Print the commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },

    /// List the raw state of one resource type
    Discover {
        /// Resource type (ora_database, init_param, tablespace, oracle_user, oracle_service)
        resource_type: String,

        /// Instance to query
        #[arg(long)]
        sid: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate => cmd_validate(&cli),
        Commands::Plan { ref target, json } => cmd_plan(&cli, target, json).await,
        Commands::Apply {
            ref target,
            auto_approve,
            dry_run,
        } => cmd_apply(&cli, target, auto_approve, dry_run, false).await,
        Commands::Destroy {
            ref target,
            auto_approve,
            dry_run,
        } => cmd_apply(&cli, target, auto_approve, dry_run, true).await,
        Commands::Discover {
            ref resource_type,
            ref sid,
        } => cmd_discover(&cli, resource_type, sid.as_deref()).await,
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn load(cli: &Cli) -> Result<Manifest> {
    let mut manifest = parser::load_manifest(&cli.config)?;
    if let Some(dir) = &cli.working_dir {
        manifest.settings.working_dir = dir.clone();
    }
    validator::validate(&manifest)?;
    Ok(manifest)
}

fn build_engine(manifest: &Manifest, dry_run: bool) -> ReconcileEngine {
    let settings = manifest.settings.clone();
    let services = if dry_run {
        Provisioning::dry_run(settings)
    } else {
        Provisioning::local(settings)
    };
    let sources = StateSources {
        database: Arc::new(SqlPlusSource::new(
            &services.settings,
            Arc::clone(&services.registry),
        )),
        registry: Arc::new(OraTabSource::new(Arc::clone(&services.registry))),
    };
    let transport: Arc<dyn Transport> = if dry_run {
        Arc::new(DryRunTransport::new())
    } else {
        Arc::new(ShellTransport::new(services.clone()))
    };
    ReconcileEngine::new(services, sources, transport)
}

fn select(declarations: &[Declaration], targets: &[String]) -> Vec<Declaration> {
    declarations
        .iter()
        .filter(|d| formatter::is_targeted(&d.resource().address(), targets))
        .cloned()
        .collect()
}

/// Plan with retries for transient discovery failures.
async fn plan_with_retry(
    engine: &ReconcileEngine,
    manifest: &Manifest,
    declarations: &[Declaration],
) -> Result<PlanSummary, ProvisionError> {
    let settings = &manifest.settings;
    with_retry(
        settings.discovery_retries,
        settings.retry_delay_ms,
        "plan",
        |e: &ProvisionError| e.is_retryable(),
        || engine.plan(declarations),
    )
    .await
}

fn confirm(question: &str) -> Result<bool> {
    use std::io::Write;

    println!("\n{} Only '{}' will be accepted.", question, "yes".bold());
    print!("  Enter a value: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

// ─── Commands ────────────────────────────────────────────────────────────────

fn cmd_validate(cli: &Cli) -> Result<()> {
    let manifest = load(cli)?;

    let mut counts = std::collections::BTreeMap::new();
    for declaration in &manifest.resources {
        *counts.entry(declaration.resource().resource_type()).or_insert(0) += 1;
    }
    println!(
        "  {} {} resource(s) declared",
        "→".blue(),
        manifest.resources.len()
    );
    for (kind, count) in counts {
        println!("      {:<16} {}", kind, count);
    }

    formatter::print_success("Manifest is valid.");
    Ok(())
}

async fn cmd_plan(cli: &Cli, targets: &[String], json: bool) -> Result<()> {
    let manifest = load(cli)?;
    let declarations = select(&manifest.resources, targets);
    let engine = build_engine(&manifest, true);

    let plan = plan_with_retry(&engine, &manifest, &declarations).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        formatter::print_plan(&plan, targets);
    }
    Ok(())
}

async fn cmd_apply(
    cli: &Cli,
    targets: &[String],
    auto_approve: bool,
    dry_run: bool,
    is_destroy: bool,
) -> Result<()> {
    let manifest = load(cli)?;
    let mut declarations = select(&manifest.resources, targets);
    if is_destroy {
        declarations.reverse();
        for declaration in &mut declarations {
            declaration.set_ensure(Ensure::Absent);
        }
    }
    let engine = build_engine(&manifest, dry_run);

    let plan = plan_with_retry(&engine, &manifest, &declarations).await?;
    formatter::print_plan(&plan, &[]);
    if !plan.has_changes() {
        return Ok(());
    }

    if !auto_approve && !dry_run {
        let question = if is_destroy {
            "Do you really want to destroy these resources?"
        } else {
            "Do you want to perform these actions?"
        };
        if !confirm(question)? {
            let verb = if is_destroy { "Destroy" } else { "Apply" };
            println!("\n{}", format!("{} cancelled.", verb).yellow());
            return Ok(());
        }
    }

    let summary = engine.apply(&declarations, &plan, is_destroy).await;
    if dry_run {
        println!();
        for result in &summary.results {
            if let Some(built) = &result.plan {
                formatter::print_provisioning_plan(built);
            }
        }
    }
    formatter::print_apply_summary(&summary);

    if let Some(failed) = summary.first_failure() {
        bail!("{} failed", failed.address);
    }
    Ok(())
}

async fn cmd_discover(cli: &Cli, resource_type: &str, sid: Option<&str>) -> Result<()> {
    let manifest = match parser::load_manifest(&cli.config) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::debug!(error = %e, "No manifest loaded, using default settings");
            Manifest::default()
        }
    };
    let request = resources::listing(resource_type, sid, &manifest.settings)?;
    let engine = build_engine(&manifest, true);

    let records = with_retry(
        manifest.settings.discovery_retries,
        manifest.settings.retry_delay_ms,
        "discover",
        |e: &ProvisionError| e.is_retryable(),
        || engine.discover(resource_type, &request),
    )
    .await?;
    formatter::print_records(resource_type, &records);
    Ok(())
}
