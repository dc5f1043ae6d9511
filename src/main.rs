use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info};

use atelier::config::Config;
use atelier::orchestration::{CommandExecutor, SimulatedExecutor, TaskExecutor};
use atelier::{Error, Plan, Result, RunOutcome, Scheduler, SchedulerEvent, TaskRegistry};

/// Atelier - run UI design tasks in parallel, respecting their dependencies
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    ATELIER_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG            Overrides the log filter entirely")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run every task in a plan
    Run {
        /// Plan file (TOML, or JSON with a .json extension)
        plan: PathBuf,

        /// Most tasks running at once (defaults to the config value)
        #[arg(long, short = 'j')]
        max_concurrency: Option<usize>,

        /// Per-task timeout in seconds (defaults to the config value)
        #[arg(long)]
        timeout: Option<u64>,

        /// Simulate tasks even if an executor command is configured
        #[arg(long)]
        simulate: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a plan for unknown dependencies and cycles
    Validate {
        plan: PathBuf,
    },

    /// Print a dependency-respecting order of a plan's tasks
    Order {
        plan: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    atelier::log::init(cli.debug);

    match cli.command {
        Command::Run {
            plan,
            max_concurrency,
            timeout,
            simulate,
            json,
        } => run_plan(&plan, max_concurrency, timeout, simulate, json),
        Command::Validate { plan } => run_validate(&plan),
        Command::Order { plan } => run_order(&plan),
    }
}

fn load_registry(path: &Path) -> Result<(String, TaskRegistry)> {
    let plan = Plan::load(path)?;
    let feature = plan.feature.clone();
    Ok((feature, plan.into_registry()?))
}

fn build_executor(config: &Config, simulate: bool) -> Result<Arc<dyn TaskExecutor>> {
    match (&config.command, simulate) {
        (Some(command), false) => {
            let executor = CommandExecutor::new(command)?
                .with_args(config.args.iter().cloned())
                .with_cwd(config.working_dir());
            info!(binary = %executor.binary().display(), "using command executor");
            Ok(Arc::new(executor))
        }
        _ => {
            debug!(time_scale_ms = config.time_scale_ms, "using simulated executor");
            Ok(Arc::new(SimulatedExecutor::new(config.time_scale())))
        }
    }
}

/// Run a plan and print its report.
///
/// Exits with status 1 when a non-empty plan finishes with nothing completed.
fn run_plan(
    path: &Path,
    max_concurrency: Option<usize>,
    timeout: Option<u64>,
    simulate: bool,
    json: bool,
) -> Result<()> {
    let config = Config::load()?;
    let (feature, registry) = load_registry(path)?;
    let executor = build_executor(&config, simulate)?;
    let max_concurrency = max_concurrency.unwrap_or(config.max_concurrency);
    let task_timeout = resolve_task_timeout(timeout, &config)?;

    if !json {
        println!(
            "Running {} design task(s) for '{}' ({} at a time)",
            registry.len(),
            feature,
            max_concurrency
        );
        println!();
    }

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let (event_tx, event_rx) = mpsc::channel(256);
        let printer = tokio::spawn(print_events(event_rx, !json));

        let mut scheduler = Scheduler::new(registry, executor)
            .with_task_timeout(task_timeout)
            .with_events(event_tx);
        let outcome = scheduler.run(max_concurrency).await;
        drop(scheduler);
        let _ = printer.await;
        outcome
    })?;

    if json {
        print_json(&feature, &outcome)?;
    } else {
        println!();
        print!("{}", outcome.report);
    }

    if outcome.is_failure() {
        std::process::exit(1);
    }
    Ok(())
}

/// The `--timeout` flag wins over the config file; zero is rejected.
fn resolve_task_timeout(flag: Option<u64>, config: &Config) -> Result<Duration> {
    match flag {
        Some(0) => Err(Error::Validation(
            "--timeout must be at least 1 second".to_string(),
        )),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(config.task_timeout()),
    }
}

async fn print_events(mut rx: mpsc::Receiver<SchedulerEvent>, enabled: bool) {
    while let Some(event) = rx.recv().await {
        if !enabled {
            continue;
        }
        match event {
            SchedulerEvent::TaskStarted { task_id } => println!("  started    {}", task_id),
            SchedulerEvent::TaskCompleted { task_id, duration } => {
                println!("  completed  {} ({:.1}s)", task_id, duration.as_secs_f64())
            }
            SchedulerEvent::TaskFailed { task_id, error } => {
                println!("  failed     {}: {}", task_id, error)
            }
            SchedulerEvent::TaskBlocked { task_id, cause } => {
                println!("  blocked    {} (by {})", task_id, cause)
            }
            SchedulerEvent::AllTasksComplete => {}
        }
    }
}

fn print_json(feature: &str, outcome: &RunOutcome) -> Result<()> {
    let tasks: Vec<_> = outcome.completions.iter().map(|c| &c.task).collect();
    let json_output = serde_json::json!({
        "run_id": outcome.run_id.to_string(),
        "feature": feature,
        "report": outcome.report,
        "tasks": tasks,
    });
    println!("{}", serde_json::to_string_pretty(&json_output)?);
    Ok(())
}

fn run_validate(path: &Path) -> Result<()> {
    let (feature, registry) = load_registry(path)?;
    println!("Plan '{}' is valid: {} task(s)", feature, registry.len());
    Ok(())
}

fn run_order(path: &Path) -> Result<()> {
    let (_, registry) = load_registry(path)?;
    for (position, task) in registry.topological_order()?.into_iter().enumerate() {
        println!("{:>3}. {} [{}]", position + 1, task.id(), task.kind());
    }
    Ok(())
}
