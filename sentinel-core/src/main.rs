use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentinel_bus::EventBus;
use sentinel_core::{NoopExecutor, Orchestrator, RuntimeConfig, ShellExecutor};
use sentinel_decision::DecisionAuditLog;
use sentinel_decision::DecisionEngine;
use sentinel_goals::GoalManager;
use sentinel_learning::LearningEngine;
use sentinel_memory::{InMemorySemanticMemory, JsonlSemanticMemory, SemanticMemory};
use sentinel_sources::{FileWatcher, HttpMonitor, LogMonitor};
use sentinel_telemetry::SentinelTelemetry;

#[derive(Parser, Debug)]
#[command(name = "sentinel", version, about = "Autonomous agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Starts the runtime: loads goals, starts observation sources,
    /// and dispatches matching events until interrupted.
    Run {
        #[arg(long, default_value = "sentinel.toml")]
        config: PathBuf,
        /// Actually run shell actions instead of only logging them.
        #[arg(long)]
        execute: bool,
        /// Persist learning history to a JSONL file under this directory
        /// instead of keeping it in memory only.
        #[arg(long)]
        memory_dir: Option<PathBuf>,
    },
    /// Validates a configuration file and the goal files it points at,
    /// then exits without starting anything.
    Validate {
        #[arg(long, default_value = "sentinel.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            execute,
            memory_dir,
        } => run(&config, execute, memory_dir),
        Commands::Validate { config } => validate(&config),
    }
}

fn validate(config_path: &PathBuf) -> Result<()> {
    let config = RuntimeConfig::load(config_path)?;
    let goals = GoalManager::new();
    let mut total = 0;
    for dir in &config.goal_dirs {
        total += goals
            .load_dir(dir)
            .with_context(|| format!("loading goals from {}", dir.display()))?;
    }
    println!("config OK: {total} goal(s) loaded, {} http endpoint(s), {} file watcher(s), {} log monitor(s)",
        config.http_endpoints.len(), config.file_watchers.len(), config.log_monitors.len());
    Ok(())
}

fn run(config_path: &PathBuf, execute: bool, memory_dir: Option<PathBuf>) -> Result<()> {
    let config = RuntimeConfig::load(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(config, execute, memory_dir))
}

async fn run_async(config: RuntimeConfig, execute: bool, memory_dir: Option<PathBuf>) -> Result<()> {
    let telemetry = match &config.telemetry_log_dir {
        Some(_) => {
            let mut builder = SentinelTelemetry::builder("sentinel-core");
            if let Some(path) = config.telemetry_log_path("sentinel-core") {
                builder = builder.log_path(path);
            }
            Some(builder.build().context("building telemetry")?)
        }
        None => None,
    };

    let goals = Arc::new(GoalManager::with_telemetry(telemetry.clone()));
    let mut loaded_goals = 0;
    for dir in &config.goal_dirs {
        loaded_goals += goals
            .load_dir(dir)
            .with_context(|| format!("loading goals from {}", dir.display()))?;
    }
    println!("loaded {loaded_goals} goal(s)");

    let memory: Arc<dyn SemanticMemory> = match memory_dir {
        Some(dir) => Arc::new(JsonlSemanticMemory::new(dir).context("opening memory store")?),
        None => Arc::new(InMemorySemanticMemory::new(10_000)),
    };
    let learning = Arc::new(LearningEngine::new(memory));
    let decision = Arc::new(DecisionEngine::new(Arc::clone(&learning)));
    let audit = Arc::new(DecisionAuditLog::new(config.audit_log_capacity));

    let executor: Arc<dyn sentinel_core::ActionExecutor> = if execute {
        Arc::new(ShellExecutor)
    } else {
        Arc::new(NoopExecutor)
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&goals),
        decision,
        learning,
        audit,
        executor,
        telemetry.clone(),
    ));

    let bus = match &telemetry {
        Some(t) => EventBus::with_telemetry(config.bus.clone(), Some(t.clone())),
        None => EventBus::new(config.bus.clone()),
    };
    orchestrator.attach(&bus);
    bus.start();

    let http_monitor = if config.http_endpoints.is_empty() {
        None
    } else {
        let monitor = match &telemetry {
            Some(t) => HttpMonitor::with_telemetry(bus.clone(), Some(t.clone()))?,
            None => HttpMonitor::new(bus.clone())?,
        };
        for endpoint in config.http_endpoints.clone() {
            monitor.add_endpoint(endpoint);
        }
        monitor.start();
        Some(monitor)
    };

    let file_watcher = if config.file_watchers.is_empty() {
        None
    } else {
        let watcher = FileWatcher::new(bus.clone());
        for watch in config.file_watchers.clone() {
            watcher.add_watcher(watch);
        }
        watcher.start();
        Some(watcher)
    };

    let log_monitor = if config.log_monitors.is_empty() {
        None
    } else {
        let monitor = LogMonitor::new(bus.clone());
        for spec in config.log_monitors.clone() {
            monitor.add_monitor(spec.into())?;
        }
        monitor.start();
        Some(monitor)
    };

    println!("sentinel runtime started, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    println!("shutting down");

    drop(http_monitor);
    drop(file_watcher);
    drop(log_monitor);
    bus.stop().await;
    Ok(())
}
