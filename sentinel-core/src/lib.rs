#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Wires the runtime's component crates into a running agent:
//! loads configuration, starts observation sources, subscribes the
//! goal/decision/learning pipeline to the event bus, and executes
//! whatever actions the pipeline decides on.

mod config;
mod executor;
mod orchestrator;

pub use config::{LogMonitorSpec, RuntimeConfig};
pub use executor::{ActionExecutor, ExecutionOutcome, NoopExecutor, ShellExecutor};
pub use orchestrator::Orchestrator;
