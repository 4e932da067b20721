#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Observation sources that watch the outside world and publish
//! events onto the bus: periodic HTTP health checks, polling-based
//! filesystem watching, and log-pattern tailing.

mod error;
mod file_watcher;
mod http_monitor;
mod log_monitor;

pub use error::SourceError;
pub use file_watcher::{FileEventType, FileWatcher, FileWatcherStatus, WatchConfig, WatcherStatus};
pub use http_monitor::{
    CheckResult, EndpointStatus, HttpEndpoint, HttpMonitor, HttpMonitorStatus,
};
pub use log_monitor::{
    LogMatch, LogMonitor, LogMonitorConfig, LogMonitorEntryStatus, LogMonitorStatus,
};
