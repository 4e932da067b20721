#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! A single telemetry handle shared across every sentinel runtime
//! component (bus, goals, learning, decision, sources). Each component
//! gets its own handle via [`SentinelTelemetry::builder`] rather than
//! a process-wide singleton, so tests can run several instances side
//! by side without interference.

use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use sentinel_logging::{JsonLogger, LogLevel, LogRecord};
use sentinel_telemetry_bus::{EventPublisher, EventRecord};
use serde_json::Value;
use tokio::runtime::{Handle, Runtime};
use uuid::Uuid;

/// Builder for a component's telemetry sink.
pub struct SentinelTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl SentinelTelemetryBuilder {
    /// Creates the builder for the named component (e.g. `"decision"`).
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            event_publisher: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sets the telemetry event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<SentinelTelemetry> {
        SentinelTelemetry::new(self.module, self.log_path, self.event_publisher)
    }
}

/// Shared telemetry handle: structured logging plus optional
/// event-bus emission. Cheap to clone (`Arc` internally).
#[derive(Clone)]
pub struct SentinelTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for SentinelTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelTelemetry")
            .field("module", &self.inner.module)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    event: Option<EventHandle>,
}

struct EventHandle {
    runtime: Runtime,
    publisher: Arc<dyn EventPublisher>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::new()?,
            publisher,
        })
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            Ok(())
        } else {
            self.runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl SentinelTelemetry {
    fn new(
        module: impl Into<String>,
        log_path: Option<PathBuf>,
        event_publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Result<Self> {
        let logger = log_path.map(JsonLogger::new).transpose()?;
        let event = event_publisher.map(EventHandle::new).transpose()?;
        Ok(Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                logger,
                event,
            }),
        })
    }

    /// Returns a builder for the named component.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> SentinelTelemetryBuilder {
        SentinelTelemetryBuilder::new(module)
    }

    /// Logs a structured message. A no-op if no log path was configured.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.module, level, message);
            if let Some(obj) = metadata.as_object() {
                record.metadata = obj.clone();
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the telemetry bus. A no-op if no publisher was configured.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            handle.publish(EventRecord {
                id: format!("evt-{}", Uuid::new_v4()),
                source: self.inner.module.clone(),
                event_type: event_type.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                payload,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_telemetry_bus::MemoryEventBus;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("decision.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = SentinelTelemetry::builder("decision")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "decision.evaluate_start", json!({ "goal": "g1" }))
            .unwrap();
        telemetry
            .event("decision.evaluated", json!({ "decision_type": "act" }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("decision.evaluate_start"));
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[test]
    fn telemetry_with_no_sinks_is_a_noop() {
        let telemetry = SentinelTelemetry::builder("quiet").build().unwrap();
        telemetry
            .log(LogLevel::Debug, "nothing happens", json!({}))
            .unwrap();
        telemetry.event("nothing.happens", json!({})).unwrap();
    }
}
