use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use sentinel_bus::{Event, EventBus, EventPriority, Payload, PayloadValue};
use sentinel_logging::LogLevel;
use sentinel_telemetry::SentinelTelemetry;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::SourceError;

fn default_method() -> String {
    "GET".to_string()
}
fn default_expected_status() -> u16 {
    200
}
fn default_timeout_seconds() -> f64 {
    10.0
}
fn default_interval_seconds() -> f64 {
    60.0
}
fn default_alert_on_status() -> Vec<u16> {
    vec![500, 502, 503, 504]
}
fn default_true() -> bool {
    true
}
fn default_response_time_threshold_ms() -> u64 {
    5000
}

/// Configuration for an HTTP endpoint to monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEndpoint {
    /// Unique identifier.
    pub id: String,
    /// URL to request.
    pub url: String,
    /// HTTP method, e.g. `GET`.
    #[serde(default = "default_method")]
    pub method: String,
    /// Status code considered a healthy response.
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Per-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
    /// Seconds between checks.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,
    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Status codes that trigger a high-priority alert on failure.
    #[serde(default = "default_alert_on_status")]
    pub alert_on_status: Vec<u16>,
    /// Whether a timeout triggers a high-priority alert.
    #[serde(default = "default_true")]
    pub alert_on_timeout: bool,
    /// Response time, in milliseconds, above which a successful check
    /// still emits a medium-priority slow-response event.
    #[serde(default = "default_response_time_threshold_ms")]
    pub response_time_threshold_ms: u64,
}

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// The endpoint checked.
    pub endpoint_id: String,
    /// URL requested.
    pub url: String,
    /// Whether the response matched `expected_status`.
    pub success: bool,
    /// Status code received, if the request completed.
    pub status_code: Option<u16>,
    /// Elapsed request time, in milliseconds.
    pub response_time_ms: f64,
    /// Error description, if the request failed or timed out.
    pub error: Option<String>,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
}

/// Per-endpoint status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    /// URL of the endpoint.
    pub url: String,
    /// `"healthy"` or `"unhealthy"`.
    pub status: &'static str,
    /// When the endpoint was last checked.
    pub last_check: Option<DateTime<Utc>>,
    /// Elapsed time of the last check, in milliseconds.
    pub response_time_ms: Option<f64>,
    /// Error from the last check, if any.
    pub last_error: Option<String>,
}

/// Snapshot of the whole monitor's state.
#[derive(Debug, Clone, Serialize)]
pub struct HttpMonitorStatus {
    /// Whether the monitor's background tasks are running.
    pub running: bool,
    /// Number of endpoints configured.
    pub endpoint_count: usize,
    /// Per-endpoint status, keyed by endpoint id.
    pub endpoints: HashMap<String, EndpointStatus>,
}

/// Decides whether a check result should emit an event, and at what
/// priority: failures against a known alert status or a timeout are
/// `HIGH`, a slow-but-successful response is `MEDIUM`, recovery from a
/// prior failure is `LOW`, anything else emits nothing.
#[must_use]
fn decide_emit(
    endpoint: &HttpEndpoint,
    previous: Option<&CheckResult>,
    result: &CheckResult,
) -> Option<EventPriority> {
    if !result.success {
        if result
            .status_code
            .is_some_and(|code| endpoint.alert_on_status.contains(&code))
        {
            return Some(EventPriority::High);
        }
        if result.error.as_deref() == Some("Timeout") && endpoint.alert_on_timeout {
            return Some(EventPriority::High);
        }
        return Some(EventPriority::Medium);
    }

    if result.response_time_ms > endpoint.response_time_threshold_ms as f64 {
        return Some(EventPriority::Medium);
    }

    if previous.is_some_and(|prev| !prev.success) {
        return Some(EventPriority::Low);
    }

    None
}

struct Inner {
    event_bus: EventBus,
    client: Client,
    endpoints: RwLock<IndexMap<String, HttpEndpoint>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    running: AtomicBool,
    last_results: RwLock<HashMap<String, CheckResult>>,
    telemetry: Option<SentinelTelemetry>,
}

/// Periodically checks configured HTTP endpoints and publishes events
/// to the bus when a check fails, times out, runs slow, or recovers.
#[derive(Clone)]
pub struct HttpMonitor {
    inner: Arc<Inner>,
}

impl HttpMonitor {
    /// Builds a monitor publishing to `event_bus`.
    pub fn new(event_bus: EventBus) -> Result<Self, SourceError> {
        Self::with_telemetry(event_bus, None)
    }

    /// Builds a monitor with an optional telemetry handle.
    pub fn with_telemetry(
        event_bus: EventBus,
        telemetry: Option<SentinelTelemetry>,
    ) -> Result<Self, SourceError> {
        let client = Client::builder().build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                event_bus,
                client,
                endpoints: RwLock::new(IndexMap::new()),
                tasks: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                last_results: RwLock::new(HashMap::new()),
                telemetry,
            }),
        })
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(telemetry) = &self.inner.telemetry {
            let _ = telemetry.log(level, message, metadata);
        }
    }

    /// Starts a monitoring task for every registered endpoint. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let endpoints: Vec<HttpEndpoint> = self.inner.endpoints.read().values().cloned().collect();
        for endpoint in endpoints {
            self.spawn_endpoint_task(endpoint);
        }

        self.log(
            LogLevel::Info,
            "http_monitor.started",
            serde_json::json!({ "endpoint_count": self.inner.endpoints.read().len() }),
        );
    }

    /// Cancels every monitoring task.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);

        let handles: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }

        self.log(LogLevel::Info, "http_monitor.stopped", serde_json::json!({}));
    }

    fn spawn_endpoint_task(&self, endpoint: HttpEndpoint) {
        let monitor = self.clone();
        let id = endpoint.id.clone();
        let handle = tokio::spawn(async move { monitor.monitor_endpoint(endpoint).await });
        self.inner.tasks.lock().insert(id, handle);
    }

    /// Registers an endpoint, starting its monitoring task immediately
    /// if the monitor is already running.
    pub fn add_endpoint(&self, endpoint: HttpEndpoint) {
        let id = endpoint.id.clone();
        let url = endpoint.url.clone();
        self.inner.endpoints.write().insert(id, endpoint.clone());

        if self.is_running() {
            self.spawn_endpoint_task(endpoint);
        }

        self.log(
            LogLevel::Info,
            "http_monitor.endpoint_added",
            serde_json::json!({ "url": url }),
        );
    }

    /// Removes an endpoint, cancelling its task if running. Returns
    /// `false` if the id was unknown.
    pub fn remove_endpoint(&self, endpoint_id: &str) -> bool {
        if self.inner.endpoints.write().shift_remove(endpoint_id).is_none() {
            return false;
        }
        if let Some(handle) = self.inner.tasks.lock().remove(endpoint_id) {
            handle.abort();
        }
        self.inner.last_results.write().remove(endpoint_id);
        true
    }

    async fn monitor_endpoint(&self, endpoint: HttpEndpoint) {
        while self.inner.running.load(Ordering::SeqCst) {
            let result = self.check_endpoint(&endpoint).await;
            self.process_result(&endpoint, result);
            tokio::time::sleep(Duration::from_secs_f64(endpoint.interval_seconds.max(0.0))).await;
        }
    }

    async fn check_endpoint(&self, endpoint: &HttpEndpoint) -> CheckResult {
        let method = reqwest::Method::from_bytes(endpoint.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let mut request = self
            .inner
            .client
            .request(method, &endpoint.url)
            .timeout(Duration::from_secs_f64(endpoint.timeout_seconds.max(0.0)));
        for (key, value) in &endpoint.headers {
            request = request.header(key, value);
        }

        let start = Instant::now();
        match request.send().await {
            Ok(response) => {
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                let status = response.status().as_u16();
                CheckResult {
                    endpoint_id: endpoint.id.clone(),
                    url: endpoint.url.clone(),
                    success: status == endpoint.expected_status,
                    status_code: Some(status),
                    response_time_ms: elapsed_ms,
                    error: None,
                    timestamp: Utc::now(),
                }
            }
            Err(err) => CheckResult {
                endpoint_id: endpoint.id.clone(),
                url: endpoint.url.clone(),
                success: false,
                status_code: None,
                response_time_ms: 0.0,
                error: Some(if err.is_timeout() {
                    "Timeout".to_string()
                } else {
                    err.to_string()
                }),
                timestamp: Utc::now(),
            },
        }
    }

    fn process_result(&self, endpoint: &HttpEndpoint, result: CheckResult) {
        let previous = self
            .inner
            .last_results
            .write()
            .insert(endpoint.id.clone(), result.clone());

        let Some(priority) = decide_emit(endpoint, previous.as_ref(), &result) else {
            return;
        };

        let recovered = previous.as_ref().is_some_and(|prev| !prev.success) && result.success;

        let mut payload = Payload::new();
        payload.insert("endpoint_id".to_string(), result.endpoint_id.clone().into());
        payload.insert("url".to_string(), result.url.clone().into());
        payload.insert("success".to_string(), result.success.into());
        payload.insert(
            "status_code".to_string(),
            result.status_code.map_or(PayloadValue::Null, |code| PayloadValue::Int(i64::from(code))),
        );
        payload.insert(
            "response_time_ms".to_string(),
            PayloadValue::Float(result.response_time_ms),
        );
        payload.insert(
            "error".to_string(),
            result.error.clone().map_or(PayloadValue::Null, PayloadValue::String),
        );
        payload.insert("recovered".to_string(), recovered.into());

        let event = Event::new(
            "http_check",
            format!("http_monitor:{}", endpoint.id),
            payload,
        )
        .with_priority(priority);

        self.inner.event_bus.publish(event);

        self.log(
            LogLevel::Info,
            "http_monitor.check_event",
            serde_json::json!({
                "endpoint_id": endpoint.id,
                "success": result.success,
                "status_code": result.status_code,
                "error": result.error,
            }),
        );
    }

    /// Whether the monitor's background tasks are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Snapshot of every endpoint's last-known health.
    #[must_use]
    pub fn get_status(&self) -> HttpMonitorStatus {
        let endpoints = self.inner.endpoints.read();
        let last_results = self.inner.last_results.read();
        let statuses = endpoints
            .values()
            .map(|endpoint| {
                let result = last_results.get(&endpoint.id);
                (
                    endpoint.id.clone(),
                    EndpointStatus {
                        url: endpoint.url.clone(),
                        status: result.is_some_and(|r| r.success).then_some("healthy").unwrap_or("unhealthy"),
                        last_check: result.map(|r| r.timestamp),
                        response_time_ms: result.map(|r| r.response_time_ms),
                        last_error: result.and_then(|r| r.error.clone()),
                    },
                )
            })
            .collect();

        HttpMonitorStatus {
            running: self.is_running(),
            endpoint_count: endpoints.len(),
            endpoints: statuses,
        }
    }
}
