use thiserror::Error;

/// Errors surfaced directly by bus operations. Handler failures do
/// not produce this type — they are retried and then routed to the
/// dead-letter queue instead of propagating, matching the runtime's
/// bias toward degrading rather than terminating.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus was asked to do something that requires it to be running.
    #[error("event bus is not running")]
    NotRunning,
}
