use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use uuid::Uuid;

use crate::event::{Event, EventPriority};

/// Handler invoked for events matching a [`Subscription`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles a single event. A returned error sends the event
    /// through the bus's retry-then-dead-letter path.
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Adapts a plain closure into an [`EventHandler`], for tests and
/// simple subscriptions that don't need their own type.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    /// Wraps `f` as an [`EventHandler`].
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event)
    }
}

/// A registered interest in events flowing through the bus.
pub struct Subscription {
    /// Identifier returned from `subscribe`, used to `unsubscribe`.
    pub subscription_id: Uuid,
    /// Event types this subscription cares about. Empty means "all types".
    pub event_types: IndexSet<String>,
    /// Only deliver events at or above this priority (lower ordinal = higher priority).
    pub priority_filter: Option<EventPriority>,
    /// Only deliver events from this exact source.
    pub source_filter: Option<String>,
    /// The handler to invoke.
    pub handler: Arc<dyn EventHandler>,
}

impl Subscription {
    /// Returns whether `event` should be delivered to this subscription.
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        if let Some(filter) = self.priority_filter {
            if event.priority > filter {
                return false;
            }
        }
        if let Some(source) = &self.source_filter {
            if source != &event.source {
                return false;
            }
        }
        true
    }
}
