#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! The runtime's central event bus: priority-ordered delivery,
//! content-based deduplication, subscription-based routing, and a
//! dead-letter queue for handlers that keep failing.

mod bus;
mod error;
mod event;
mod subscription;

pub use bus::{BusConfig, BusMetrics, DlqEntry, EventBus};
pub use error::BusError;
pub use event::{compute_dedup_key, Event, EventPriority, Payload, PayloadValue};
pub use subscription::{EventHandler, FnHandler, Subscription};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    fn event(event_type: &str, source: &str, priority: EventPriority) -> Event {
        Event::new(event_type, source, Payload::new()).with_priority(priority)
    }

    #[tokio::test]
    async fn duplicate_events_within_window_are_suppressed() {
        let bus = EventBus::new(BusConfig::default());
        let first = event("http_check", "http_monitor:a", EventPriority::High);
        let mut second = first.clone();
        second.event_id = uuid::Uuid::new_v4();

        assert!(bus.publish(first));
        assert!(!bus.publish(second));
        assert_eq!(bus.metrics().events_deduplicated, 1);
    }

    #[tokio::test]
    async fn handlers_receive_published_events_in_priority_order() {
        let bus = EventBus::new(BusConfig::default());
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);

        bus.subscribe(
            Arc::new(FnHandler::new(move |evt: &Event| {
                received_clone.lock().push(evt.priority);
                Ok(())
            })),
            [],
            None,
            None,
        );

        bus.start();
        bus.publish(event("a", "s1", EventPriority::Low));
        bus.publish(event("b", "s2", EventPriority::Critical));
        bus.publish(event("c", "s3", EventPriority::Medium));

        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.stop().await;

        let order = received.lock().clone();
        assert_eq!(
            order,
            vec![EventPriority::Critical, EventPriority::Medium, EventPriority::Low]
        );
    }

    #[tokio::test]
    async fn failing_handler_lands_in_dlq_after_retries() {
        let mut config = BusConfig::default();
        config.max_retries = 2;
        config.retry_delay = Duration::from_millis(1);
        let bus = EventBus::new(config);

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        bus.subscribe(
            Arc::new(FnHandler::new(move |_evt: &Event| {
                attempts_clone.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("boom")
            })),
            [],
            None,
            None,
        );

        bus.start();
        bus.publish(event("will_fail", "tester", EventPriority::Medium));
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.stop().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(bus.metrics().events_failed, 1);
        assert_eq!(bus.dlq(10).len(), 1);
    }

    #[tokio::test]
    async fn replay_from_dlq_republishes_event() {
        let mut config = BusConfig::default();
        config.max_retries = 1;
        let bus = EventBus::new(config);

        bus.subscribe(
            Arc::new(FnHandler::new(|_evt: &Event| anyhow::bail!("boom"))),
            [],
            None,
            None,
        );

        bus.start();
        let published = event("will_fail", "tester", EventPriority::Medium);
        let event_id = published.event_id;
        bus.publish(published);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(bus.dlq(10).len(), 1);
        assert!(bus.replay_from_dlq(event_id));
        assert_eq!(bus.dlq(10).len(), 0);
        bus.stop().await;
    }

    #[test]
    fn subscription_priority_filter_excludes_lower_priority_events() {
        let sub = Subscription {
            subscription_id: uuid::Uuid::new_v4(),
            event_types: indexmap::IndexSet::new(),
            priority_filter: Some(EventPriority::High),
            source_filter: None,
            handler: Arc::new(FnHandler::new(|_: &Event| Ok(()))),
        };
        let high = event("x", "s", EventPriority::High);
        let low = event("x", "s", EventPriority::Low);
        assert!(sub.accepts(&high));
        assert!(!sub.accepts(&low));
    }
}
