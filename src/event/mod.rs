//! Event system for async notifications.
//!
//! The event system delivers connection changes and sensor updates from the
//! drone to any number of subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::catalog::Command;

/// Event types that can be dispatched.
#[derive(Debug, Clone)]
pub enum Event {
    /// Connection established.
    Connected,
    /// Connection lost or closed.
    Disconnected,
    /// A sensor value was received. Carries a copy of the stored command.
    Sensor(Box<Command>),
}

impl Event {
    /// Returns the `project/class/command` token of a sensor event.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        match self {
            Self::Sensor(command) => Some(command.token()),
            Self::Connected | Self::Disconnected => None,
        }
    }

    /// Returns the event name, `sensor:<token>` for sensor updates.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Connected => "connected".into(),
            Self::Disconnected => "disconnected".into(),
            Self::Sensor(command) => format!("sensor:{}", command.token()),
        }
    }
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    filter: Option<EventFilter>,
}

impl Subscription {
    /// Receives the next event that passes the subscription filter.
    ///
    /// Returns `None` once the dispatcher is gone. Events missed because
    /// the subscriber lagged behind are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.as_ref().is_none_or(|f| f.matches(&event)) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("subscription lagged, skipped {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Subscription filter for specific event types.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only sensor events for these tokens.
    pub tokens: Option<Vec<String>>,
    /// Only sensor events.
    pub sensors_only: bool,
    /// Only `Connected`/`Disconnected`.
    pub connection_only: bool,
}

impl EventFilter {
    /// Creates a filter for sensor events of one token.
    #[must_use]
    pub fn sensor(token: impl Into<String>) -> Self {
        Self {
            tokens: Some(vec![token.into()]),
            sensors_only: true,
            connection_only: false,
        }
    }

    /// Creates a filter for sensor events of several tokens.
    #[must_use]
    pub fn tokens(tokens: Vec<String>) -> Self {
        Self {
            tokens: Some(tokens),
            sensors_only: true,
            connection_only: false,
        }
    }

    /// Creates a filter for all sensor events.
    #[must_use]
    pub const fn sensors() -> Self {
        Self {
            tokens: None,
            sensors_only: true,
            connection_only: false,
        }
    }

    /// Creates a filter for connection state changes.
    #[must_use]
    pub const fn connection() -> Self {
        Self {
            tokens: None,
            sensors_only: false,
            connection_only: true,
        }
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match event {
            Event::Connected | Event::Disconnected => !self.sensors_only,
            Event::Sensor(command) => {
                if self.connection_only {
                    return false;
                }
                match self.tokens {
                    Some(ref tokens) => {
                        let token = command.token();
                        tokens.iter().any(|t| *t == token)
                    }
                    None => true,
                }
            }
        }
    }
}

struct EventDispatcherInner {
    sender: broadcast::Sender<Event>,
}

/// Dispatches events to subscribers.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<EventDispatcherInner>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(EventDispatcherInner { sender }),
        }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: Event) {
        tracing::trace!("dispatching {}", event.name());
        // No receivers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to events with an optional filter.
    #[must_use]
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        Subscription {
            receiver: self.inner.sender.subscribe(),
            filter,
        }
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the channel is closed.
    pub async fn wait_for(
        &self,
        filter: EventFilter,
        timeout: std::time::Duration,
    ) -> Option<Event> {
        let mut subscription = self.subscribe(Some(filter));

        tokio::select! {
            biased;
            result = subscription.recv() => result,
            () = tokio::time::sleep(timeout) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn battery() -> Event {
        let catalog = Catalog::builtin();
        let command = catalog
            .decode_frame(&[0x00, 0x05, 0x01, 0x00, 50])
            .unwrap();
        Event::Sensor(Box::new(command))
    }

    #[tokio::test]
    async fn test_event_dispatch() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe(None);

        dispatcher.dispatch(Event::Connected);

        let event = tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
            .await
            .unwrap();

        assert!(matches!(event, Some(Event::Connected)));
    }

    #[test]
    fn test_event_filter() {
        let event = battery();
        assert_eq!(event.name(), "sensor:common/CommonState/BatteryStateChanged");

        assert!(EventFilter::sensor("common/CommonState/BatteryStateChanged").matches(&event));
        assert!(!EventFilter::sensor("common/CommonState/WifiSignalChanged").matches(&event));
        assert!(EventFilter::sensors().matches(&event));
        assert!(!EventFilter::sensors().matches(&Event::Connected));
        assert!(EventFilter::connection().matches(&Event::Disconnected));
        assert!(!EventFilter::connection().matches(&event));
        assert!(EventFilter::default().matches(&event));
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe(Some(EventFilter::sensors()));

        dispatcher.dispatch(Event::Connected);
        dispatcher.dispatch(battery());

        let event = sub.recv().await.unwrap();
        assert_eq!(
            event.token().as_deref(),
            Some("common/CommonState/BatteryStateChanged")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out() {
        let dispatcher = EventDispatcher::new(16);
        let result = dispatcher
            .wait_for(EventFilter::sensors(), std::time::Duration::from_secs(1))
            .await;
        assert!(result.is_none());
    }
}
