use crate::camera::CameraStatus;
use crate::error::EventBusError;
use crate::settings::AppSettings;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Events crossing the overlay's asynchronous message boundary.
///
/// Key and status events are pushed by the native host (or the terminal
/// stand-in); settings updates are fanned out to every window so they all
/// observe the same persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum OverlayEvent {
    /// A key went down. Duplicate presses for the same key may arrive before
    /// any release.
    KeyPressed {
        key: String,
        modifiers: Vec<String>,
        timestamp: u64,
    },
    /// A key came back up. Delivery is not guaranteed; consumers must bound
    /// their own staleness.
    KeyReleased {
        key: String,
        modifiers: Vec<String>,
        timestamp: u64,
    },
    /// The persisted settings changed somewhere (settings window, tray, ...).
    SettingsUpdated { settings: AppSettings },
    /// Accessibility permission state reported by the host key tap.
    AccessibilityStatus { granted: bool },
    /// Whether the low-level key event tap is delivering events.
    EventTapStatus { active: bool },
    /// Camera preview status for the overlay's status line.
    CameraStatusChanged { status: CameraStatus },
    /// System shutdown requested.
    ShutdownRequested {
        reason: String,
        timestamp: SystemTime,
    },
}

impl OverlayEvent {
    /// Event type as a string for filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            OverlayEvent::KeyPressed { .. } => "key_pressed",
            OverlayEvent::KeyReleased { .. } => "key_released",
            OverlayEvent::SettingsUpdated { .. } => "settings_updated",
            OverlayEvent::AccessibilityStatus { .. } => "accessibility_status",
            OverlayEvent::EventTapStatus { .. } => "event_tap_status",
            OverlayEvent::CameraStatusChanged { .. } => "camera_status_changed",
            OverlayEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }

    /// Human-readable description for logging.
    pub fn description(&self) -> String {
        match self {
            OverlayEvent::KeyPressed { key, .. } => format!("Key pressed: {}", key),
            OverlayEvent::KeyReleased { key, .. } => format!("Key released: {}", key),
            OverlayEvent::SettingsUpdated { .. } => "Settings updated".to_string(),
            OverlayEvent::AccessibilityStatus { granted } => {
                format!(
                    "Accessibility permission {}",
                    if *granted { "granted" } else { "denied" }
                )
            }
            OverlayEvent::EventTapStatus { active } => {
                format!(
                    "Key event tap {}",
                    if *active { "active" } else { "inactive" }
                )
            }
            OverlayEvent::CameraStatusChanged { status } => {
                format!("Camera status: {}", status)
            }
            OverlayEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }
}

/// Async event bus for cross-window coordination using broadcast channels.
pub struct EventBus {
    sender: broadcast::Sender<OverlayEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events and get a raw receiver.
    pub fn subscribe_raw(&self) -> broadcast::Receiver<OverlayEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter. Dropping the returned [`Subscription`] is the
    /// unsubscription; no explicit teardown call is needed on error paths.
    pub fn subscribe(&self, filter: EventFilter, name: impl Into<String>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter,
            name: name.into(),
        }
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: OverlayEvent) -> Result<usize, EventBusError> {
        match &event {
            OverlayEvent::KeyPressed { key, .. } => trace!("Key pressed: {}", key),
            OverlayEvent::KeyReleased { key, .. } => trace!("Key released: {}", key),
            OverlayEvent::SettingsUpdated { .. } => debug!("Settings updated"),
            OverlayEvent::AccessibilityStatus { granted } => {
                if *granted {
                    info!("Accessibility permission granted");
                } else {
                    warn!("Accessibility permission denied - key display will be inert");
                }
            }
            OverlayEvent::EventTapStatus { active } => {
                if *active {
                    info!("Key event tap active");
                } else {
                    warn!("Key event tap inactive");
                }
            }
            OverlayEvent::CameraStatusChanged { status } => {
                info!("Camera status changed: {}", status);
            }
            OverlayEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling.
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events.
    All,
    /// Accept only specific event types.
    EventTypes(Vec<&'static str>),
    /// Custom filter function.
    Custom(fn(&OverlayEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &OverlayEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }

    /// Filter for the key press/release stream.
    pub fn key_events() -> Self {
        EventFilter::EventTypes(vec!["key_pressed", "key_released"])
    }

    /// Filter for settings pushes.
    pub fn settings() -> Self {
        EventFilter::EventTypes(vec!["settings_updated"])
    }
}

/// A named, filtered event subscription. The drop of the subscription is its
/// unsubscription, so every exit path of a consumer releases it.
pub struct Subscription {
    receiver: broadcast::Receiver<OverlayEvent>,
    filter: EventFilter,
    name: String,
}

impl Subscription {
    /// Receive the next event matching the filter.
    pub async fn recv(&mut self) -> Result<OverlayEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        trace!(
                            "Subscription '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Subscription '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { count: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for subscription '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Result<Option<OverlayEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Subscription '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { count: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed)
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn key_pressed(key: &str) -> OverlayEvent {
        OverlayEvent::KeyPressed {
            key: key.to_string(),
            modifiers: Vec::new(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(16);
        let mut receiver = event_bus.subscribe_raw();

        let subscriber_count = event_bus.publish(key_pressed("A")).await.unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            OverlayEvent::KeyPressed { key, .. } => assert_eq!(key, "A"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_observe_same_event() {
        let event_bus = EventBus::new(16);
        let mut receiver1 = event_bus.subscribe_raw();
        let mut receiver2 = event_bus.subscribe_raw();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(key_pressed("B")).await.unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_filtered_subscription_skips_other_events() {
        let event_bus = EventBus::new(16);
        let mut subscription = event_bus.subscribe(EventFilter::key_events(), "keys");

        event_bus
            .publish(OverlayEvent::EventTapStatus { active: true })
            .await
            .unwrap();
        event_bus.publish(key_pressed("C")).await.unwrap();

        let received = timeout(Duration::from_millis(100), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        match received {
            OverlayEvent::KeyPressed { key, .. } => assert_eq!(key, "C"),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let event_bus = EventBus::new(16);
        let mut subscription = event_bus.subscribe(EventFilter::All, "empty");
        assert!(subscription.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_properties() {
        let event = key_pressed("Space");
        assert_eq!(event.event_type(), "key_pressed");
        assert!(event.description().contains("Space"));
        assert!(EventFilter::key_events().matches(&event));
        assert!(!EventFilter::settings().matches(&event));
    }

    #[tokio::test]
    async fn test_drop_is_unsubscribe() {
        let event_bus = EventBus::new(16);
        let subscription = event_bus.subscribe(EventFilter::All, "scoped");
        assert_eq!(event_bus.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(event_bus.subscriber_count(), 0);
    }
}
