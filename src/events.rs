use crate::error::EventBusError;
use crate::recorder::StopReason;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur in the motion camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MotionEvent {
    /// The processing loop started
    Armed { timestamp: SystemTime },
    /// The processing loop stopped
    Disarmed { timestamp: SystemTime },
    /// A motion episode opened its first segment
    RecordingStarted { episode: Uuid, segment: PathBuf },
    /// The open segment reached its maximum length and was replaced
    SegmentRolledOver {
        episode: Uuid,
        closed: PathBuf,
        opened: PathBuf,
    },
    /// The episode's segment was closed
    RecordingStopped { episode: Uuid, reason: StopReason },
    /// A still and mail were queued for delivery
    NotificationQueued { episode: Uuid },
    /// The operator was mailed
    NotificationSent { episode: Uuid, image: PathBuf },
    /// Notification delivery failed and was dropped
    NotificationFailed { episode: Uuid, error: String },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
}

impl MotionEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            MotionEvent::Armed { .. } => "Camera armed".to_string(),
            MotionEvent::Disarmed { .. } => "Camera disarmed".to_string(),
            MotionEvent::RecordingStarted { episode, segment } => {
                format!("Recording {} to {}", episode, segment.display())
            }
            MotionEvent::SegmentRolledOver {
                episode, opened, ..
            } => {
                format!("Episode {} rolled over to {}", episode, opened.display())
            }
            MotionEvent::RecordingStopped { episode, reason } => {
                format!("Recording {} stopped: {:?}", episode, reason)
            }
            MotionEvent::NotificationQueued { episode } => {
                format!("Notification queued for {}", episode)
            }
            MotionEvent::NotificationSent { episode, image } => {
                format!("Notification for {} sent with {}", episode, image.display())
            }
            MotionEvent::NotificationFailed { episode, error } => {
                format!("Notification for {} failed: {}", episode, error)
            }
            MotionEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            MotionEvent::Armed { .. } => "armed",
            MotionEvent::Disarmed { .. } => "disarmed",
            MotionEvent::RecordingStarted { .. } => "recording_started",
            MotionEvent::SegmentRolledOver { .. } => "segment_rolled_over",
            MotionEvent::RecordingStopped { .. } => "recording_stopped",
            MotionEvent::NotificationQueued { .. } => "notification_queued",
            MotionEvent::NotificationSent { .. } => "notification_sent",
            MotionEvent::NotificationFailed { .. } => "notification_failed",
            MotionEvent::SystemError { .. } => "system_error",
        }
    }
}

/// Broadcast event bus shared by the processing loop and the notification worker.
///
/// Publishing never blocks, so the loop thread can publish without a runtime.
pub struct EventBus {
    sender: broadcast::Sender<MotionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<MotionEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: MotionEvent) -> Result<usize, EventBusError> {
        match &event {
            MotionEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            MotionEvent::NotificationFailed { episode, error } => {
                warn!("Notification for {} failed: {}", episode, error);
            }
            MotionEvent::Armed { .. } | MotionEvent::Disarmed { .. } => {
                info!("{}", event.description());
            }
            _ => debug!("Event: {}", event.description()),
        }

        if self.sender.receiver_count() == 0 {
            return Ok(0);
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept events from specific components (for SystemError events)
    Components(Vec<String>),
    /// Events concerning one episode
    Episode(Uuid),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &MotionEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Components(components) => {
                if let MotionEvent::SystemError { component, .. } = event {
                    components.contains(component)
                } else {
                    false
                }
            }
            EventFilter::Episode(id) => match event {
                MotionEvent::RecordingStarted { episode, .. }
                | MotionEvent::SegmentRolledOver { episode, .. }
                | MotionEvent::RecordingStopped { episode, .. }
                | MotionEvent::NotificationQueued { episode }
                | MotionEvent::NotificationSent { episode, .. }
                | MotionEvent::NotificationFailed { episode, .. } => episode == id,
                _ => false,
            },
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<MotionEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<MotionEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<MotionEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::Closed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<MotionEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::Closed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let episode = Uuid::new_v4();
        let subscriber_count = event_bus
            .publish(MotionEvent::NotificationQueued { episode })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            MotionEvent::NotificationQueued { episode: received } => {
                assert_eq!(received, episode);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() {
        let event_bus = EventBus::new(10);
        let delivered = event_bus
            .publish(MotionEvent::Armed {
                timestamp: SystemTime::now(),
            })
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_publish_from_plain_thread() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let publisher = event_bus.clone();
        std::thread::spawn(move || {
            publisher
                .publish(MotionEvent::Disarmed {
                    timestamp: SystemTime::now(),
                })
                .unwrap();
        })
        .join()
        .unwrap();

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type(), "disarmed");
    }

    #[test]
    fn test_event_filter() {
        let episode = Uuid::new_v4();
        let stopped = MotionEvent::RecordingStopped {
            episode,
            reason: StopReason::MotionEnded,
        };
        let error = MotionEvent::SystemError {
            component: "camera".to_string(),
            error: "stalled".to_string(),
        };

        let by_type = EventFilter::EventTypes(vec!["recording_stopped"]);
        assert!(by_type.matches(&stopped));
        assert!(!by_type.matches(&error));

        let by_component = EventFilter::Components(vec!["camera".to_string()]);
        assert!(by_component.matches(&error));
        assert!(!by_component.matches(&stopped));

        assert!(EventFilter::Episode(episode).matches(&stopped));
        assert!(!EventFilter::Episode(Uuid::new_v4()).matches(&stopped));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered = event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["notification_sent"]),
            "test",
        );

        let episode = Uuid::new_v4();
        event_bus
            .publish(MotionEvent::NotificationQueued { episode })
            .unwrap();
        event_bus
            .publish(MotionEvent::NotificationSent {
                episode,
                image: PathBuf::from("image/a.jpeg"),
            })
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(received, MotionEvent::NotificationSent { .. }));
        assert_eq!(filtered.try_recv().unwrap().map(|e| e.event_type()), None);
    }

    #[test]
    fn test_event_properties() {
        let event = MotionEvent::SystemError {
            component: "encoder".to_string(),
            error: "disk full".to_string(),
        };

        assert_eq!(event.event_type(), "system_error");
        assert!(event.description().contains("disk full"));
    }
}
