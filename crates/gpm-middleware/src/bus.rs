//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Publishing never blocks, which keeps it safe to call from
//! inside the control loop's tick.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Lifecycle`] | Arm state transitions and rejected transitions |
//! | [`Topic::Safety`] | Constraint violations and safety-blocked dispatches |
//! | [`Topic::Grip`] | Grip changes and actuation failures |
//! | [`Topic::Diagnostics`] | Sequence step failures, capability and sensor faults, tick overruns |

use gpm_types::{Event, EventPayload, EventSink, GpmError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Lifecycle,
    Safety,
    Grip,
    Diagnostics,
}

impl Topic {
    /// The lane a payload is routed to.
    pub fn for_payload(payload: &EventPayload) -> Topic {
        match payload {
            EventPayload::StateTransition { .. } | EventPayload::TransitionRejected { .. } => {
                Topic::Lifecycle
            }
            EventPayload::SafetyViolation(_) | EventPayload::DispatchBlocked { .. } => {
                Topic::Safety
            }
            EventPayload::GripChanged { .. } | EventPayload::ActuationFailed { .. } => Topic::Grip,
            EventPayload::SequenceStepFailed { .. }
            | EventPayload::CapabilityFault { .. }
            | EventPayload::SensorReadFailed { .. }
            | EventPayload::TickOverrun { .. } => Topic::Diagnostics,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
///
/// Events are delivered both to their topic lane and to an "all events"
/// channel for sinks that want everything (e.g. a log shipper).
#[derive(Clone, Debug)]
pub struct EventBus {
    all: broadcast::Sender<Event>,
    lifecycle: broadcast::Sender<Event>,
    safety: broadcast::Sender<Event>,
    grip: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (lifecycle, _) = broadcast::channel(capacity);
        let (safety, _) = broadcast::channel(capacity);
        let (grip, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self {
            all,
            lifecycle,
            safety,
            grip,
            diagnostics,
        }
    }

    // -----------------------------------------------------------------------
    // Topic-based API
    // -----------------------------------------------------------------------

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`GpmError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, GpmError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| GpmError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    // -----------------------------------------------------------------------
    // All-events API
    // -----------------------------------------------------------------------

    /// Publish an event to the all-events channel only.
    pub fn publish(&self, event: Event) -> Result<usize, GpmError> {
        self.all
            .send(event)
            .map_err(|e| GpmError::Channel(format!("event bus send error: {e}")))
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Lifecycle => &self.lifecycle,
            Topic::Safety => &self.safety,
            Topic::Grip => &self.grip,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink for EventBus {
    /// Route to the payload's topic and to the all-events channel.  A lane
    /// with no subscribers is skipped; any other send failure is logged.
    fn emit(&self, event: Event) {
        let topic = Topic::for_payload(&event.payload);
        if self.topic_sender(topic).receiver_count() > 0
            && let Err(e) = self.publish_to(topic, event.clone())
        {
            debug!(topic = ?topic, error = %e, "Topic publish failed");
        }
        if self.all.receiver_count() > 0
            && let Err(e) = self.publish(event)
        {
            debug!(error = %e, "Event bus publish failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Lagged subscribers skip the dropped events and keep going; `None`
    /// means the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Blocking variant of [`recv`](Self::recv) for plain threads.  Must not
    /// be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for synchronous callers.  `None` when nothing is
    /// waiting (or the bus has closed).
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
