//! Message Bus for task events
//!
//! The MessageBus is the engine's [`EventSink`]: the controller emits task
//! events into it and front ends (the CLI, a WebSocket bridge) subscribe to
//! the event types they care about. Each subscriber gets a bounded channel.
//! A subscriber that falls behind loses progress events rather than
//! stalling the task loop. Terminal events (`task:completed`,
//! `task:failed`) are always delivered and wait for room in the channel.
//! Closed subscribers are pruned on the next publish.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use sdk::events::TaskEvent;
use sdk::ports::EventSink;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be subscribed to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    TaskStarted,
    TaskStep,
    ConfirmationRequired,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    /// Subscribe to all event types
    All,
}

impl EventType {
    pub fn of(event: &TaskEvent) -> Self {
        match event {
            TaskEvent::Started { .. } => EventType::TaskStarted,
            TaskEvent::Step { .. } => EventType::TaskStep,
            TaskEvent::ConfirmationRequired { .. } => EventType::ConfirmationRequired,
            TaskEvent::Completed { .. } => EventType::TaskCompleted,
            TaskEvent::Failed { .. } => EventType::TaskFailed,
            TaskEvent::Cancelled { .. } => EventType::TaskCancelled,
        }
    }
}

/// A task event addressed to a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: String,
    pub event: TaskEvent,
}

impl SessionEvent {
    pub fn event_type(&self) -> EventType {
        EventType::of(&self.event)
    }
}

/// Pub/sub fan-out of task events
pub struct MessageBus {
    /// Subscribers per event type
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<SessionEvent>>>>>,
}

impl MessageBus {
    /// Create a new MessageBus
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to its type's subscribers and to `All` subscribers
    pub async fn publish(&self, event: SessionEvent) {
        if event.event.is_terminal() {
            self.publish_terminal(event).await;
            return;
        }

        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            "Subscriber for {:?} is full, dropping {}",
                            key,
                            event.event.name()
                        );
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Deliver a terminal event to every live subscriber, waiting for room
    async fn publish_terminal(&self, event: SessionEvent) {
        let targets: Vec<mpsc::Sender<SessionEvent>> = {
            let mut channels = self.channels.lock().await;
            let mut targets = Vec::new();
            for key in [event.event_type(), EventType::All] {
                if let Some(subscribers) = channels.get_mut(&key) {
                    subscribers.retain(|tx| !tx.is_closed());
                    targets.extend(subscribers.iter().cloned());
                }
            }
            targets
        };

        for tx in targets {
            if tx.send(event.clone()).await.is_err() {
                debug!("Subscriber closed before {}", event.event.name());
            }
        }
    }

    /// Number of live subscribers for an event type
    pub async fn subscriber_count(&self, event_type: EventType) -> usize {
        self.channels
            .lock()
            .await
            .get(&event_type)
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for MessageBus {
    async fn emit(&self, session_id: &str, event: TaskEvent) {
        self.publish(SessionEvent {
            session_id: session_id.to_string(),
            event,
        })
        .await;
    }
}
