// Events module
// Notifications and state changes the front end listens to

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{FileId, FileStatus};
use crate::services::tts::generation::GenerationPhase;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// User-visible message
    Notification {
        level: NotificationLevel,
        message: String,
    },
    GenerationPhaseChanged {
        phase: GenerationPhase,
    },
    FileStatusChanged {
        id: FileId,
        status: FileStatus,
        error: Option<String>,
    },
    FileRemoved {
        id: FileId,
    },
    BatchCompleted {
        index: usize,
        total: usize,
        succeeded: usize,
        failed: usize,
    },
}

/// Broadcast bus. Emitting with no subscribers is not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to every subscriber
    pub fn emit(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NotificationLevel::Error => error!("{}", message),
            NotificationLevel::Warning => warn!("{}", message),
            _ => info!("{}", message),
        }
        self.emit(AppEvent::Notification { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.success("Speech generated successfully!");

        match rx.recv().await.unwrap() {
            AppEvent::Notification { level, message } => {
                assert_eq!(level, NotificationLevel::Success);
                assert_eq!(message, "Speech generated successfully!");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.info("nobody listens");
    }

    #[test]
    fn test_event_serialization() {
        let event = AppEvent::FileRemoved { id: FileId::from("file_1") };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "file_removed");
        assert_eq!(json["id"], "file_1");
    }
}
