//! Command lifecycle events
//!
//! Every Data API command and every admin operation publishes typed events on
//! a broadcast channel. Publishing never waits: with no subscribers the event
//! is discarded, and subscribers that fall behind lose the oldest events
//! (`RecvError::Lagged`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Identity and timestamp shared by every event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMeta {
    pub request_id: Uuid,
    pub at: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            at: Utc::now(),
        }
    }
}

/// Lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    CommandStarted {
        meta: EventMeta,
        command_name: String,
        target: String,
        timeout: Duration,
    },
    CommandSucceeded {
        meta: EventMeta,
        command_name: String,
        target: String,
        duration: Duration,
    },
    CommandFailed {
        meta: EventMeta,
        command_name: String,
        target: String,
        duration: Duration,
        error: String,
    },
    CommandWarnings {
        meta: EventMeta,
        command_name: String,
        warnings: Vec<String>,
    },
    AdminCommandStarted {
        meta: EventMeta,
        operation: String,
        blocking: bool,
    },
    AdminCommandPolling {
        meta: EventMeta,
        operation: String,
        elapsed: Duration,
        interval: Duration,
        observed: String,
    },
    AdminCommandSucceeded {
        meta: EventMeta,
        operation: String,
        duration: Duration,
    },
    AdminCommandFailed {
        meta: EventMeta,
        operation: String,
        duration: Duration,
        error: String,
    },
}

impl CommandEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            CommandEvent::CommandStarted { meta, .. }
            | CommandEvent::CommandSucceeded { meta, .. }
            | CommandEvent::CommandFailed { meta, .. }
            | CommandEvent::CommandWarnings { meta, .. }
            | CommandEvent::AdminCommandStarted { meta, .. }
            | CommandEvent::AdminCommandPolling { meta, .. }
            | CommandEvent::AdminCommandSucceeded { meta, .. }
            | CommandEvent::AdminCommandFailed { meta, .. } => meta,
        }
    }

    /// Short event name, e.g. for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            CommandEvent::CommandStarted { .. } => "commandStarted",
            CommandEvent::CommandSucceeded { .. } => "commandSucceeded",
            CommandEvent::CommandFailed { .. } => "commandFailed",
            CommandEvent::CommandWarnings { .. } => "commandWarnings",
            CommandEvent::AdminCommandStarted { .. } => "adminCommandStarted",
            CommandEvent::AdminCommandPolling { .. } => "adminCommandPolling",
            CommandEvent::AdminCommandSucceeded { .. } => "adminCommandSucceeded",
            CommandEvent::AdminCommandFailed { .. } => "adminCommandFailed",
        }
    }
}

/// Cloneable publisher handle.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CommandEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.sender.subscribe()
    }

    /// Publish without waiting; dropped when nobody listens.
    pub fn emit(&self, event: CommandEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
