//! Structured workflow events.
//!
//! The runner reports its progress as `WorkflowEvent`s (`event`, `level`,
//! `message`, `context`). A sink decides what to do with them: log them via
//! `tracing`, forward them to a UI over a channel, or drop them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Known event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    WorkflowStarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    WorkflowCompleted,
    WorkflowCancelled,
    ArtifactNotFound,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WorkflowStarted => "workflow-started",
            EventKind::StageStarted => "stage-started",
            EventKind::StageCompleted => "stage-completed",
            EventKind::StageFailed => "stage-failed",
            EventKind::WorkflowCompleted => "workflow-completed",
            EventKind::WorkflowCancelled => "workflow-cancelled",
            EventKind::ArtifactNotFound => "artifact-not-found",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured observation emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub timestamp: DateTime<Utc>,
    pub event: EventKind,
    pub level: EventLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowEvent {
    pub fn new(event: EventKind, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            level,
            message: message.into(),
            context: serde_json::Map::new(),
        }
    }

    pub fn info(event: EventKind, message: impl Into<String>) -> Self {
        Self::new(event, EventLevel::Info, message)
    }

    pub fn warn(event: EventKind, message: impl Into<String>) -> Self {
        Self::new(event, EventLevel::Warn, message)
    }

    pub fn error(event: EventKind, message: impl Into<String>) -> Self {
        Self::new(event, EventLevel::Error, message)
    }

    /// Attach a context field.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// Consumer of workflow events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &WorkflowEvent);
}

/// Default sink: forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &WorkflowEvent) {
        let context = serde_json::Value::Object(event.context.clone());
        match event.level {
            EventLevel::Error => {
                tracing::error!(event = %event.event, context = %context, "{}", event.message)
            }
            EventLevel::Warn => {
                tracing::warn!(event = %event.event, context = %context, "{}", event.message)
            }
            EventLevel::Info => {
                tracing::info!(event = %event.event, context = %context, "{}", event.message)
            }
            EventLevel::Debug => {
                tracing::debug!(event = %event.event, context = %context, "{}", event.message)
            }
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &WorkflowEvent) {}
}

/// Forwards events over an unbounded channel, e.g. to a UI task.
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &WorkflowEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Fans every event out to several sinks.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &WorkflowEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
