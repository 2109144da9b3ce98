//! Gemforge Core — multi-agent workflow engine.
//!
//! Gems chain stages of parallel LLM agents through a shared artifact
//! store. The engine is transport-agnostic: model calls go through the
//! [`AgentExecutor`](workflow::AgentExecutor) trait and progress is reported
//! through an [`EventSink`](events::EventSink), so the same runner drives
//! the CLI, tests with scripted agents, or any other front end.

pub mod error;
pub mod events;
pub mod workflow;

// Convenience re-exports
pub use error::WorkflowError;
pub use events::{EventKind, EventSink, WorkflowEvent};
pub use workflow::{Gem, PersonaLibrary, RunStatus, WorkflowRun, WorkflowRunner};
