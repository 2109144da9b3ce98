//! Workflow engine — gems of parallel agent stages.
//!
//! A gem is an ordered list of stages. Every agent in a stage runs
//! concurrently against a snapshot of the artifacts produced so far, and
//! publishes its output under a named artifact for later stages.
//!
//! # Architecture
//!
//! ```text
//! gem.yaml ──► Gem ──► WorkflowRunner ──► StageExecutor
//!                          │                   │
//!   personas.yaml ──► PersonaLibrary      template::resolve
//!                          │                   │
//!                     ArtifactStore       AgentExecutor (GeminiAgentCaller)
//! ```

pub mod agent_caller;
pub mod artifacts;
pub mod persona;
pub mod runner;
pub mod schema;
pub mod stage;
pub mod state;
pub mod template;

/// Artifact seeded with the user's prompt at the start of every run.
pub const INITIAL_PROMPT_ARTIFACT_NAME: &str = "INITIAL_PROMPT";

/// Artifact whose content becomes the run's final output.
pub const FINAL_OUTPUT_ARTIFACT_NAME: &str = "Final_Answer";

/// Final output of a run that completed without writing `Final_Answer`.
pub const NO_FINAL_OUTPUT_PLACEHOLDER: &str =
    "Workflow completed, but no final output was generated.";

pub use agent_caller::{AgentExecutor, Attachment, GeminiAgentCaller, GeminiConfig};
pub use artifacts::ArtifactStore;
pub use persona::{Persona, PersonaLibrary};
pub use runner::WorkflowRunner;
pub use schema::{builtin_gem, builtin_gems, AgentAssignment, Gem, Stage};
pub use stage::{StageExecutor, StageInput};
pub use state::{AgentResult, RunStatus, StageResult, WorkflowRun};
