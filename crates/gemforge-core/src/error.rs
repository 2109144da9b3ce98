//! Core error type for the GemForge workflow engine.
//!
//! `WorkflowError` covers the three run-fatal failures of a stage
//! (unknown persona, missing artifact, agent execution) plus the errors
//! raised while loading definitions or configuring an adapter.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Persona not found: {0}")]
    UnknownPersona(String),

    #[error("Required artifact \"{name}\" not found for agent \"{persona}\"")]
    MissingArtifact { name: String, persona: String },

    #[error("Agent \"{persona}\" failed to execute. Reason: {reason}.{hint}")]
    AgentExecution {
        persona: String,
        reason: String,
        hint: String,
    },

    #[error("A workflow run is already in progress: {0}")]
    AlreadyRunning(String),

    #[error("Workflow run was cancelled")]
    Cancelled,

    #[error("Invalid definition: {0}")]
    Definition(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

const ATTACHMENT_HINT: &str = " Note: Not all models support file inputs.";

impl WorkflowError {
    /// Build an `AgentExecution` error, adding the attachment hint when the
    /// failed call carried a file.
    pub fn agent_execution(
        persona: impl Into<String>,
        reason: impl Into<String>,
        had_attachment: bool,
    ) -> Self {
        WorkflowError::AgentExecution {
            persona: persona.into(),
            reason: reason.into(),
            hint: if had_attachment {
                ATTACHMENT_HINT.to_string()
            } else {
                String::new()
            },
        }
    }

    /// Name of the artifact a `MissingArtifact` error refers to.
    pub fn missing_artifact(&self) -> Option<&str> {
        match self {
            WorkflowError::MissingArtifact { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Short machine-readable kind, used as log context.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::UnknownPersona(_) => "unknown_persona",
            WorkflowError::MissingArtifact { .. } => "missing_artifact",
            WorkflowError::AgentExecution { .. } => "agent_execution",
            WorkflowError::AlreadyRunning(_) => "already_running",
            WorkflowError::Cancelled => "cancelled",
            WorkflowError::Definition(_) => "definition",
            WorkflowError::Config(_) => "config",
        }
    }
}
