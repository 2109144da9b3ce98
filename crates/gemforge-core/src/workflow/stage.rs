//! Stage executor — runs every agent of one stage concurrently.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::events::{EventKind, EventSink, WorkflowEvent};
use crate::workflow::agent_caller::{AgentExecutor, Attachment};
use crate::workflow::artifacts::ArtifactStore;
use crate::workflow::persona::{Persona, PersonaLibrary};
use crate::workflow::schema::{AgentAssignment, Stage};
use crate::workflow::state::AgentResult;
use crate::workflow::template;

/// Everything a stage needs from its run besides the stage itself.
pub struct StageInput<'a> {
    pub run_id: &'a str,
    /// Snapshot of the artifacts published by earlier stages
    pub artifacts: &'a ArtifactStore,
    pub personas: &'a PersonaLibrary,
    /// Attachment that travels with the initial prompt
    pub attachment: Option<&'a Attachment>,
    pub cancel: &'a CancellationToken,
}

/// A fully resolved agent call, ready to dispatch.
#[derive(Debug, Clone)]
struct PreparedCall<'a> {
    assignment: &'a AgentAssignment,
    /// Base persona name, reported in results and errors
    persona_name: String,
    effective: Persona,
    prompt: String,
    attachment: Option<&'a Attachment>,
}

pub struct StageExecutor {
    executor: Arc<dyn AgentExecutor>,
    events: Arc<dyn EventSink>,
}

impl StageExecutor {
    pub fn new(executor: Arc<dyn AgentExecutor>, events: Arc<dyn EventSink>) -> Self {
        Self { executor, events }
    }

    /// Execute all agents of `stage`.
    ///
    /// Every assignment is prepared before anything is dispatched, so an
    /// unknown persona or missing artifact fails the stage without calling
    /// any agent. The first dispatched call to fail fails the stage at once:
    /// siblings still in flight are dropped along with any output they
    /// already produced. If the run was cancelled while calls were in
    /// flight, the results are dropped and `WorkflowError::Cancelled` is
    /// returned.
    ///
    /// On success the results are in assignment order, one per assignment.
    pub async fn execute(
        &self,
        stage: &Stage,
        input: StageInput<'_>,
    ) -> Result<Vec<AgentResult>, WorkflowError> {
        let calls = stage
            .parallel_agents
            .iter()
            .map(|assignment| self.prepare(stage, assignment, &input))
            .collect::<Result<Vec<_>, _>>()?;

        if input.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        tracing::debug!(
            "[StageExecutor] Dispatching {} agent(s) for stage '{}'",
            calls.len(),
            stage.name
        );

        let mut in_flight: FuturesUnordered<_> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| async move { (index, self.dispatch(call).await) })
            .collect();

        let mut results: Vec<Option<AgentResult>> = vec![None; calls.len()];

        while let Some((index, outcome)) = in_flight.next().await {
            match outcome {
                Ok(result) => results[index] = Some(result),
                Err(e) => {
                    tracing::warn!(
                        "[StageExecutor] Agent '{}' in stage '{}' failed: {} ({} sibling call(s) abandoned)",
                        calls[index].persona_name,
                        stage.name,
                        e,
                        in_flight.len()
                    );
                    if input.cancel.is_cancelled() {
                        return Err(WorkflowError::Cancelled);
                    }
                    return Err(e);
                }
            }
        }

        if input.cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn prepare<'a>(
        &self,
        stage: &Stage,
        assignment: &'a AgentAssignment,
        input: &StageInput<'a>,
    ) -> Result<PreparedCall<'a>, WorkflowError> {
        let base = input
            .personas
            .get(&assignment.persona_ref)
            .ok_or_else(|| WorkflowError::UnknownPersona(assignment.persona_ref.clone()))?;

        let effective = base.effective(assignment.system_prompt_override.as_deref());

        let prompt = template::resolve(&assignment.prompt_template, input.artifacts).map_err(
            |missing| {
                self.events.emit(
                    &WorkflowEvent::error(
                        EventKind::ArtifactNotFound,
                        "Required artifact not found for agent.",
                    )
                    .with("workflowRunId", input.run_id)
                    .with("stageId", stage.stage_id.as_str())
                    .with("agentAssignmentId", assignment.assignment_id.as_str())
                    .with("personaName", base.name.as_str())
                    .with("missingArtifact", missing.as_str())
                    .with("availableArtifacts", input.artifacts.names()),
                );
                WorkflowError::MissingArtifact {
                    name: missing,
                    persona: base.name.clone(),
                }
            },
        )?;

        let attachment = if assignment.uses_initial_prompt() {
            input.attachment
        } else {
            None
        };

        Ok(PreparedCall {
            assignment,
            persona_name: base.name.clone(),
            effective,
            prompt,
            attachment,
        })
    }

    async fn dispatch(&self, call: &PreparedCall<'_>) -> Result<AgentResult, WorkflowError> {
        let output = self
            .executor
            .execute(
                &call.effective,
                &call.assignment.model,
                &call.prompt,
                call.attachment,
            )
            .await?;

        Ok(AgentResult {
            assignment_id: call.assignment.assignment_id.clone(),
            persona_name: call.persona_name.clone(),
            model: call.assignment.model.clone(),
            output,
            timestamp: Utc::now(),
            output_artifact_name: call.assignment.output_artifact_name.clone(),
        })
    }
}
