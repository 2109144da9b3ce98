//! Workflow runner — drives a gem's stages in order and owns the run state.
//!
//! The current run lives inside a `watch` channel: every transition (stage
//! start, stage merge, terminal state) is a single `send_if_modified`, so
//! subscribers always see a consistent snapshot. `stop()` is synchronous
//! and can be called from any task while `run()` is awaiting agents.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::events::{EventKind, EventSink, TracingSink, WorkflowEvent};
use crate::workflow::agent_caller::{AgentExecutor, Attachment};
use crate::workflow::artifacts::ArtifactStore;
use crate::workflow::persona::PersonaLibrary;
use crate::workflow::schema::Gem;
use crate::workflow::stage::{StageExecutor, StageInput};
use crate::workflow::state::{RunStatus, StageResult, WorkflowRun};
use crate::workflow::{FINAL_OUTPUT_ARTIFACT_NAME, NO_FINAL_OUTPUT_PLACEHOLDER};

pub struct WorkflowRunner {
    executor: Arc<dyn AgentExecutor>,
    personas: Arc<PersonaLibrary>,
    events: Arc<dyn EventSink>,
    state: watch::Sender<Option<WorkflowRun>>,
    /// Token of the most recent run
    cancel: Mutex<CancellationToken>,
}

impl WorkflowRunner {
    pub fn new(executor: Arc<dyn AgentExecutor>, personas: impl Into<Arc<PersonaLibrary>>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            executor,
            personas: personas.into(),
            events: Arc::new(TracingSink),
            state,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Replace the default `TracingSink`.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Live run snapshots, updated after every transition.
    pub fn subscribe(&self) -> watch::Receiver<Option<WorkflowRun>> {
        self.state.subscribe()
    }

    /// The latest (or currently executing) run.
    pub fn snapshot(&self) -> Option<WorkflowRun> {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state
            .borrow()
            .as_ref()
            .map(WorkflowRun::is_running)
            .unwrap_or(false)
    }

    /// Execute `gem` against `initial_prompt`.
    ///
    /// Returns this run's terminal state when it COMPLETED or was CANCELLED,
    /// even if a newer run has been started since. A failed stage returns its
    /// error; the FAILED run stays available through
    /// [`snapshot`](Self::snapshot). Starting while another run is RUNNING
    /// returns `AlreadyRunning`.
    pub async fn run(
        &self,
        gem: &Gem,
        initial_prompt: &str,
        attachment: Option<Attachment>,
    ) -> Result<WorkflowRun, WorkflowError> {
        let (mut run, cancel) = self.begin(gem, initial_prompt)?;
        let run_id = run.run_id.clone();

        self.events.emit(
            &WorkflowEvent::info(
                EventKind::WorkflowStarted,
                format!("Workflow started with Gem: \"{}\"", gem.name),
            )
            .with("workflowRunId", run_id.as_str())
            .with("gemId", gem.id.as_str())
            .with("promptLength", initial_prompt.len())
            .with("hasAttachment", attachment.is_some())
            .with(
                "attachmentMimeType",
                attachment.as_ref().map(|a| a.mime_type.clone()),
            ),
        );

        let stage_executor = StageExecutor::new(self.executor.clone(), self.events.clone());
        let mut artifacts = ArtifactStore::seeded(initial_prompt);
        let mut failure: Option<WorkflowError> = None;

        for (index, stage) in gem.stages.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let stage_start = Utc::now();
            self.events.emit(
                &WorkflowEvent::info(
                    EventKind::StageStarted,
                    format!("Stage \"{}\" started.", stage.name),
                )
                .with("workflowRunId", run_id.as_str())
                .with("stageId", stage.stage_id.as_str())
                .with("stageName", stage.name.as_str()),
            );
            self.update(&mut run, |current| {
                current
                    .stage_results
                    .push(StageResult::started(&stage.stage_id, &stage.name));
            });

            let outcome = stage_executor
                .execute(
                    stage,
                    StageInput {
                        run_id: &run_id,
                        artifacts: &artifacts,
                        personas: &self.personas,
                        attachment: attachment.as_ref(),
                        cancel: &cancel,
                    },
                )
                .await;

            match outcome {
                Ok(results) => {
                    artifacts.merge(&results);
                    let new_artifacts: Vec<String> = results
                        .iter()
                        .map(|r| r.output_artifact_name.clone())
                        .collect();
                    let agents_executed = results.len();

                    let merged = self.update(&mut run, |current| {
                        current.artifacts.merge(&results);
                        if let Some(sr) = current.stage_results.get_mut(index) {
                            sr.status = RunStatus::Completed;
                            sr.agent_results = results;
                            sr.end_time = Some(Utc::now());
                        }
                    });
                    if !merged {
                        // stop() won the race; the run is already CANCELLED
                        break;
                    }

                    self.events.emit(
                        &WorkflowEvent::info(
                            EventKind::StageCompleted,
                            format!("Stage \"{}\" completed successfully.", stage.name),
                        )
                        .with("workflowRunId", run_id.as_str())
                        .with("stageId", stage.stage_id.as_str())
                        .with(
                            "durationMs",
                            (Utc::now() - stage_start).num_milliseconds(),
                        )
                        .with("agentsExecuted", agents_executed)
                        .with("newArtifacts", new_artifacts),
                    );
                }
                Err(WorkflowError::Cancelled) => break,
                Err(e) => {
                    self.events.emit(
                        &WorkflowEvent::error(
                            EventKind::StageFailed,
                            format!("Error in stage \"{}\"", stage.name),
                        )
                        .with("workflowRunId", run_id.as_str())
                        .with("stageId", stage.stage_id.as_str())
                        .with("stageName", stage.name.as_str())
                        .with("errorKind", e.kind())
                        .with("error", e.to_string()),
                    );
                    self.update(&mut run, |current| {
                        if let Some(sr) = current.stage_results.get_mut(index) {
                            sr.status = RunStatus::Failed;
                            sr.end_time = Some(Utc::now());
                        }
                        current.finish(RunStatus::Failed);
                    });
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        Ok(self.finalize(run))
    }

    /// Request cancellation of the current run.
    ///
    /// No new stage starts after this call. If the run is still RUNNING it
    /// becomes CANCELLED immediately (stages in flight are marked CANCELLED
    /// too); agent calls already in flight are left to settle and their
    /// output is discarded. Returns `true` if a run was cancelled by this
    /// call; calling it again has no effect.
    pub fn stop(&self) -> bool {
        let guard = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        guard.cancel();

        let mut cancelled: Option<String> = None;
        self.state.send_if_modified(|slot| match slot {
            Some(run) => {
                if run.cancel() {
                    cancelled = Some(run.run_id.clone());
                }
                cancelled.is_some()
            }
            None => false,
        });
        drop(guard);

        match cancelled {
            Some(run_id) => {
                self.events.emit(
                    &WorkflowEvent::warn(
                        EventKind::WorkflowCancelled,
                        "User cancelled the workflow.",
                    )
                    .with("workflowRunId", run_id),
                );
                true
            }
            None => false,
        }
    }

    /// Publish a fresh RUNNING run and arm a new cancellation token.
    fn begin(
        &self,
        gem: &Gem,
        initial_prompt: &str,
    ) -> Result<(WorkflowRun, CancellationToken), WorkflowError> {
        let mut guard = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);

        let active = self
            .state
            .borrow()
            .as_ref()
            .filter(|r| r.is_running())
            .map(|r| r.run_id.clone());
        if let Some(active) = active {
            return Err(WorkflowError::AlreadyRunning(active));
        }

        let token = CancellationToken::new();
        *guard = token.clone();

        let run = WorkflowRun::start(&gem.id, initial_prompt);
        self.state.send_replace(Some(run.clone()));

        tracing::debug!("[WorkflowRunner] Run {} started for gem '{}'", run.run_id, gem.id);
        Ok((run, token))
    }

    /// Apply `f` to the published run if it is still `run`'s RUNNING run,
    /// then refresh `run` from it. Terminal or replaced runs are never
    /// touched. Returns whether `f` ran.
    fn update<F>(&self, run: &mut WorkflowRun, f: F) -> bool
    where
        F: FnOnce(&mut WorkflowRun),
    {
        let mut applied: Option<WorkflowRun> = None;
        self.state.send_if_modified(|slot| match slot {
            Some(current) if current.run_id == run.run_id && current.is_running() => {
                f(current);
                applied = Some(current.clone());
                true
            }
            _ => false,
        });

        match applied {
            Some(current) => {
                *run = current;
                true
            }
            None => false,
        }
    }

    /// Complete `run` and return its terminal state.
    fn finalize(&self, mut run: WorkflowRun) -> WorkflowRun {
        let completed = self.update(&mut run, |current| {
            current.final_output = current
                .artifacts
                .get(FINAL_OUTPUT_ARTIFACT_NAME)
                .unwrap_or(NO_FINAL_OUTPUT_PLACEHOLDER)
                .to_string();
            current.finish(RunStatus::Completed);
        });

        if completed {
            self.events.emit(
                &WorkflowEvent::info(
                    EventKind::WorkflowCompleted,
                    "Workflow completed successfully.",
                )
                .with("workflowRunId", run.run_id.as_str())
                .with("finalStatus", RunStatus::Completed.as_str())
                .with("totalDurationMs", run.duration_ms().unwrap_or_default()),
            );
            return run;
        }

        // stop() already moved the run to CANCELLED. Prefer the published
        // record; it is gone only if a newer run replaced it.
        let published = self
            .state
            .borrow()
            .as_ref()
            .filter(|current| current.run_id == run.run_id)
            .cloned();
        published.unwrap_or_else(|| {
            run.cancel();
            run
        })
    }
}
