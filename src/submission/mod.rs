//! Video submission orchestration.
//!
//! A submission walks validate → resolve → (authorize → transfer → notify → poll | upload)
//! and ends in exactly one of done, error or timeout. Every submission re-resolves the
//! endpoint; nothing is cached between calls.
//!
//! # Module Organization
//!
//! - `types` - Endpoints, tickets, jobs, inputs and phases
//! - `probe` - Liveness check for one candidate
//! - `resolver` - Candidate list and fastest-endpoint selection
//! - `upload` - Presigned and single-shot pipelines
//! - `poller` - Bounded job status polling
//! - `progress` - Synthesized progress and event publishing
//! - `persistence` - Fire-and-forget outcome and feedback storage

pub mod persistence;
pub mod poller;
pub mod probe;
pub mod progress;
pub mod resolver;
pub mod types;
pub mod upload;

pub use persistence::{
    spawn_persist, spawn_persist_feedback, AnalysisRecord, AnalysisStore, FeedbackRecord,
    HttpAnalysisStore, NullAnalysisStore,
};
pub use poller::JobPoller;
pub use probe::EndpointProbe;
pub use progress::{ProgressReporter, ProgressTracker};
pub use resolver::{select_best, CandidateList, EndpointResolver};
pub use types::*;
pub use upload::{
    pipeline_for, DirectPipeline, PipelineContext, PresignedPipeline, SubmissionPipeline,
    UploadSession,
};

use crate::config::SubmitConfig;
use crate::error::{AppError, SubmissionError};
use crate::events::EventBus;
use crate::logging::{record_activity, ActivityEntry};
use crate::validation::validate_video_file;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared HTTP client for probes, uploads, polling and persistence
pub fn build_http_client(config: &SubmitConfig) -> Result<reqwest::Client, AppError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
    if !config.use_system_proxy {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|e| AppError::Other(format!("Failed to build HTTP client: {}", e)))
}

/// Drives submissions from a validated file to a final analysis result
pub struct SubmissionOrchestrator {
    candidates: CandidateList,
    resolver: EndpointResolver,
    pipeline: Arc<dyn SubmissionPipeline>,
    client: reqwest::Client,
    /// `None` stores outcomes on whichever backend the submission resolved to
    store: Option<Arc<dyn AnalysisStore>>,
    events: EventBus,
    max_file_size: u64,
    activity_dir: Option<PathBuf>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl SubmissionOrchestrator {
    /// Build with the configured candidates, mode and persistence store
    pub fn from_config(config: &SubmitConfig) -> Result<Self, AppError> {
        let client = build_http_client(config)?;

        let store: Option<Arc<dyn AnalysisStore>> = match config.persistence_url {
            _ if !config.persist_outcomes => Some(Arc::new(NullAnalysisStore)),
            Some(ref url) => Some(Arc::new(HttpAnalysisStore::new(client.clone(), url))),
            None => None,
        };

        Ok(Self {
            candidates: CandidateList::from_config(config),
            resolver: EndpointResolver::new(EndpointProbe::new(
                client.clone(),
                config.probe_policy(),
            )),
            pipeline: pipeline_for(config, client.clone()),
            client,
            store,
            events: EventBus::default(),
            max_file_size: config.max_file_size_bytes,
            activity_dir: None,
            pending_writes: Mutex::new(Vec::new()),
        })
    }

    pub fn with_candidates(mut self, candidates: CandidateList) -> Self {
        self.candidates = candidates;
        self
    }

    /// Replace the persistence target; `NullAnalysisStore` opts out entirely
    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_pipeline(mut self, pipeline: Arc<dyn SubmissionPipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Append one line per finished submission to the activity journal in `logs_dir`
    pub fn with_activity_journal(mut self, logs_dir: PathBuf) -> Self {
        self.activity_dir = Some(logs_dir);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn candidates(&self) -> &CandidateList {
        &self.candidates
    }

    /// Probe every candidate without submitting anything
    pub async fn probe_candidates(&self) -> Vec<ProbeResult> {
        self.resolver.probe_all(self.candidates.as_slice()).await
    }

    /// Store for records produced outside a submission, such as survey answers.
    ///
    /// Without a configured store this resolves a backend, the same way a submission does.
    pub async fn feedback_store(&self) -> Result<Arc<dyn AnalysisStore>, SubmissionError> {
        if let Some(ref store) = self.store {
            return Ok(store.clone());
        }
        let endpoint = self.resolver.resolve(self.candidates.as_slice()).await?;
        Ok(self.store_for(&endpoint))
    }

    fn store_for(&self, endpoint: &ResolvedEndpoint) -> Arc<dyn AnalysisStore> {
        match self.store {
            Some(ref store) => store.clone(),
            None => Arc::new(HttpAnalysisStore::new(self.client.clone(), &endpoint.url)),
        }
    }

    pub async fn submit(
        &self,
        file: &VideoFile,
        metadata: &SubmissionMetadata,
        session_id: &str,
    ) -> Result<AnalysisResult, SubmissionError> {
        self.submit_with_cancel(file, metadata, session_id, CancellationToken::new())
            .await
    }

    /// Run one submission to a terminal phase.
    ///
    /// Validation failures return before any network call. On success the outcome is
    /// handed to the store exactly once, without waiting for it; with no store
    /// configured that is the endpoint this submission resolved to.
    pub async fn submit_with_cancel(
        &self,
        file: &VideoFile,
        metadata: &SubmissionMetadata,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, SubmissionError> {
        let submission_id = uuid::Uuid::new_v4().to_string();
        let mut reporter = ProgressReporter::new(self.events.clone(), &submission_id);

        info!(
            submission_id = %submission_id,
            session_id = %session_id,
            file = %file.file_name,
            bytes = file.size,
            mode = ?self.pipeline.mode(),
            "Starting submission"
        );

        let outcome = self
            .run(file, metadata, &cancel, &mut reporter)
            .await;

        match outcome {
            Ok((endpoint, result)) => {
                reporter.finish(Phase::Done, None);
                let handle = spawn_persist(
                    self.store_for(&endpoint),
                    AnalysisRecord::new(metadata, session_id, &result),
                );
                self.track_write(handle);
                info!(submission_id = %submission_id, score = ?result.score(), "Submission complete");
                self.journal(&submission_id, session_id, file, Phase::Done, None);
                Ok(result)
            }
            Err(e) => {
                let terminal = match e {
                    SubmissionError::Timeout { .. } => Phase::Timeout,
                    _ => Phase::Error,
                };
                reporter.finish(terminal, Some(e.to_string()));
                match e {
                    SubmissionError::Validation(_) | SubmissionError::Cancelled { .. } => {
                        info!(submission_id = %submission_id, error = %e, "Submission stopped")
                    }
                    _ => error!(
                        submission_id = %submission_id,
                        phase = %e.phase(),
                        status = ?e.status(),
                        error = %e,
                        "Submission failed"
                    ),
                }
                self.journal(&submission_id, session_id, file, terminal, Some(&e));
                Err(e)
            }
        }
    }

    /// Wait for persistence writes started by earlier submissions
    pub async fn drain_persistence(&self) {
        let handles: Vec<JoinHandle<()>> = match self.pending_writes.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => return,
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Persistence task did not complete");
            }
        }
    }

    fn track_write(&self, handle: JoinHandle<()>) {
        if let Ok(mut pending) = self.pending_writes.lock() {
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    async fn run(
        &self,
        file: &VideoFile,
        metadata: &SubmissionMetadata,
        cancel: &CancellationToken,
        reporter: &mut ProgressReporter,
    ) -> Result<(ResolvedEndpoint, AnalysisResult), SubmissionError> {
        validate_video_file(file, self.max_file_size)?;

        if cancel.is_cancelled() {
            return Err(SubmissionError::Cancelled {
                phase: Phase::Resolving,
            });
        }
        reporter.enter(Phase::Resolving);

        let endpoint = tokio::select! {
            resolved = self.resolver.resolve(self.candidates.as_slice()) => resolved?,
            _ = cancel.cancelled() => {
                return Err(SubmissionError::Cancelled { phase: Phase::Resolving });
            }
        };

        let result = self
            .pipeline
            .run(PipelineContext {
                endpoint: &endpoint,
                file,
                metadata,
                cancel,
                reporter,
            })
            .await?;
        Ok((endpoint, result))
    }

    fn journal(
        &self,
        submission_id: &str,
        session_id: &str,
        file: &VideoFile,
        phase: Phase,
        error: Option<&SubmissionError>,
    ) {
        let Some(ref logs_dir) = self.activity_dir else {
            return;
        };

        let (level, message) = match error {
            None => ("INFO", "Submission complete".to_string()),
            Some(e) => ("ERROR", e.to_string()),
        };
        let entry = ActivityEntry::new(level, "submission", &message).with_details(json!({
            "submission_id": submission_id,
            "session_id": session_id,
            "file": file.file_name,
            "bytes": file.size,
            "phase": phase,
            "status": error.and_then(|e| e.status()),
        }));

        if let Err(e) = record_activity(logs_dir, &entry) {
            warn!(error = %e, "Failed to write activity journal");
        } else {
            debug!(submission_id = %submission_id, "Activity journal updated");
        }
    }
}
