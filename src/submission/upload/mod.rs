//! Upload coordination and routing.
//!
//! Routes a resolved submission to the presigned or single-shot pipeline.

mod direct;
mod presigned;

pub use direct::DirectUpload;
pub use presigned::UploadSession;

use super::poller::JobPoller;
use super::progress::ProgressReporter;
use super::types::{AnalysisResult, Phase, ResolvedEndpoint, SubmissionMetadata, VideoFile};
use crate::config::{PollPolicy, SubmissionMode, SubmitConfig};
use crate::error::SubmissionError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Everything a pipeline needs for one submission after the endpoint is resolved
pub struct PipelineContext<'a> {
    pub endpoint: &'a ResolvedEndpoint,
    pub file: &'a VideoFile,
    pub metadata: &'a SubmissionMetadata,
    pub cancel: &'a CancellationToken,
    pub reporter: &'a mut ProgressReporter,
}

impl PipelineContext<'_> {
    /// Enter `phase` unless the caller has already cancelled
    fn enter(&mut self, phase: Phase) -> Result<(), SubmissionError> {
        if self.cancel.is_cancelled() {
            return Err(SubmissionError::Cancelled { phase });
        }
        self.reporter.enter(phase);
        Ok(())
    }
}

#[async_trait]
pub trait SubmissionPipeline: Send + Sync {
    fn mode(&self) -> SubmissionMode;

    async fn run(&self, ctx: PipelineContext<'_>) -> Result<AnalysisResult, SubmissionError>;
}

/// authorize → transfer → notify → poll
#[derive(Debug, Clone)]
pub struct PresignedPipeline {
    session: UploadSession,
    poller: JobPoller,
}

impl PresignedPipeline {
    pub fn new(client: reqwest::Client, request_timeout: Duration, poll_policy: PollPolicy) -> Self {
        Self {
            session: UploadSession::new(client.clone(), request_timeout),
            poller: JobPoller::new(client, poll_policy),
        }
    }
}

#[async_trait]
impl SubmissionPipeline for PresignedPipeline {
    fn mode(&self) -> SubmissionMode {
        SubmissionMode::Presigned
    }

    async fn run(&self, mut ctx: PipelineContext<'_>) -> Result<AnalysisResult, SubmissionError> {
        ctx.enter(Phase::Authorizing)?;
        let ticket = self.session.authorize(ctx.endpoint, ctx.metadata).await?;

        ctx.enter(Phase::Transferring)?;
        let object = self.session.transfer(ticket, ctx.file).await?;

        if let Err(e) = ctx.enter(Phase::Notifying) {
            warn!(s3_key = %object.object_key, "Cancelled after transfer; stored object left without a job");
            return Err(e);
        }
        let job = self
            .session
            .notify(ctx.endpoint, &object, ctx.metadata, ctx.file)
            .await?;

        ctx.enter(Phase::Polling)?;
        let reporter = &mut *ctx.reporter;
        self.poller
            .wait_for_result(ctx.endpoint, job, ctx.cancel, |snapshot| {
                reporter.tick(snapshot)
            })
            .await
    }
}

/// One multipart POST to `/upload`
#[derive(Debug, Clone)]
pub struct DirectPipeline {
    upload: DirectUpload,
}

impl DirectPipeline {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            upload: DirectUpload::new(client),
        }
    }
}

#[async_trait]
impl SubmissionPipeline for DirectPipeline {
    fn mode(&self) -> SubmissionMode {
        SubmissionMode::Direct
    }

    async fn run(&self, mut ctx: PipelineContext<'_>) -> Result<AnalysisResult, SubmissionError> {
        ctx.enter(Phase::Transferring)?;

        // The request carries the whole analysis; cancelling drops it mid-flight
        tokio::select! {
            result = self.upload.upload(ctx.endpoint, ctx.file, ctx.metadata) => result,
            _ = ctx.cancel.cancelled() => Err(SubmissionError::Cancelled { phase: Phase::Transferring }),
        }
    }
}

/// Pick the pipeline for the configured submission mode
pub fn pipeline_for(config: &SubmitConfig, client: reqwest::Client) -> Arc<dyn SubmissionPipeline> {
    match config.mode {
        SubmissionMode::Presigned => Arc::new(PresignedPipeline::new(
            client,
            config.request_timeout(),
            config.poll_policy(),
        )),
        SubmissionMode::Direct => Arc::new(DirectPipeline::new(client)),
    }
}
