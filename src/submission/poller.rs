//! Job status polling with a hard attempt ceiling.
//!
//! Transient query failures count against the same budget as "still running"
//! responses, so the total wait stays bounded either way. A query that outlives
//! `PollPolicy::request_timeout` is one such failure.

use super::progress::{polling_message, polling_percent};
use super::types::{AnalysisResult, Job, JobStatus, Phase, ProgressSnapshot, ResolvedEndpoint};
use crate::config::PollPolicy;
use crate::error::SubmissionError;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Polls `GET {base}/status/{job_id}` until the job is terminal
#[derive(Debug, Clone)]
pub struct JobPoller {
    client: reqwest::Client,
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(client: reqwest::Client, policy: PollPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Wait for `job` to finish.
    ///
    /// `on_progress` is called after every non-terminal poll. Cancellation is checked
    /// before each query, during it, and while sleeping.
    pub async fn wait_for_result<F>(
        &self,
        endpoint: &ResolvedEndpoint,
        mut job: Job,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<AnalysisResult, SubmissionError>
    where
        F: FnMut(ProgressSnapshot) + Send,
    {
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!(job_id = %job.id, attempts, "Polling cancelled");
                return Err(SubmissionError::Cancelled {
                    phase: Phase::Polling,
                });
            }

            attempts += 1;

            let outcome = tokio::select! {
                outcome = self.query_status(endpoint, &job.id) => outcome,
                _ = cancel.cancelled() => {
                    info!(job_id = %job.id, attempts, "Polling cancelled during status check");
                    return Err(SubmissionError::Cancelled { phase: Phase::Polling });
                }
            };

            match outcome {
                Ok(response) => {
                    let status = JobStatus::from_wire(&response.status);
                    if status != job.status {
                        debug!(job_id = %job.id, from = ?job.status, to = ?status, "Job status changed");
                        job.status = status;
                    }

                    match (status, response.result) {
                        (JobStatus::Done, Some(result)) => {
                            info!(job_id = %job.id, attempts, "Analysis complete");
                            return Ok(AnalysisResult(result));
                        }
                        (JobStatus::Done, None) => {
                            warn!(job_id = %job.id, attempt = attempts, "Job reported done without a result");
                        }
                        (JobStatus::Error, _) => {
                            let message = response
                                .error
                                .unwrap_or_else(|| "Analysis failed on server".to_string());
                            warn!(job_id = %job.id, attempts, error = %message, "Analysis failed");
                            return Err(SubmissionError::ServerAnalysis {
                                job_id: job.id,
                                message,
                            });
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    warn!(job_id = %job.id, attempt = attempts, error = %e, "Status check failed");
                }
            }

            if attempts >= self.policy.max_attempts {
                warn!(job_id = %job.id, attempts, "Polling ceiling reached");
                return Err(SubmissionError::Timeout {
                    job_id: job.id,
                    attempts,
                });
            }

            on_progress(ProgressSnapshot {
                percent: polling_percent(attempts),
                message: polling_message(attempts).to_string(),
            });

            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {}
                _ = cancel.cancelled() => {
                    info!(job_id = %job.id, attempts, "Polling cancelled");
                    return Err(SubmissionError::Cancelled { phase: Phase::Polling });
                }
            }
        }
    }

    async fn query_status(
        &self,
        endpoint: &ResolvedEndpoint,
        job_id: &str,
    ) -> Result<StatusResponse, String> {
        let url = endpoint.segment_url(&["status", job_id])?;
        let timeout = self.policy.request_timeout;

        let query = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| format!("HTTP request failed: {}", e))?;

            if !response.status().is_success() {
                return Err(format!("Status check failed with status {}", response.status()));
            }

            response
                .json::<StatusResponse>()
                .await
                .map_err(|e| format!("Failed to parse status response: {}", e))
        };

        // Covers headers and body; a server that accepts and never answers lands here
        tokio::time::timeout(timeout, query)
            .await
            .map_err(|_| format!("Status check timed out after {} ms", timeout.as_millis()))?
    }
}
