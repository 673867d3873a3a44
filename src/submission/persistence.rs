//! Outcome and feedback persistence collaborator.
//!
//! Writes are fire-and-forget: they run on a detached task, never block the caller and
//! never surface errors. The store is expected to upsert by `session_id`, since retried
//! submissions may write the same session twice.

use super::types::{AnalysisResult, SubmissionMetadata};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Final analysis outcome of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub email: String,
    pub stroke_type: String,
    pub handedness: String,
    pub experience: Option<String>,
    pub session_id: String,
    pub ai_analysis: Option<String>,
    pub ai_drills: Option<String>,
    pub swing_score: Option<f64>,
    pub result: AnalysisResult,
}

impl AnalysisRecord {
    pub fn new(metadata: &SubmissionMetadata, session_id: &str, result: &AnalysisResult) -> Self {
        Self {
            email: metadata.email.clone(),
            stroke_type: metadata.stroke_type.clone(),
            handedness: metadata.handedness.clone(),
            experience: metadata.experience.clone(),
            session_id: session_id.to_string(),
            ai_analysis: result.feedback().map(|v| v.to_string()),
            ai_drills: result.drills().map(|v| v.to_string()),
            swing_score: result.score(),
            result: result.clone(),
        }
    }
}

/// Survey answers collected after the analysis is shown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub email: String,
    pub rating: Option<u8>,
    pub helpful: Option<bool>,
    pub comments: Option<String>,
    pub recommend: Option<bool>,
    pub stroke_type: Option<String>,
    pub improvement_areas: Option<String>,
    pub session_id: Option<String>,
}

impl FeedbackRecord {
    /// Fill in a session id when the survey was reached without one
    pub fn with_session_fallback(mut self) -> Self {
        if self.session_id.as_deref().map_or(true, str::is_empty) {
            self.session_id = Some(uuid::Uuid::new_v4().to_string());
        }
        self
    }
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn persist(&self, record: AnalysisRecord) -> Result<(), String>;

    async fn persist_feedback(&self, record: FeedbackRecord) -> Result<(), String>;
}

/// Store that drops every record; selected by `persistOutcomes: false`
#[derive(Debug, Clone, Default)]
pub struct NullAnalysisStore;

#[async_trait]
impl AnalysisStore for NullAnalysisStore {
    async fn persist(&self, record: AnalysisRecord) -> Result<(), String> {
        debug!(session_id = %record.session_id, "Analysis record discarded (persistence disabled)");
        Ok(())
    }

    async fn persist_feedback(&self, record: FeedbackRecord) -> Result<(), String> {
        debug!(session_id = ?record.session_id, "Feedback discarded (persistence disabled)");
        Ok(())
    }
}

/// Store backed by the analytics endpoints of the local backend
#[derive(Debug, Clone)]
pub struct HttpAnalysisStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisStore {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<T: Serialize + Sync>(&self, path: &str, record: &T) -> Result<(), String> {
        let mut body = serde_json::to_value(record)
            .map_err(|e| format!("Failed to serialize record: {}", e))?;
        body["created_at"] = serde_json::json!(Utc::now().to_rfc3339());

        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("{} failed with status {}: {}", path, status, error_text));
        }

        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for HttpAnalysisStore {
    async fn persist(&self, record: AnalysisRecord) -> Result<(), String> {
        self.post_json("save-analysis-data", &record).await
    }

    async fn persist_feedback(&self, record: FeedbackRecord) -> Result<(), String> {
        self.post_json("save-feedback", &record).await
    }
}

/// Persist on a detached task; failures are logged and dropped
pub fn spawn_persist(
    store: Arc<dyn AnalysisStore>,
    record: AnalysisRecord,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let session_id = record.session_id.clone();
        match store.persist(record).await {
            Ok(()) => debug!(session_id = %session_id, "Analysis record saved"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to save analysis record"),
        }
    })
}

/// Feedback counterpart of [`spawn_persist`]
pub fn spawn_persist_feedback(
    store: Arc<dyn AnalysisStore>,
    record: FeedbackRecord,
) -> tokio::task::JoinHandle<()> {
    let record = record.with_session_fallback();
    tokio::spawn(async move {
        let session_id = record.session_id.clone().unwrap_or_default();
        match store.persist_feedback(record).await {
            Ok(()) => debug!(session_id = %session_id, "Feedback saved"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to save feedback"),
        }
    })
}
