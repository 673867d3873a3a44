//! Type definitions for the submission pipeline.
//!
//! Defines endpoints, tickets, jobs, progress snapshots and the file/metadata inputs.

use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Pipeline phase, in the order a presigned submission walks through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validating,
    Resolving,
    Authorizing,
    Transferring,
    Notifying,
    Polling,
    Done,
    Error,
    Timeout,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error | Phase::Timeout)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Validating => "validating",
            Phase::Resolving => "resolving",
            Phase::Authorizing => "authorizing",
            Phase::Transferring => "transferring",
            Phase::Notifying => "notifying",
            Phase::Polling => "polling",
            Phase::Done => "done",
            Phase::Error => "error",
            Phase::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// A guessed or configured base address of the processing service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
}

impl Candidate {
    pub fn new(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim().trim_end_matches('/').to_string(),
        }
    }
}

/// Outcome of one liveness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub url: String,
    pub available: bool,
    pub latency_ms: Option<u64>,
}

/// Base address chosen for the rest of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub url: String,
}

impl ResolvedEndpoint {
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }

    /// Append each segment percent-encoded, so ids containing `/`, `?` or `#`
    /// stay inside their own path segment
    pub fn segment_url(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| format!("Invalid endpoint URL '{}': {}", self.url, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("Endpoint URL '{}' cannot take a path", self.url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Single-use authorization to write one object to storage.
///
/// Not `Clone`: `UploadSession::transfer` takes it by value, so a ticket cannot be
/// replayed after a failed write.
#[derive(Debug)]
pub struct UploadTicket {
    pub fields: IndexMap<String, String>,
    pub target_url: String,
    pub object_key: String,
}

/// Object known to be in storage after a successful transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub object_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Preparing,
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// Map a wire status string; unknown values are treated as still running
    pub fn from_wire(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "preparing" => JobStatus::Preparing,
            "queued" => JobStatus::Queued,
            "done" => JobStatus::Done,
            "error" => JobStatus::Error,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// Server-tracked analysis job, observed via polling
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub result: Option<AnalysisResult>,
}

impl Job {
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            result: None,
        }
    }
}

/// Derived progress indication, recomputed on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub message: String,
}

/// Opaque analysis payload returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult(pub serde_json::Value);

impl AnalysisResult {
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    /// Overall score (`swing_score`, falling back to `score`)
    pub fn score(&self) -> Option<f64> {
        self.0
            .get("swing_score")
            .or_else(|| self.0.get("score"))
            .and_then(|v| v.as_f64())
    }

    pub fn feedback(&self) -> Option<&serde_json::Value> {
        self.0.get("feedback")
    }

    pub fn drills(&self) -> Option<&serde_json::Value> {
        self.0.get("drills")
    }
}

/// Submission metadata entered earlier in the intake flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub email: String,
    pub stroke_type: String,
    pub handedness: String,
    pub experience: Option<String>,
}

/// The video to submit, as declared by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    pub path: PathBuf,
    pub file_name: String,
    pub media_type: String,
    pub size: u64,
}

impl VideoFile {
    pub fn new(
        path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        media_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            media_type: media_type.into(),
            size,
        }
    }

    /// Describe a file on disk, inferring the media type from its extension
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video")
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            media_type: media_type_for(path).to_string(),
            file_name,
            size: metadata.len(),
        })
    }
}

fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("m4v") => "video/x-m4v",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}
