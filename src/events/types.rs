use crate::submission::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sequence number for ordering events
pub type EventSequence = u64;

/// Progress/status update for one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionEvent {
    pub sequence: EventSequence,
    pub timestamp: DateTime<Utc>,
    pub submission_id: String,
    pub payload: SubmissionEventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionEventPayload {
    /// Pipeline moved to a new phase
    PhaseChanged { phase: Phase },

    /// Progress estimate (cosmetic during polling)
    Progress { percent: u8, message: String },

    /// Submission reached a terminal phase
    Finished {
        phase: Phase,
        error: Option<String>,
    },
}

impl SubmissionEvent {
    pub fn payload_type(&self) -> &str {
        match &self.payload {
            SubmissionEventPayload::PhaseChanged { .. } => "phase_changed",
            SubmissionEventPayload::Progress { .. } => "progress",
            SubmissionEventPayload::Finished { .. } => "finished",
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match &self.payload {
            SubmissionEventPayload::PhaseChanged { phase }
            | SubmissionEventPayload::Finished { phase, .. } => Some(*phase),
            SubmissionEventPayload::Progress { .. } => None,
        }
    }

    pub fn percent(&self) -> Option<u8> {
        match &self.payload {
            SubmissionEventPayload::Progress { percent, .. } => Some(*percent),
            _ => None,
        }
    }
}
