//! Synthesized progress estimate.
//!
//! The service reports no progress of its own, so the percentage is derived from the
//! phase and the poll attempt count. It is cosmetic; only monotonicity matters.

use super::types::{Phase, ProgressSnapshot};
use crate::events::{EventBus, SubmissionEventPayload};
use tracing::debug;

pub const AUTHORIZING_PERCENT: u8 = 5;
pub const TRANSFERRING_PERCENT: u8 = 10;
pub const NOTIFYING_PERCENT: u8 = 30;
pub const POLLING_FLOOR_PERCENT: u8 = 40;
pub const POLLING_CAP_PERCENT: u8 = 90;
const PERCENT_PER_ATTEMPT: u32 = 2;

// Message rotates every this many attempts
const MESSAGE_BUCKET: u32 = 10;

const POLLING_MESSAGES: [&str; 4] = [
    "Extracting pose and keyframes...",
    "Comparing with professional technique...",
    "Generating personalized feedback...",
    "Almost done, finalizing analysis...",
];

/// Percent estimate after `attempts` non-terminal status polls
pub fn polling_percent(attempts: u32) -> u8 {
    let raw = POLLING_FLOOR_PERCENT as u32 + attempts.saturating_mul(PERCENT_PER_ATTEMPT);
    raw.min(POLLING_CAP_PERCENT as u32) as u8
}

/// Status message for the attempt-count bucket
pub fn polling_message(attempts: u32) -> &'static str {
    if attempts < MESSAGE_BUCKET {
        return "AI analyzing your technique...";
    }
    let index = (attempts / MESSAGE_BUCKET) as usize % POLLING_MESSAGES.len();
    POLLING_MESSAGES[index]
}

/// Fixed checkpoint for a phase entry
pub fn phase_snapshot(phase: Phase) -> ProgressSnapshot {
    let (percent, message) = match phase {
        Phase::Validating => (0, "Preparing upload..."),
        Phase::Resolving => (0, "Connecting to backend..."),
        Phase::Authorizing => (AUTHORIZING_PERCENT, "Getting upload authorization..."),
        Phase::Transferring => (TRANSFERRING_PERCENT, "Uploading video..."),
        Phase::Notifying => (NOTIFYING_PERCENT, "Upload complete, starting analysis..."),
        Phase::Polling => (POLLING_FLOOR_PERCENT, "AI analyzing your technique..."),
        Phase::Done => (100, "Analysis complete!"),
        Phase::Error => (0, "Analysis failed"),
        Phase::Timeout => (0, "Analysis is taking longer than expected"),
    };
    ProgressSnapshot {
        percent,
        message: message.to_string(),
    }
}

/// Clamps successive snapshots so the published percent never goes down
#[derive(Debug, Default)]
pub struct ProgressTracker {
    high_water: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, snapshot: ProgressSnapshot) -> ProgressSnapshot {
        self.high_water = self.high_water.max(snapshot.percent.min(100));
        ProgressSnapshot {
            percent: self.high_water,
            message: snapshot.message,
        }
    }

    pub fn percent(&self) -> u8 {
        self.high_water
    }
}

/// Publishes phase transitions and clamped progress for one submission.
///
/// Publishing with no subscribers is not an error here; the UI may not be listening.
#[derive(Debug)]
pub struct ProgressReporter {
    bus: EventBus,
    submission_id: String,
    tracker: ProgressTracker,
    phase: Option<Phase>,
}

impl ProgressReporter {
    pub fn new(bus: EventBus, submission_id: &str) -> Self {
        Self {
            bus,
            submission_id: submission_id.to_string(),
            tracker: ProgressTracker::new(),
            phase: None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Enter `phase` and publish its checkpoint
    pub fn enter(&mut self, phase: Phase) {
        debug!(submission_id = %self.submission_id, %phase, "Entering phase");
        self.phase = Some(phase);
        self.publish(SubmissionEventPayload::PhaseChanged { phase });
        self.tick(phase_snapshot(phase));
    }

    pub fn tick(&mut self, snapshot: ProgressSnapshot) {
        let snapshot = self.tracker.advance(snapshot);
        self.publish(SubmissionEventPayload::Progress {
            percent: snapshot.percent,
            message: snapshot.message,
        });
    }

    /// Publish the terminal phase; only `Done` moves the percentage to 100
    pub fn finish(&mut self, phase: Phase, error: Option<String>) {
        if phase == Phase::Done {
            self.tick(phase_snapshot(Phase::Done));
        }
        self.phase = Some(phase);
        self.publish(SubmissionEventPayload::Finished { phase, error });
    }

    fn publish(&self, payload: SubmissionEventPayload) {
        self.bus.publish(&self.submission_id, payload);
    }
}
