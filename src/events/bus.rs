//! Fan-out of submission events to whoever is watching.
//!
//! A submission runs the same whether or not a console or UI is attached, so
//! publishing never fails: an event nobody is subscribed to is dropped.

use super::types::{EventSequence, SubmissionEvent, SubmissionEventPayload};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

pub type EventReceiver = broadcast::Receiver<SubmissionEvent>;

/// Broadcast channel shared by the orchestrator and its observers
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SubmissionEvent>,
    // Shared across clones so every submission on one bus gets distinct numbers
    sequence: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    /// `capacity` bounds how far a slow subscriber may lag before it skips events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Stamp and broadcast one event for `submission_id`.
    ///
    /// Returns the sequence number when at least one subscriber received it.
    pub fn publish(
        &self,
        submission_id: &str,
        payload: SubmissionEventPayload,
    ) -> Option<EventSequence> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let event = SubmissionEvent {
            sequence,
            timestamp: Utc::now(),
            submission_id: submission_id.to_string(),
            payload,
        };

        match self.sender.send(event) {
            Ok(_) => Some(sequence),
            Err(_) => {
                trace!(submission_id, sequence, "No subscribers; event dropped");
                None
            }
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::Phase;

    fn phase(phase: Phase) -> SubmissionEventPayload {
        SubmissionEventPayload::PhaseChanged { phase }
    }

    #[tokio::test]
    async fn test_subscriber_sees_stamped_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        assert_eq!(bus.publish("sub-1", phase(Phase::Resolving)), Some(1));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.submission_id, "sub-1");
        assert_eq!(event.phase(), Some(Phase::Resolving));
        assert_eq!(event.payload_type(), "phase_changed");
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_the_same_event() {
        let bus = EventBus::new(8);
        let mut console = bus.subscribe();
        let mut recorder = bus.subscribe();

        bus.publish(
            "sub-2",
            SubmissionEventPayload::Progress {
                percent: 40,
                message: "analyzing".to_string(),
            },
        );

        let a = console.recv().await.unwrap();
        let b = recorder.recv().await.unwrap();
        assert_eq!(a.sequence, b.sequence);
        assert_eq!(a.percent(), Some(40));
        assert_eq!(b.percent(), Some(40));
    }

    #[test]
    fn test_unobserved_events_are_dropped_but_numbered() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish("sub-3", phase(Phase::Polling)), None);

        // A late subscriber sees only what comes after it, numbered after the drop
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish("sub-3", phase(Phase::Done)), Some(2));
        assert_eq!(rx.try_recv().unwrap().sequence, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clones_share_one_sequence() {
        let bus = EventBus::new(8);
        let other = bus.clone();
        let _rx = bus.subscribe();

        assert_eq!(bus.publish("a", phase(Phase::Resolving)), Some(1));
        assert_eq!(other.publish("b", phase(Phase::Authorizing)), Some(2));
    }
}
