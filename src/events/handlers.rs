use super::{EventBus, SubmissionEvent, SubmissionEventPayload};
use std::io::Write;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handler that renders submission events as terminal lines
pub struct ConsoleEventHandler {
    event_bus: EventBus,
    shutdown: CancellationToken,
}

impl ConsoleEventHandler {
    pub fn new(event_bus: EventBus, shutdown: CancellationToken) -> Self {
        Self {
            event_bus,
            shutdown,
        }
    }

    /// Subscribe immediately and print events until the bus closes or shutdown fires
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.event_bus.subscribe();
        let shutdown = self.shutdown;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = rx.recv() => {
                        match result {
                            Ok(event) => {
                                if let Some(line) = render_event(&event) {
                                    let mut out = std::io::stderr().lock();
                                    let _ = writeln!(out, "{}", line);
                                }
                                if matches!(event.payload, SubmissionEventPayload::Finished { .. }) {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Console handler stopped (event bus closed)");
                                break;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Console handler lagged");
                            }
                        }
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Console handler shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// One display line per event; phase changes are implied by progress messages
pub fn render_event(event: &SubmissionEvent) -> Option<String> {
    match &event.payload {
        SubmissionEventPayload::PhaseChanged { .. } => None,
        SubmissionEventPayload::Progress { percent, message } => {
            Some(format!("[{:>3}%] {}", percent, message))
        }
        SubmissionEventPayload::Finished { phase, error } => Some(match error {
            Some(e) => format!("[{}] {}", phase, e),
            None => format!("[{}]", phase),
        }),
    }
}
