mod bus;
mod handlers;
mod types;

pub use bus::{EventBus, EventReceiver};
pub use handlers::{render_event, ConsoleEventHandler};
pub use types::{EventSequence, SubmissionEvent, SubmissionEventPayload};
