use crate::submission::Phase;
use thiserror::Error;

/// Application errors outside the submission pipeline (config, journal, CLI plumbing)
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, AppError>;
}

impl<T, E: Into<AppError>> ErrorContext<T> for Result<T, E> {
    fn context(self, msg: &str) -> Result<T, AppError> {
        self.map_err(|e| {
            let err: AppError = e.into();
            match err {
                AppError::Other(s) => AppError::Other(format!("{}: {}", msg, s)),
                AppError::Config(s) => AppError::Config(format!("{}: {}", msg, s)),
                AppError::Io(e) => AppError::Io(e),
                AppError::Json(e) => AppError::Json(e),
            }
        })
    }
}

/// Failure of one submission, keyed by the phase that broke.
///
/// HTTP failures keep the status code so the caller can render a specific message.
/// `status` is `None` when the request never produced a response (connection refused,
/// timeout) or the body could not be parsed.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Local pre-flight checks failed; no network traffic was issued
    #[error("Validation error: {0}")]
    Validation(String),

    /// None of the candidate endpoints answered its health check
    #[error("No analysis backend reachable ({tried} candidates tried)")]
    Connectivity { tried: usize },

    /// Upload authorization request was rejected
    #[error("Failed to get upload authorization{}: {message}", fmt_status(.status))]
    Authorization { status: Option<u16>, message: String },

    /// Storage write was rejected
    #[error("Upload failed{}: {message}", fmt_status(.status))]
    Transfer { status: Option<u16>, message: String },

    /// Job registration was rejected
    #[error("Failed to start analysis{}: {message}", fmt_status(.status))]
    Notify { status: Option<u16>, message: String },

    /// Job reached the server-side error state
    #[error("Analysis failed on server (job {job_id}): {message}")]
    ServerAnalysis { job_id: String, message: String },

    /// Polling budget exhausted; the job may still be running server-side
    #[error("Analysis timeout after {attempts} status checks (job {job_id} may still be processing)")]
    Timeout { job_id: String, attempts: u32 },

    /// Caller tore the submission down
    #[error("Submission cancelled during {phase}")]
    Cancelled { phase: Phase },
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

impl SubmissionError {
    /// Phase in which the submission broke
    pub fn phase(&self) -> Phase {
        match self {
            SubmissionError::Validation(_) => Phase::Validating,
            SubmissionError::Connectivity { .. } => Phase::Resolving,
            SubmissionError::Authorization { .. } => Phase::Authorizing,
            SubmissionError::Transfer { .. } => Phase::Transferring,
            SubmissionError::Notify { .. } => Phase::Notifying,
            SubmissionError::ServerAnalysis { .. } | SubmissionError::Timeout { .. } => {
                Phase::Polling
            }
            SubmissionError::Cancelled { phase } => *phase,
        }
    }

    /// HTTP status code of the failing call, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            SubmissionError::Authorization { status, .. }
            | SubmissionError::Transfer { status, .. }
            | SubmissionError::Notify { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the failure happened before anything was written server-side
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            SubmissionError::Validation(_) | SubmissionError::Connectivity { .. }
        )
    }
}

/// Status code and body text of a non-2xx response
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub status: u16,
    pub message: String,
}

impl HttpFailure {
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Self { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SubmissionError::Transfer {
            status: Some(403),
            message: "AccessDenied".to_string(),
        };
        assert_eq!(err.to_string(), "Upload failed (status 403): AccessDenied");

        let err = SubmissionError::Notify {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to start analysis: connection refused");
    }

    #[test]
    fn test_phase_and_status() {
        let err = SubmissionError::Authorization {
            status: Some(500),
            message: "boom".to_string(),
        };
        assert_eq!(err.phase(), Phase::Authorizing);
        assert_eq!(err.status(), Some(500));

        let err = SubmissionError::Timeout {
            job_id: "J1".to_string(),
            attempts: 60,
        };
        assert_eq!(err.phase(), Phase::Polling);
        assert_eq!(err.status(), None);
        assert!(!err.is_preflight());

        assert!(SubmissionError::Connectivity { tried: 3 }.is_preflight());
        assert!(SubmissionError::Validation("too big".to_string()).is_preflight());
    }

    #[test]
    fn test_timeout_distinct_from_server_error() {
        let timeout = SubmissionError::Timeout {
            job_id: "J1".to_string(),
            attempts: 60,
        };
        assert!(timeout.to_string().contains("may still be processing"));
        assert!(!matches!(timeout, SubmissionError::ServerAnalysis { .. }));
    }

    #[test]
    fn test_error_context() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));
        let result = result.context("Failed to read config file");

        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("I/O error"));
    }
}
