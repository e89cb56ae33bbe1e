use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a model transport.
///
/// The message is the raw error text (usually the provider's response body),
/// kept verbatim so the retry classification can inspect it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceError {
    message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failure is a transient overload of the provider.
    pub fn is_retriable(&self) -> bool {
        crate::retry::is_retriable(&self.message)
    }

    /// Best-effort human readable text: `error.message` from a JSON body,
    /// or `None` when the body is not in that shape.
    pub fn provider_message(&self) -> Option<String> {
        let body: Value = serde_json::from_str(&self.message).ok()?;
        body.pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Coarse error taxonomy used to pick the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    TransientService,
    MalformedResponse,
    TerminalService,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid report input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON format")]
    MalformedResponse { raw: String, reason: String },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::MissingCredential | AnalysisError::InvalidInput(_) => {
                ErrorKind::Validation
            }
            AnalysisError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            AnalysisError::Service(e) if e.is_retriable() => ErrorKind::TransientService,
            AnalysisError::Service(_) => ErrorKind::TerminalService,
        }
    }

    /// Message safe to show to the user. Raw bodies never leak through here.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::MissingCredential => {
                "Please provide an API key before analyzing a report.".to_string()
            }
            AnalysisError::InvalidInput(_) => {
                "Please provide a medical report to analyze.".to_string()
            }
            AnalysisError::MalformedResponse { .. } => {
                "Failed to analyze the report: the service returned an invalid JSON format."
                    .to_string()
            }
            AnalysisError::Service(e) if e.is_retriable() => {
                "The analysis service is temporarily unavailable. Please try again in a moment."
                    .to_string()
            }
            AnalysisError::Service(e) => match e.provider_message() {
                Some(message) => format!("Failed to analyze the report: {message}"),
                None => "Failed to analyze the report. Please try again.".to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing credential")]
    MissingCredential,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
