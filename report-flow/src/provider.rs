use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ServiceError;

/// One part of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    /// Base64 data tagged with its mime type
    InlineData { mime_type: String, data: String },
}

/// A structured-generation request: content parts plus the JSON schema the
/// reply must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub parts: Vec<Part>,
    pub response_schema: Value,
}

/// Structured generation against the external model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Returns the raw reply text, expected to be JSON matching the schema.
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<String, ServiceError>;
}

/// A live conversation with server-side (or handle-held) history.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one user message and return the complete model reply.
    async fn send(&self, message: &str) -> Result<String, ServiceError>;
}

/// Opens chat sessions bound to a system instruction.
pub trait ChatProvider: Send + Sync {
    fn open(
        &self,
        credential: &str,
        system_instruction: &str,
    ) -> Result<Arc<dyn ChatSession>, ServiceError>;
}
