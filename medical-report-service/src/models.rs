use report_flow::Snapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
}

/// A report file already read by the client: plain text as-is, images and
/// PDFs base64-encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileUpload {
    pub content: String,
    pub mime_type: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnalyzeReportRequest {
    pub text: Option<String>,
    pub file: Option<FileUpload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub state: Snapshot,
}
