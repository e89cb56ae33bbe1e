use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_PDF: &str = "application/pdf";

/// One extracted lab value. `None` means the report did not state it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthParameter {
    pub parameter: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

/// Result of analyzing one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    pub parameters: Vec<HealthParameter>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A report ready to be sent for analysis.
///
/// For `text/plain` the content is the report text itself; for images and
/// PDFs it is the base64-encoded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInput {
    pub content: String,
    pub mime_type: String,
}

impl ReportInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            mime_type: TEXT_PLAIN.to_string(),
        }
    }

    /// An already base64-encoded image or PDF.
    pub fn attachment(
        mime_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, UnsupportedFileType> {
        let mime_type = mime_type.into();
        if !is_supported_mime(&mime_type) {
            return Err(UnsupportedFileType(mime_type));
        }
        Ok(Self {
            content: content.into(),
            mime_type,
        })
    }

    /// Read raw file bytes: plain text is decoded, images and PDFs are
    /// base64-encoded.
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Result<Self, UnsupportedFileType> {
        if mime_type == TEXT_PLAIN {
            return Ok(Self::text(String::from_utf8_lossy(bytes)));
        }
        Self::attachment(mime_type, STANDARD.encode(bytes))
    }

    /// Resolve the input form: non-blank pasted text wins over a file.
    pub fn from_form(text: Option<String>, file: Option<ReportInput>) -> Option<Self> {
        match text {
            Some(text) if !text.trim().is_empty() => Some(Self::text(text)),
            _ => file,
        }
    }

    pub fn is_text(&self) -> bool {
        self.mime_type == TEXT_PLAIN
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

pub fn is_supported_mime(mime_type: &str) -> bool {
    mime_type == TEXT_PLAIN || mime_type == APPLICATION_PDF || mime_type.starts_with("image/")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Please upload a valid .txt, image, or .pdf file.")]
pub struct UnsupportedFileType(pub String);
