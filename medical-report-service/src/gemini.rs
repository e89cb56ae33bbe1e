//! Gemini transports.
//!
//! Structured generation goes straight to the REST `generateContent`
//! endpoint, since it needs inline attachments and a response schema.
//! Chat turns go through a rig agent whose preamble is the system
//! instruction; the handle keeps the history and replays it every turn.

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use report_flow::{ChatProvider, ChatSession, GenerationRequest, GenerativeModel, Part, ServiceError};
use rig::{
    agent::Agent,
    client::CompletionClient,
    completion::{Chat, Message},
    providers::gemini,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct GeminiClient {
    http: Client,
    api_base: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<String, ServiceError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        info!("Calling {} with {} parts", self.model, request.parts.len());

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", credential)
            .json(&generate_content_body(request))
            .send()
            .await
            .map_err(|e| ServiceError::new(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::new(e.to_string()))?;

        if !status.is_success() {
            error!("Gemini request failed with {}: {}", status, body);
            // the body carries the structured error the retry classifier reads
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            };
            return Err(ServiceError::new(message));
        }

        extract_text(&body).map_err(|e| {
            error!("Unexpected Gemini response: {}", e);
            ServiceError::new(e.to_string())
        })
    }
}

fn generate_content_body(request: &GenerationRequest) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineData { mime_type, data } => json!({
                "inlineData": { "mimeType": mime_type, "data": data }
            }),
        })
        .collect();

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": request.response_schema,
        }
    })
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &str) -> anyhow::Result<String> {
    let response: Value = serde_json::from_str(body)?;
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid response format from Gemini: no candidate content"))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    Ok(text)
}

pub struct GeminiChatProvider {
    host: String,
    model: String,
}

impl GeminiChatProvider {
    /// `api_base` is the same versioned base the REST client uses; rig adds
    /// the version segment itself, so only the host part is kept.
    pub fn new(api_base: &str, model: impl Into<String>) -> Self {
        Self {
            host: chat_host(api_base),
            model: model.into(),
        }
    }
}

fn chat_host(api_base: &str) -> String {
    let base = api_base.trim_end_matches('/');
    base.strip_suffix("/v1beta").unwrap_or(base).to_string()
}

impl ChatProvider for GeminiChatProvider {
    fn open(
        &self,
        credential: &str,
        system_instruction: &str,
    ) -> Result<Arc<dyn ChatSession>, ServiceError> {
        let client = gemini::Client::builder(credential)
            .base_url(&self.host)
            .build()
            .map_err(|e| ServiceError::new(e.to_string()))?;
        let agent = client
            .agent(&self.model)
            .preamble(system_instruction)
            .build();

        Ok(Arc::new(GeminiChatSession {
            agent,
            history: Mutex::new(Vec::new()),
        }))
    }
}

struct GeminiChatSession {
    agent: Agent<gemini::completion::CompletionModel>,
    history: Mutex<Vec<Message>>,
}

#[async_trait]
impl ChatSession for GeminiChatSession {
    async fn send(&self, message: &str) -> Result<String, ServiceError> {
        let mut history = self.history.lock().await;
        let reply = self
            .agent
            .chat(message.to_string(), history.clone())
            .await
            .map_err(|e| ServiceError::new(e.to_string()))?;

        history.push(Message::user(message));
        history.push(Message::assistant(reply.clone()));
        Ok(reply)
    }
}
