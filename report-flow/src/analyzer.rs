use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};
use tracing::{error, info, warn};

use crate::{
    error::AnalysisError,
    models::{AnalysisPayload, HealthParameter, ReportInput},
    provider::{GenerationRequest, GenerativeModel, Part},
    retry::{RetryPolicy, with_retry},
};

/// Wire-level stand-in for "unknown"; never reaches a consumer.
pub const NULL_SENTINEL: &str = "null";

const ANALYSIS_INSTRUCTIONS: &str = r#"You are a professional medical report analysis assistant.
Your task is to extract all health parameters from the provided document (text, image, or PDF), organize them into the specified JSON format, and provide a neutral summary of the results.

RULES:
1. Extract every identifiable health parameter together with its value, unit, and reference range.
2. Every extracted data point (parameter, value, unit, referenceRange) MUST be a string in the JSON output. A numeric value of 12.5 is returned as the string "12.5".
3. If a value, unit, or reference range is unclear or missing, use the literal string 'null'. Do not use the JSON null type.
4. You MUST NEVER give medical advice, a diagnosis, or an interpretation. Only extract and neutrally summarize what the report contains.
5. Your entire response MUST be a single valid JSON object that adheres to the provided schema.
6. The summary is a short text based ONLY on the provided report."#;

/// Response schema in the provider's OpenAPI subset.
pub static ANALYSIS_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "type": "OBJECT",
        "properties": {
            "parameters": {
                "type": "ARRAY",
                "description": "List of all extracted health parameters.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "parameter": {
                            "type": "STRING",
                            "description": "Name of the health parameter (e.g., 'Hemoglobin', 'Glucose')."
                        },
                        "value": {
                            "type": "STRING",
                            "description": "The measured value as a string (e.g., '14.1', 'Negative'). Use the string 'null' if not present."
                        },
                        "unit": {
                            "type": "STRING",
                            "description": "The unit of measurement (e.g., 'g/dL'). Use the string 'null' if not present."
                        },
                        "referenceRange": {
                            "type": "STRING",
                            "description": "The normal or reference range. Use the string 'null' if not present."
                        }
                    },
                    "required": ["parameter", "value", "unit", "referenceRange"]
                }
            },
            "summary": {
                "type": "STRING",
                "description": "A brief, neutral summary of the key findings. It MUST NOT contain medical advice."
            }
        },
        "required": ["parameters", "summary"]
    })
});

/// Extracts health parameters and a neutral summary from a report.
#[derive(Clone)]
pub struct ReportAnalyzer {
    model: Arc<dyn GenerativeModel>,
    retry: RetryPolicy,
}

impl ReportAnalyzer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn analyze(
        &self,
        input: &ReportInput,
        credential: Option<&str>,
    ) -> Result<AnalysisPayload, AnalysisError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AnalysisError::MissingCredential)?;

        if input.is_empty() {
            return Err(AnalysisError::InvalidInput("report content is empty".to_string()));
        }

        info!(
            "Analyzing report ({}, {} bytes of content)",
            input.mime_type,
            input.content.len()
        );

        let request = build_request(input);
        let model = self.model.as_ref();
        let request = &request;
        let raw = with_retry(&self.retry, move || model.generate(credential, request)).await?;

        let payload = parse_analysis(&raw)?;
        info!(
            "Report analysis extracted {} parameters",
            payload.parameters.len()
        );
        Ok(payload)
    }
}

pub fn build_request(input: &ReportInput) -> GenerationRequest {
    let parts = if input.is_text() {
        vec![Part::Text(format!(
            "{ANALYSIS_INSTRUCTIONS}\n\nMedical Report Text:\n---\n{}\n---",
            input.content
        ))]
    } else {
        vec![
            Part::Text(format!(
                "{ANALYSIS_INSTRUCTIONS}\n\nExtract the data from the provided file."
            )),
            Part::InlineData {
                mime_type: input.mime_type.clone(),
                data: input.content.clone(),
            },
        ]
    };

    GenerationRequest {
        parts,
        response_schema: ANALYSIS_SCHEMA.clone(),
    }
}

#[derive(Deserialize)]
struct WireAnalysis {
    parameters: Vec<WireParameter>,
    summary: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireParameter {
    parameter: String,
    #[serde(deserialize_with = "wire_field")]
    value: Option<String>,
    #[serde(deserialize_with = "wire_field")]
    unit: Option<String>,
    #[serde(deserialize_with = "wire_field")]
    reference_range: Option<String>,
}

/// Strings pass through, numbers and booleans are rendered, JSON null is absent.
fn wire_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string field, found {other}"
        ))),
    }
}

fn normalize(field: Option<String>) -> Option<String> {
    field.filter(|value| value != NULL_SENTINEL)
}

/// Parse the raw model reply and translate sentinels into absence.
pub fn parse_analysis(raw: &str) -> Result<AnalysisPayload, AnalysisError> {
    let text = raw.trim();
    let wire: WireAnalysis = serde_json::from_str(text).map_err(|e| {
        error!("Failed to parse analysis response: {}", e);
        error!("Raw response: {}", text);
        AnalysisError::MalformedResponse {
            raw: text.to_string(),
            reason: e.to_string(),
        }
    })?;

    let parameters = wire
        .parameters
        .into_iter()
        .filter_map(|p| {
            if p.parameter.trim().is_empty() {
                warn!("Dropping extracted parameter without a name");
                return None;
            }
            Some(HealthParameter {
                parameter: p.parameter,
                value: normalize(p.value),
                unit: normalize(p.unit),
                reference_range: normalize(p.reference_range),
            })
        })
        .collect();

    Ok(AnalysisPayload {
        parameters,
        summary: wire.summary,
    })
}
