use std::sync::Arc;
use tracing::info;

use crate::{
    error::SessionError,
    models::{AnalysisPayload, HealthParameter},
    provider::{ChatProvider, ChatSession},
};

const ASSISTANT_GUIDELINES: &str = r#"You are a friendly and helpful health assistant. Your goal is to have a natural conversation with the user about their medical report, using the report data below to answer their questions clearly and simply. Informal questions like "what's up with my hemoglobin?" are fine.

Guidelines:
1. When the user asks about something in their report, explain what the medical term means in plain language.
2. You may quote the user's specific result (e.g., "Your report shows your Hemoglobin is 14 g/dL"), but never interpret it or say whether it is "good" or "bad".
3. You are an AI assistant, not a doctor. You MUST NEVER give medical advice, a diagnosis, or tell the user what to do about their results.
4. If the user asks for advice, interpretation, or a diagnosis, politely decline and recommend they consult a qualified healthcare professional.
5. Keep explanations easy to follow for someone without a medical background."#;

/// Render one parameter as a context line.
pub fn format_parameter(p: &HealthParameter) -> String {
    format!(
        "- {}: {} {} (Reference Range: {})",
        p.parameter,
        p.value.as_deref().unwrap_or("N/A"),
        p.unit.as_deref().unwrap_or(""),
        p.reference_range.as_deref().unwrap_or("N/A"),
    )
}

pub fn build_system_instruction(payload: &AnalysisPayload) -> String {
    let parameters = payload
        .parameters
        .iter()
        .map(format_parameter)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{ASSISTANT_GUIDELINES}\n\n--- USER'S REPORT CONTEXT ---\nSummary: {}\n\nParameters:\n{}\n---\n",
        payload.summary, parameters
    )
}

/// Open a chat session seeded with the analyzed report.
pub fn start_session(
    provider: &dyn ChatProvider,
    credential: Option<&str>,
    payload: &AnalysisPayload,
) -> Result<Arc<dyn ChatSession>, SessionError> {
    let credential = credential
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(SessionError::MissingCredential)?;

    let instruction = build_system_instruction(payload);
    let session = provider.open(credential, &instruction)?;
    info!(
        "Chat session started with {} report parameters in context",
        payload.parameters.len()
    );
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedChat;

    fn payload() -> AnalysisPayload {
        AnalysisPayload {
            parameters: vec![
                HealthParameter {
                    parameter: "Hemoglobin".to_string(),
                    value: Some("14.1".to_string()),
                    unit: Some("g/dL".to_string()),
                    reference_range: Some("13.5-17.5".to_string()),
                },
                HealthParameter {
                    parameter: "Urine color".to_string(),
                    value: Some("Yellow".to_string()),
                    unit: None,
                    reference_range: None,
                },
                HealthParameter {
                    parameter: "Ketones".to_string(),
                    value: None,
                    unit: Some("mg/dL".to_string()),
                    reference_range: Some("Negative".to_string()),
                },
            ],
            summary: "Routine panel.".to_string(),
        }
    }

    #[test]
    fn context_lists_every_parameter_in_order() {
        let instruction = build_system_instruction(&payload());

        let hemoglobin = instruction
            .find("- Hemoglobin: 14.1 g/dL (Reference Range: 13.5-17.5)")
            .unwrap();
        let urine = instruction
            .find("- Urine color: Yellow  (Reference Range: N/A)")
            .unwrap();
        let ketones = instruction
            .find("- Ketones: N/A mg/dL (Reference Range: Negative)")
            .unwrap();

        assert!(hemoglobin < urine && urine < ketones);
        assert!(instruction.contains("Summary: Routine panel."));
        assert!(instruction.contains("healthcare professional"));
    }

    #[test]
    fn session_is_bound_to_the_instruction() {
        let provider = ScriptedChat::new(vec![]);
        let payload = payload();

        start_session(&provider, Some("key"), &payload).unwrap();

        let instructions = provider.instructions.lock().unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0], build_system_instruction(&payload));
    }

    #[test]
    fn blank_credential_is_rejected() {
        let provider = ScriptedChat::new(vec![]);

        let err = start_session(&provider, Some(""), &payload()).err().unwrap();
        assert!(matches!(err, SessionError::MissingCredential));

        let err = start_session(&provider, None, &payload()).err().unwrap();
        assert!(matches!(err, SessionError::MissingCredential));
        assert!(provider.instructions.lock().unwrap().is_empty());
    }
}
