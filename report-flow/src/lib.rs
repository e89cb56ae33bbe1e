pub mod analyzer;
pub mod chat;
pub mod controller;
pub mod error;
pub mod models;
pub mod provider;
pub mod retry;
pub mod runner;
pub mod storage;

#[cfg(test)]
mod mock;

// Re-export commonly used types
pub use analyzer::ReportAnalyzer;
pub use chat::{build_system_instruction, start_session};
pub use controller::{AppState, Controller, DISCLAIMER, Event, Phase, Snapshot, transition};
pub use error::{AnalysisError, ErrorKind, ServiceError, SessionError, StorageError};
pub use models::{AnalysisPayload, ChatMessage, HealthParameter, ReportInput, Role};
pub use provider::{ChatProvider, ChatSession, GenerationRequest, GenerativeModel, Part};
pub use retry::{RetryPolicy, with_retry};
pub use runner::ReportRunner;
pub use storage::{DEFAULT_IDLE_TIMEOUT, InMemorySessionStorage, Session, SessionStorage};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedChat, ScriptedModel};
    use std::sync::Arc;

    const UNAVAILABLE: &str =
        r#"{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
    const HEMOGLOBIN: &str = r#"{"parameters":[{"parameter":"Hemoglobin","value":"14.1","unit":"g/dL","referenceRange":"13.5-17.5"}],"summary":"Hemoglobin within typical range."}"#;

    #[tokio::test(start_paused = true)]
    async fn test_report_to_chat_flow() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(UNAVAILABLE.to_string()),
            Err(UNAVAILABLE.to_string()),
            Ok(HEMOGLOBIN.to_string()),
        ]));
        let chat = Arc::new(ScriptedChat::new(vec![Ok(
            "Hemoglobin is the protein that carries oxygen in your blood.".to_string(),
        )]));
        let runner = ReportRunner::new(ReportAnalyzer::new(model.clone()), chat);

        let snapshot = runner.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Unauthenticated);

        let snapshot = runner.set_credential("test-key").await;
        assert_eq!(snapshot.phase, Phase::AwaitingInput);

        let snapshot = runner
            .analyze(Some(ReportInput::text("Hemoglobin 14.1 g/dL (13.5-17.5)")))
            .await;
        assert_eq!(model.calls(), 3);
        assert_eq!(snapshot.phase, Phase::ReportReady);
        let analysis = snapshot.analysis.unwrap();
        assert_eq!(analysis.summary, "Hemoglobin within typical range.");
        assert_eq!(analysis.parameters.len(), 1);
        let hemoglobin = &analysis.parameters[0];
        assert!(hemoglobin.value.is_some());
        assert!(hemoglobin.unit.is_some());
        assert!(hemoglobin.reference_range.is_some());

        let before = snapshot.transcript.len();
        let snapshot = runner.send_message("What is Hemoglobin?").await;
        assert_eq!(snapshot.transcript.len(), before + 2);
        assert_eq!(snapshot.transcript[before].role, Role::User);
        assert_eq!(snapshot.transcript[before + 1].role, Role::Model);

        let snapshot = runner.reset().await;
        assert_eq!(snapshot.phase, Phase::AwaitingInput);
        assert!(snapshot.analysis.is_none());
        assert!(snapshot.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_storage() {
        let storage = InMemorySessionStorage::new();
        let runner = ReportRunner::new(
            ReportAnalyzer::new(Arc::new(ScriptedModel::new(vec![]))),
            Arc::new(ScriptedChat::default()),
        );

        let session = Session::new(runner);
        let id = session.id.clone();
        storage.save(session).await.unwrap();

        let retrieved = storage.get(&id).await.unwrap().unwrap();
        retrieved.runner.set_credential("key").await;

        // runners are shared handles, so state set through one copy is visible in the other
        let again = storage.get(&id).await.unwrap().unwrap();
        assert!(again.runner.snapshot().await.has_credential);

        storage.delete(&id).await.unwrap();
        assert!(storage.get(&id).await.unwrap().is_none());
        assert!(storage.is_empty());
    }
}
