use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::Json,
    routing::{get, post, put},
};
use report_flow::{
    ChatProvider, InMemorySessionStorage, ReportAnalyzer, ReportInput, ReportRunner, RetryPolicy,
    Session, SessionStorage, Snapshot, StorageError,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    config::ServiceConfig,
    gemini::{GeminiChatProvider, GeminiClient},
    models::{AnalyzeReportRequest, ChatRequest, CredentialRequest, SessionResponse},
};

/// Inline attachments are capped at 20 MB by the model API.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub analyzer: ReportAnalyzer,
    pub chat_provider: Arc<dyn ChatProvider>,
    /// Applied to every new session when set at deployment time
    pub default_credential: Option<String>,
}

pub fn create_app(config: &ServiceConfig) -> Router {
    build_router(create_app_state(config))
}

fn create_app_state(config: &ServiceConfig) -> AppState {
    let model = Arc::new(GeminiClient::new(
        config.api_base.clone(),
        config.analysis_model.clone(),
    ));
    let analyzer = ReportAnalyzer::new(model).with_retry_policy(RetryPolicy::new(
        config.max_retries,
        config.retry_base_delay,
    ));

    AppState {
        session_storage: Arc::new(InMemorySessionStorage::with_idle_timeout(
            config.session_idle_timeout,
        )),
        analyzer,
        chat_provider: Arc::new(GeminiChatProvider::new(
            &config.api_base,
            config.chat_model.clone(),
        )),
        default_credential: config.api_key.clone(),
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route(
            "/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/sessions/{session_id}/credential",
            put(set_credential).delete(clear_credential),
        )
        .route("/sessions/{session_id}/analyze", post(analyze_report))
        .route("/sessions/{session_id}/upload", post(upload_report))
        .route("/sessions/{session_id}/chat", post(send_message))
        .route("/sessions/{session_id}/reset", post(reset_session))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Medical Report Assistant",
        "version": "0.1.0",
        "description": "Extracts health parameters from medical reports and answers questions about them. Not medical advice.",
        "endpoints": {
            "POST /sessions": "Create a session",
            "GET /sessions/{session_id}": "Get session state",
            "DELETE /sessions/{session_id}": "Delete a session",
            "PUT /sessions/{session_id}/credential": "Set the API key",
            "DELETE /sessions/{session_id}/credential": "Forget the API key and reset",
            "POST /sessions/{session_id}/analyze": "Analyze a report (text or file)",
            "POST /sessions/{session_id}/upload": "Analyze a raw file body; Content-Type gives its type",
            "POST /sessions/{session_id}/chat": "Ask a question about the analyzed report",
            "POST /sessions/{session_id}/reset": "Start over with a new report",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn session_response(session_id: &str, state: Snapshot) -> Json<SessionResponse> {
    Json(SessionResponse {
        session_id: session_id.to_string(),
        state,
    })
}

async fn load_session(state: &AppState, session_id: &str) -> Result<Session, ApiError> {
    state
        .session_storage
        .require(session_id)
        .await
        .map_err(|e| match e {
            StorageError::SessionNotFound(id) => not_found_error("Session not found", &id),
        })
}

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let runner = ReportRunner::new(state.analyzer.clone(), state.chat_provider.clone());
    if let Some(key) = &state.default_credential {
        runner.set_credential(key).await;
    }
    let session = Session::new(runner);
    let session_id = session.id.clone();
    let snapshot = session.runner.snapshot().await;

    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to create session: {}", e);
        internal_error("Failed to create session", &e.to_string())
    })?;

    info!("Session {} created", session_id);
    Ok((StatusCode::CREATED, session_response(&session_id, snapshot)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    Ok(session_response(&session_id, session.runner.snapshot().await))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    load_session(&state, &session_id).await?;
    state
        .session_storage
        .delete(&session_id)
        .await
        .map_err(|e| internal_error("Failed to delete session", &e.to_string()))?;

    info!("Session {} deleted", session_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn set_credential(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CredentialRequest>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    info!("Setting credential for session {}", session_id);
    let snapshot = session.runner.set_credential(&request.api_key).await;
    Ok(session_response(&session_id, snapshot))
}

async fn clear_credential(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    let snapshot = session.runner.invalidate_credential().await;
    Ok(session_response(&session_id, snapshot))
}

/// Non-blank pasted text wins; the file is only looked at without it.
fn report_input(request: AnalyzeReportRequest) -> Result<Option<ReportInput>, ApiError> {
    if let Some(input) = ReportInput::from_form(request.text, None) {
        return Ok(Some(input));
    }
    request
        .file
        .map(|file| ReportInput::attachment(file.mime_type, file.content))
        .transpose()
        .map_err(|e| bad_request_error(&e.to_string()))
}

async fn run_analysis(
    session: Session,
    session_id: &str,
    input: Option<ReportInput>,
) -> Json<SessionResponse> {
    info!("Starting report analysis for session {}", session_id);
    let snapshot = session.runner.analyze(input).await;
    info!(
        "Report analysis for session {} finished in phase {:?}",
        session_id, snapshot.phase
    );
    session_response(session_id, snapshot)
}

async fn analyze_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AnalyzeReportRequest>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    let input = report_input(request)?;
    Ok(run_analysis(session, &session_id, input).await)
}

fn media_type(headers: &HeaderMap) -> &str {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .unwrap_or_default()
}

async fn upload_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    let input = ReportInput::from_bytes(media_type(&headers), &body)
        .map_err(|e| bad_request_error(&e.to_string()))?;
    Ok(run_analysis(session, &session_id, Some(input)).await)
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    let snapshot = session.runner.send_message(&request.message).await;
    Ok(session_response(&session_id, snapshot))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let session = load_session(&state, &session_id).await?;
    info!("Resetting session {}", session_id);
    Ok(session_response(&session_id, session.runner.reset().await))
}
