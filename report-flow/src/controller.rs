//! Application state machine.
//!
//! [`transition`] is a pure function of `(AppState, Event)`. [`Controller`]
//! wraps it with the submission guards and owns the chat session handle,
//! which is not plain data and so lives outside [`AppState`].
//!
//! Completions carry the epoch they were started under. Reset, credential
//! invalidation and every new analysis bump the epoch, so a late response
//! belonging to discarded state is ignored.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    models::{AnalysisPayload, ChatMessage, ReportInput},
    provider::ChatSession,
};

pub const GREETING: &str = "Your report has been analyzed. Feel free to ask questions about it. Please remember, I cannot provide medical advice.";
pub const DISCLAIMER: &str = "Disclaimer: This is an AI-generated summary and is not a substitute for professional medical advice.";
pub const CHAT_FALLBACK: &str = "Sorry, I encountered an error. Please try again.";
pub const EMPTY_REPORT: &str = "Please provide a medical report to analyze.";
pub const ANALYSIS_IN_PROGRESS: &str = "An analysis is already in progress.";
pub const MISSING_CREDENTIAL: &str = "Please provide an API key before analyzing a report.";
pub const INVALID_CREDENTIAL: &str = "Please enter a valid API key.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Unauthenticated,
    AwaitingInput,
    Analyzing,
    ReportReady,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub phase: Phase,
    pub credential: Option<String>,
    pub payload: Option<AnalysisPayload>,
    pub transcript: Vec<ChatMessage>,
    pub sending: bool,
    pub error: Option<String>,
    pub epoch: u64,
}

impl AppState {
    /// Everything but the credential and the epoch counter.
    fn cleared(self) -> Self {
        Self {
            phase: if self.credential.is_some() {
                Phase::AwaitingInput
            } else {
                Phase::Unauthenticated
            },
            credential: self.credential,
            epoch: self.epoch + 1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    CredentialProvided(String),
    CredentialInvalidated,
    SubmissionRejected(String),
    AnalysisStarted,
    AnalysisSucceeded { epoch: u64, payload: AnalysisPayload },
    AnalysisFailed { epoch: u64, message: String },
    Reset,
    MessageSent(String),
    ReplyReceived { epoch: u64, text: String },
    ReplyFailed { epoch: u64 },
}

pub fn transition(state: AppState, event: Event) -> AppState {
    match event {
        Event::CredentialProvided(key) => {
            let key = key.trim().to_string();
            if key.is_empty() {
                return AppState {
                    error: Some(INVALID_CREDENTIAL.to_string()),
                    ..state
                };
            }
            if state.credential.as_deref() == Some(key.as_str()) {
                return AppState {
                    error: None,
                    ..state
                };
            }
            // a report and chat opened under another key do not carry over
            AppState {
                credential: Some(key),
                ..state
            }
            .cleared()
        }
        Event::CredentialInvalidated => AppState {
            epoch: state.epoch + 1,
            ..Default::default()
        },
        Event::SubmissionRejected(message) => AppState {
            error: Some(message),
            ..state
        },
        Event::AnalysisStarted => AppState {
            phase: Phase::Analyzing,
            payload: None,
            transcript: Vec::new(),
            sending: false,
            error: None,
            epoch: state.epoch + 1,
            ..state
        },
        Event::AnalysisSucceeded { epoch, payload } => {
            if epoch != state.epoch || state.phase != Phase::Analyzing {
                return state;
            }
            AppState {
                phase: Phase::ReportReady,
                payload: Some(payload),
                transcript: vec![ChatMessage::model(GREETING)],
                error: None,
                ..state
            }
        }
        Event::AnalysisFailed { epoch, message } => {
            if epoch != state.epoch || state.phase != Phase::Analyzing {
                return state;
            }
            AppState {
                phase: Phase::AwaitingInput,
                error: Some(message),
                ..state
            }
        }
        Event::Reset => state.cleared(),
        Event::MessageSent(text) => {
            let mut transcript = state.transcript;
            transcript.push(ChatMessage::user(text));
            AppState {
                transcript,
                sending: true,
                ..state
            }
        }
        Event::ReplyReceived { epoch, text } => reply(state, epoch, text),
        Event::ReplyFailed { epoch } => reply(state, epoch, CHAT_FALLBACK.to_string()),
    }
}

fn reply(state: AppState, epoch: u64, text: String) -> AppState {
    if epoch != state.epoch || !state.sending {
        return state;
    }
    let mut transcript = state.transcript;
    transcript.push(ChatMessage::model(text));
    AppState {
        transcript,
        sending: false,
        ..state
    }
}

/// Permission to run one analysis, issued by [`Controller::submit_report`].
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub epoch: u64,
    pub credential: String,
    pub input: ReportInput,
}

/// Permission to run one chat turn, issued by [`Controller::submit_message`].
#[derive(Clone)]
pub struct ChatTicket {
    pub epoch: u64,
    pub message: String,
    pub session: Arc<dyn ChatSession>,
}

/// Serializable view of the state; never includes the credential.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub has_credential: bool,
    pub analyzing: bool,
    pub sending: bool,
    pub error: Option<String>,
    pub analysis: Option<AnalysisPayload>,
    /// Shown alongside the summary whenever an analysis is present
    pub disclaimer: Option<&'static str>,
    pub transcript: Vec<ChatMessage>,
}

#[derive(Default)]
pub struct Controller {
    state: AppState,
    chat: Option<Arc<dyn ChatSession>>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn has_chat_session(&self) -> bool {
        self.chat.is_some()
    }

    pub fn apply(&mut self, event: Event) {
        let state = std::mem::take(&mut self.state);
        self.state = transition(state, event);
        if self.state.phase != Phase::ReportReady {
            self.chat = None;
        }
    }

    pub fn set_credential(&mut self, key: impl Into<String>) {
        self.apply(Event::CredentialProvided(key.into()));
    }

    pub fn invalidate_credential(&mut self) {
        info!("Credential invalidated, resetting session state");
        self.apply(Event::CredentialInvalidated);
    }

    pub fn reset(&mut self) {
        self.apply(Event::Reset);
    }

    /// Guard an analysis submission. Rejections are recorded as a
    /// user-visible error and yield no ticket.
    pub fn submit_report(&mut self, input: Option<ReportInput>) -> Option<AnalysisTicket> {
        let rejection = match (&input, &self.state.credential) {
            _ if self.state.phase == Phase::Analyzing => Some(ANALYSIS_IN_PROGRESS),
            (None, _) => Some(EMPTY_REPORT),
            (Some(input), _) if input.is_empty() => Some(EMPTY_REPORT),
            (_, None) => Some(MISSING_CREDENTIAL),
            _ => None,
        };
        if let Some(message) = rejection {
            debug!("Analysis submission rejected: {}", message);
            self.apply(Event::SubmissionRejected(message.to_string()));
            return None;
        }

        let input = input?;
        let credential = self.state.credential.clone()?;
        self.apply(Event::AnalysisStarted);
        Some(AnalysisTicket {
            epoch: self.state.epoch,
            credential,
            input,
        })
    }

    /// Record a finished analysis together with its chat session.
    pub fn complete_analysis(
        &mut self,
        ticket: &AnalysisTicket,
        payload: AnalysisPayload,
        session: Arc<dyn ChatSession>,
    ) {
        if !self.is_current_analysis(ticket.epoch) {
            debug!("Ignoring stale analysis result for epoch {}", ticket.epoch);
            return;
        }
        self.apply(Event::AnalysisSucceeded {
            epoch: ticket.epoch,
            payload,
        });
        self.chat = Some(session);
    }

    pub fn fail_analysis(&mut self, ticket: &AnalysisTicket, message: impl Into<String>) {
        if !self.is_current_analysis(ticket.epoch) {
            debug!("Ignoring stale analysis failure for epoch {}", ticket.epoch);
            return;
        }
        self.apply(Event::AnalysisFailed {
            epoch: ticket.epoch,
            message: message.into(),
        });
    }

    fn is_current_analysis(&self, epoch: u64) -> bool {
        epoch == self.state.epoch && self.state.phase == Phase::Analyzing
    }

    /// Guard a chat submission: no session, a blank message or a turn
    /// already in flight make this a no-op.
    pub fn submit_message(&mut self, message: &str) -> Option<ChatTicket> {
        if message.trim().is_empty() || self.state.sending {
            return None;
        }
        let session = self.chat.clone()?;
        self.apply(Event::MessageSent(message.to_string()));
        Some(ChatTicket {
            epoch: self.state.epoch,
            message: message.to_string(),
            session,
        })
    }

    /// Record the outcome of a chat turn. A failure is logged and shown to
    /// the user as the fallback message.
    pub fn complete_message(
        &mut self,
        ticket: &ChatTicket,
        reply: Result<String, ServiceError>,
    ) {
        let event = match reply {
            Ok(text) => Event::ReplyReceived {
                epoch: ticket.epoch,
                text,
            },
            Err(e) => {
                warn!("Chat turn failed: {}", e);
                Event::ReplyFailed {
                    epoch: ticket.epoch,
                }
            }
        };
        self.apply(event);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.state.phase,
            has_credential: self.state.credential.is_some(),
            analyzing: self.state.phase == Phase::Analyzing,
            sending: self.state.sending,
            error: self.state.error.clone(),
            analysis: self.state.payload.clone(),
            disclaimer: self.state.payload.as_ref().map(|_| DISCLAIMER),
            transcript: self.state.transcript.clone(),
        }
    }
}
