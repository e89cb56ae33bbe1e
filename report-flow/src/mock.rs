//! Scripted transports for unit tests.

use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::Notify;

use crate::{
    error::ServiceError,
    provider::{ChatProvider, ChatSession, GenerationRequest, GenerativeModel},
};

/// Replays a fixed list of outcomes, one per call.
pub struct ScriptedModel {
    outcomes: Mutex<VecDeque<Result<String, String>>>,
    credentials: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(outcomes: Vec<Result<String, String>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            credentials: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(
        &self,
        credential: &str,
        _request: &GenerationRequest,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials.lock().unwrap().push(credential.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
            .map_err(ServiceError::new)
    }
}

/// A model that blocks until released, for in-flight scenarios.
pub struct GatedModel {
    pub gate: Arc<Notify>,
    reply: String,
    calls: AtomicUsize,
}

impl GatedModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            gate: Arc::new(Notify::new()),
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for GatedModel {
    async fn generate(
        &self,
        _credential: &str,
        _request: &GenerationRequest,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(self.reply.clone())
    }
}

/// Chat provider whose sessions answer from a shared script.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    pub instructions: Mutex<Vec<String>>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Default::default()
        }
    }
}

impl ChatProvider for ScriptedChat {
    fn open(
        &self,
        _credential: &str,
        system_instruction: &str,
    ) -> Result<Arc<dyn ChatSession>, ServiceError> {
        self.instructions
            .lock()
            .unwrap()
            .push(system_instruction.to_string());
        Ok(Arc::new(ScriptedSession {
            replies: self.replies.clone(),
            sent: self.sent.clone(),
        }))
    }
}

struct ScriptedSession {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn send(&self, message: &str) -> Result<String, ServiceError> {
        self.sent.lock().unwrap().push(message.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
            .map_err(ServiceError::new)
    }
}
