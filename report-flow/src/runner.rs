//! ReportRunner: drives one user session through the controller.
//!
//! The controller lock is held only around state changes; the analysis call,
//! its backoff delays and the chat turn all run with the lock released, so a
//! snapshot can be read while a call is outstanding. A second submission in
//! that window is rejected by the controller guards rather than queued.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::{
    analyzer::ReportAnalyzer,
    chat::start_session,
    controller::{Controller, Snapshot},
    models::ReportInput,
    provider::ChatProvider,
};

#[derive(Clone)]
pub struct ReportRunner {
    analyzer: ReportAnalyzer,
    chat_provider: Arc<dyn ChatProvider>,
    controller: Arc<Mutex<Controller>>,
}

impl ReportRunner {
    pub fn new(analyzer: ReportAnalyzer, chat_provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            analyzer,
            chat_provider,
            controller: Arc::new(Mutex::new(Controller::new())),
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.controller.lock().await.snapshot()
    }

    pub async fn set_credential(&self, key: &str) -> Snapshot {
        let mut controller = self.controller.lock().await;
        controller.set_credential(key);
        controller.snapshot()
    }

    pub async fn invalidate_credential(&self) -> Snapshot {
        let mut controller = self.controller.lock().await;
        controller.invalidate_credential();
        controller.snapshot()
    }

    pub async fn reset(&self) -> Snapshot {
        let mut controller = self.controller.lock().await;
        controller.reset();
        controller.snapshot()
    }

    /// Analyze a report and open the chat session seeded with the result.
    pub async fn analyze(&self, input: Option<ReportInput>) -> Snapshot {
        let ticket = {
            let mut controller = self.controller.lock().await;
            match controller.submit_report(input) {
                Some(ticket) => ticket,
                None => return controller.snapshot(),
            }
        };

        let outcome = self
            .analyzer
            .analyze(&ticket.input, Some(&ticket.credential))
            .await;

        let mut controller = self.controller.lock().await;
        match outcome {
            Ok(payload) => {
                match start_session(
                    self.chat_provider.as_ref(),
                    Some(&ticket.credential),
                    &payload,
                ) {
                    Ok(session) => controller.complete_analysis(&ticket, payload, session),
                    Err(e) => {
                        error!("Failed to start chat session: {}", e);
                        controller.fail_analysis(
                            &ticket,
                            "Failed to start a chat session for this report. Please try again.",
                        );
                    }
                }
            }
            Err(e) => {
                error!("Report analysis failed ({:?}): {}", e.kind(), e);
                controller.fail_analysis(&ticket, e.user_message());
            }
        }
        controller.snapshot()
    }

    /// Send one chat message. A no-op without a live session or for blank text.
    pub async fn send_message(&self, message: &str) -> Snapshot {
        let ticket = {
            let mut controller = self.controller.lock().await;
            match controller.submit_message(message) {
                Some(ticket) => ticket,
                None => return controller.snapshot(),
            }
        };

        let reply = ticket.session.send(&ticket.message).await;
        if reply.is_ok() {
            info!("Chat reply received");
        }

        let mut controller = self.controller.lock().await;
        controller.complete_message(&ticket, reply);
        controller.snapshot()
    }
}
