//! One chat exchange, end to end.
//!
//! An exchange validates the input, appends the user turn and snapshots the
//! context under the session lock, calls upstream with the lock released,
//! then re-acquires it to append the reply. A hard upstream failure leaves the
//! user turn as the newest entry and appends nothing else.

use tracing::{debug, info, warn};

use crate::completion::{Completion, CompletionClient};
use crate::error::GatewayError;
use crate::session::SessionStore;

#[derive(Debug, Clone)]
pub struct Gateway {
    sessions: SessionStore,
    completion: CompletionClient,
}

impl Gateway {
    pub fn new(sessions: SessionStore, completion: CompletionClient) -> Self {
        Self {
            sessions,
            completion,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn completion(&self) -> &CompletionClient {
        &self.completion
    }

    /// Runs one exchange for `session_id`.
    ///
    /// Returns the reply (genuine or fallback) that was appended to the
    /// conversation, or the reason nothing was.
    pub async fn chat(
        &self,
        session_id: &str,
        text: Option<&str>,
    ) -> Result<Completion, GatewayError> {
        let text = match text.map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => {
                debug!(session_id, "Rejected chat request without text");
                return Err(GatewayError::InvalidRequest(
                    "message text is missing or empty".to_string(),
                ));
            }
        };

        debug!(session_id, message = text, "Incoming message");
        let session = self.sessions.session(session_id);
        let snapshot = session.append_user_and_snapshot(text);

        let completion = match self.completion.complete(&snapshot).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(session_id, "Completion failed, keeping user turn only: {}", e);
                return Err(e.into());
            }
        };

        session.append_assistant(completion.text());
        if completion.is_fallback() {
            info!(session_id, "Replied with fallback text");
        }
        debug!(session_id, reply = completion.text(), "Outgoing reply");
        Ok(completion)
    }
}
