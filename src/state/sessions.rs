use crate::common::SessionPayload;
use crate::error::ChatError;
use crate::network::topics;

/// One pending inbound chat request. At most one per sender is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub sender: String,
    /// Millisecond epoch captured when the request was first recorded.
    /// This value, not the accept time, goes into the derived chat id.
    pub received_at: i64,
}

/// Outcome of recording an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    New,
    /// A request from this sender was already pending; its timestamp was
    /// refreshed in place and its list position kept.
    Refreshed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub sender: String,
    pub text: String,
    pub sent_at: i64,
}

/// An established one-to-one chat. Append-only log, process lifetime,
/// no close.
#[derive(Debug)]
pub struct Session {
    pub chat_id: String,
    pub peer: String,
    pub log: Vec<SessionEntry>,
}

/// Request/accept handshake state plus the local session logs.
///
/// The pending state of a handshake lives only on the receiving side; the
/// requester holds nothing until the confirmation arrives. The accepter
/// derives the chat id from data both sides already know; the requester
/// adopts the announced id verbatim, which keeps clock skew out of the
/// agreement.
#[derive(Debug)]
pub struct SessionNegotiator {
    self_id: String,
    pending: Vec<ChatRequest>,
    sessions: Vec<Session>,
}

impl SessionNegotiator {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            pending: Vec::new(),
            sessions: Vec::new(),
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Reject empty, self-targeted and topic-unsafe requests before
    /// anything is published. The target id becomes the `<target>_Control`
    /// publish topic.
    pub fn validate_target(&self, target: &str) -> Result<(), ChatError> {
        if !topics::is_topic_safe(target) {
            return Err(ChatError::InvalidInput(
                "peer ids must be non-empty, without whitespace or /+#".into(),
            ));
        }
        if target == self.self_id {
            return Err(ChatError::InvalidInput(
                "cannot request a chat with yourself".into(),
            ));
        }
        Ok(())
    }

    /// De-duplicates by sender: a repeated request refreshes the stored
    /// timestamp instead of stacking a second entry.
    pub fn record_request(&mut self, sender: &str, now_millis: i64) -> RequestOutcome {
        if let Some(existing) = self.pending.iter_mut().find(|r| r.sender == sender) {
            existing.received_at = now_millis;
            return RequestOutcome::Refreshed;
        }
        self.pending.push(ChatRequest {
            sender: sender.to_string(),
            received_at: now_millis,
        });
        RequestOutcome::New
    }

    /// Pending inbound requests in arrival order.
    pub fn pending(&self) -> &[ChatRequest] {
        &self.pending
    }

    /// Accept the pending request at `index` (1-based, as listed).
    ///
    /// Removes the request, derives the session topic from the requester,
    /// ourselves and the request timestamp, and opens the local session.
    /// The caller publishes the confirmation and subscribes.
    pub fn accept(&mut self, index: usize) -> Result<(String, String), ChatError> {
        if index == 0 || index > self.pending.len() {
            return Err(ChatError::SelectionOutOfRange {
                index,
                len: self.pending.len(),
            });
        }
        let request = self.pending.remove(index - 1);
        let chat_id = format!(
            "{}_{}_{}",
            request.sender, self.self_id, request.received_at
        );
        self.open_session(&chat_id, &request.sender);
        Ok((request.sender, chat_id))
    }

    /// Register an established session. Idempotent; a confirmation replay
    /// does not reset the log.
    pub fn open_session(&mut self, chat_id: &str, peer: &str) {
        if self.is_session(chat_id) {
            return;
        }
        self.sessions.push(Session {
            chat_id: chat_id.to_string(),
            peer: peer.to_string(),
            log: Vec::new(),
        });
    }

    pub fn is_session(&self, chat_id: &str) -> bool {
        self.sessions.iter().any(|s| s.chat_id == chat_id)
    }

    pub fn session(&self, chat_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.chat_id == chat_id)
    }

    /// Established sessions in the order they were opened.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Validate and build an outgoing line, appending it to the local log
    /// immediately (optimistic echo). The caller publishes the returned
    /// payload; the broker's echo of it is skipped on arrival.
    pub fn compose(
        &mut self,
        chat_id: &str,
        text: &str,
        now_millis: i64,
    ) -> Result<SessionPayload, ChatError> {
        if text.is_empty() {
            return Err(ChatError::InvalidInput("message text is empty".into()));
        }
        if !self.is_session(chat_id) {
            return Err(ChatError::InvalidInput(format!(
                "no open session '{chat_id}'"
            )));
        }
        let payload = SessionPayload {
            sender: self.self_id.clone(),
            text: text.to_string(),
            sent_at: now_millis,
        };
        self.append(chat_id, SessionEntry {
            sender: payload.sender.clone(),
            text: payload.text.clone(),
            sent_at: payload.sent_at,
        });
        Ok(payload)
    }

    /// Append an inbound line to its session log. Returns false when the
    /// topic does not belong to any open session.
    pub fn append(&mut self, chat_id: &str, entry: SessionEntry) -> bool {
        match self.sessions.iter_mut().find(|s| s.chat_id == chat_id) {
            Some(session) => {
                session.log.push(entry);
                true
            }
            None => false,
        }
    }
}
