//! Send/cancel controller
//!
//! The synchronous half of a send: guards, request building and the
//! `Idle -> Sending -> Streaming -> Idle` transitions. It never awaits, so
//! every ordering question (stale events, cancel racing a delta) is decided
//! here by comparing request tokens. The session drives it from the network.

use crate::{
    accumulator::{Accumulator, Applied, RequestToken},
    attachments::Attachments,
    error::{Error, Result},
    events::SendOutcome,
    history::History,
    settings::Settings,
};
use parley_api::{ChatRequest, Message, ModelCatalog, ModelInfo, StreamEvent};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    /// No request; input enabled
    Idle,
    /// Request issued, waiting for response headers
    Sending,
    /// Reading the response body
    Streaming,
}

/// The one outstanding request of a session
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Correlates log lines of one request
    pub id: Uuid,
    pub token: RequestToken,
    pub cancel: CancellationToken,
    pub model: ModelInfo,
    pub request: ChatRequest,
}

/// A request reached a terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    pub token: RequestToken,
    pub outcome: SendOutcome,
    /// Assistant message sealed by this transition
    pub sealed: Option<usize>,
    /// Error message appended by this transition
    pub error_index: Option<usize>,
}

/// Result of applying one stream event
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Event belonged to a request that is no longer current
    Ignored,
    /// A delta landed in the history
    Applied(Applied),
    /// The request ended
    Finished(Finished),
}

#[derive(Debug)]
pub struct SendController {
    state: SendState,
    next_token: u64,
    pending: Option<PendingRequest>,
    accumulator: Accumulator,
}

impl Default for SendController {
    fn default() -> Self {
        Self::new()
    }
}

impl SendController {
    pub fn new() -> Self {
        Self {
            state: SendState::Idle,
            next_token: 0,
            pending: None,
            accumulator: Accumulator::new(),
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    /// Whether a request is sending or streaming
    pub fn is_active(&self) -> bool {
        self.state != SendState::Idle
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn is_thinking(&self) -> bool {
        self.accumulator.is_thinking()
    }

    fn mint(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken(self.next_token)
    }

    /// Validate a send and move to `Sending`.
    ///
    /// Appends the user turn and returns the pending request. Nothing is
    /// touched when a guard rejects the send.
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        &mut self,
        history: &mut History,
        settings: &Settings,
        catalog: &ModelCatalog,
        conversation_id: &str,
        text: &str,
        attachments: &Attachments,
        cancel: CancellationToken,
    ) -> Result<&PendingRequest> {
        if self.is_active() {
            return Err(Error::Busy);
        }
        if text.trim().is_empty() && attachments.is_empty() {
            return Err(Error::EmptyMessage);
        }
        if attachments.is_uploading() {
            return Err(Error::UploadsPending);
        }
        let model = settings.model_info(catalog)?.clone();

        let files = attachments.parts();
        history.append(Message::user_with_parts(text, files.clone()))?;

        let request = ChatRequest {
            conversation_id: conversation_id.to_string(),
            model: model.model_name.clone(),
            in_billing: model.in_billing,
            out_billing: model.out_billing,
            search_billing: model.search_billing,
            temperature: settings.temperature,
            reason: settings.reason,
            system_message: settings.system_message.clone(),
            user_message: text.to_string(),
            files,
            dan: settings.is_dan,
            stream: model.stream,
        };

        let token = self.mint();
        let thinking = settings.is_inference || model.inference;
        self.accumulator.begin(token, thinking);
        self.state = SendState::Sending;

        let pending = PendingRequest {
            id: Uuid::new_v4(),
            token,
            cancel,
            model,
            request,
        };
        tracing::debug!("Request {} ({}) sending", pending.token, pending.id);
        Ok(self.pending.insert(pending))
    }

    fn is_current(&self, token: RequestToken) -> bool {
        self.pending.as_ref().map(|p| p.token) == Some(token)
    }

    /// Response headers arrived
    pub fn stream_opened(&mut self, token: RequestToken) -> bool {
        if !self.is_current(token) || self.state != SendState::Sending {
            return false;
        }
        self.state = SendState::Streaming;
        true
    }

    /// Apply one stream event
    pub fn apply(&mut self, history: &mut History, token: RequestToken, event: StreamEvent) -> Step {
        if !self.is_current(token) {
            tracing::warn!("Dropping event for stale request {}", token);
            return Step::Ignored;
        }
        match event {
            StreamEvent::Delta { text } => match self.accumulator.append(history, token, &text) {
                Some(applied) => Step::Applied(applied),
                None => Step::Ignored,
            },
            StreamEvent::Done => {
                let sealed = self.accumulator.finalize(history, token);
                Step::Finished(self.finish(token, SendOutcome::Completed, sealed, None))
            }
            StreamEvent::ServerError { message } => Step::Finished(self.error_exit(history, token, message)),
            StreamEvent::ProtocolError { message } => Step::Finished(self.error_exit(
                history,
                token,
                format!("Malformed response: {}", message),
            )),
            StreamEvent::TransportError { message } => Step::Finished(self.error_exit(
                history,
                token,
                format!("Connection lost: {}", message),
            )),
        }
    }

    /// The request failed before or outside the stream (e.g. a non-2xx status)
    pub fn fail(&mut self, history: &mut History, token: RequestToken, message: String) -> Option<Finished> {
        if !self.is_current(token) {
            return None;
        }
        Some(self.error_exit(history, token, message))
    }

    /// Cancel the active request, keeping partial content
    pub fn cancel(&mut self, history: &mut History) -> Option<Finished> {
        let pending = self.pending.as_ref()?;
        let token = pending.token;
        pending.cancel.cancel();
        let sealed = self.accumulator.abandon(history, token);
        tracing::info!("Request {} cancelled", token);
        Some(self.finish(token, SendOutcome::Cancelled, sealed, None))
    }

    fn error_exit(&mut self, history: &mut History, token: RequestToken, message: String) -> Finished {
        let sealed = self.accumulator.fail(history, token);
        let error_index = match history.append(Message::error(message.clone())) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!("Could not record error message: {}", e);
                None
            }
        };
        tracing::info!("Request {} failed: {}", token, message);
        self.finish(token, SendOutcome::Errored { message }, sealed, error_index)
    }

    fn finish(
        &mut self,
        token: RequestToken,
        outcome: SendOutcome,
        sealed: Option<usize>,
        error_index: Option<usize>,
    ) -> Finished {
        self.pending = None;
        self.state = SendState::Idle;
        Finished {
            token,
            outcome,
            sealed,
            error_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_api::Role;

    struct Fixture {
        controller: SendController,
        history: History,
        settings: Settings,
        catalog: ModelCatalog,
        attachments: Attachments,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                controller: SendController::new(),
                history: History::new(),
                settings: Settings::default(),
                catalog: ModelCatalog::builtin(),
                attachments: Attachments::new(),
            }
        }

        fn begin(&mut self, text: &str) -> Result<RequestToken> {
            self.controller
                .begin(
                    &mut self.history,
                    &self.settings,
                    &self.catalog,
                    "c1",
                    text,
                    &self.attachments,
                    CancellationToken::new(),
                )
                .map(|p| p.token)
        }

        fn apply(&mut self, token: RequestToken, event: StreamEvent) -> Step {
            self.controller.apply(&mut self.history, token, event)
        }
    }

    fn delta(s: &str) -> StreamEvent {
        StreamEvent::Delta { text: s.into() }
    }

    #[test]
    fn test_two_plus_two() {
        let mut f = Fixture::new();
        let token = f.begin("2+2?").unwrap();
        let request = f.controller.pending().unwrap().request.clone();
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.temperature, 0.5);
        assert_eq!(f.controller.state(), SendState::Sending);

        assert!(f.controller.stream_opened(token));
        assert_eq!(f.controller.state(), SendState::Streaming);
        assert_eq!(f.apply(token, delta("4")), Step::Applied(Applied::Started(1)));
        assert!(matches!(
            f.apply(token, StreamEvent::Done),
            Step::Finished(Finished { outcome: SendOutcome::Completed, sealed: Some(1), .. })
        ));

        assert_eq!(
            f.history.messages(),
            &[Message::user("2+2?"), Message::assistant("4")]
        );
        assert_eq!(f.controller.state(), SendState::Idle);
    }

    #[test]
    fn test_error_first_frame() {
        let mut f = Fixture::new();
        let token = f.begin("hi").unwrap();
        f.controller.stream_opened(token);
        let step = f.apply(
            token,
            StreamEvent::ServerError {
                message: "rate limited".into(),
            },
        );
        assert!(matches!(
            step,
            Step::Finished(Finished { sealed: None, error_index: Some(1), .. })
        ));
        assert_eq!(f.history.len(), 2);
        let last = f.history.last().unwrap();
        assert_eq!(last.role(), Role::Error);
        assert!(last.text().contains("rate limited"));
        assert!(f.history.messages().iter().all(|m| m.role() != Role::Assistant));
    }

    #[test]
    fn test_error_after_partial_content() {
        let mut f = Fixture::new();
        let token = f.begin("hi").unwrap();
        f.apply(token, delta("par"));
        f.apply(
            token,
            StreamEvent::TransportError {
                message: "reset".into(),
            },
        );
        assert_eq!(f.history.len(), 3);
        assert_eq!(f.history.messages()[1], Message::assistant("par"));
        assert_eq!(f.history.messages()[2].role(), Role::Error);
        assert!(f.history.is_consistent());
        assert_eq!(f.history.remote_len(), 0);
    }

    #[test]
    fn test_guards() {
        let mut f = Fixture::new();
        assert!(matches!(f.begin("   "), Err(Error::EmptyMessage)));

        f.attachments.admit(["a.txt"]);
        assert!(matches!(f.begin("x"), Err(Error::UploadsPending)));
        f.attachments.clear();

        f.settings.model = "gpt-2".into();
        assert!(matches!(
            f.begin("x"),
            Err(Error::Api(parley_api::Error::ModelNotFound(_)))
        ));
        f.settings = Settings::default();

        f.begin("first").unwrap();
        assert!(matches!(f.begin("second"), Err(Error::Busy)));
        assert_eq!(f.history.len(), 1);
    }

    #[test]
    fn test_attachment_only_send() {
        let mut f = Fixture::new();
        let admission = f.attachments.admit(["a.txt"]);
        f.attachments
            .resolve(
                admission.accepted[0].0,
                Ok(parley_api::Part::file("a.txt", "data:text/plain;base64,aGk=")),
            )
            .unwrap();
        f.begin("").unwrap();
        let request = &f.controller.pending().unwrap().request;
        assert_eq!(request.files.len(), 1);
        assert_eq!(f.history.messages()[0].attachments().len(), 1);
    }

    #[test]
    fn test_cancel_mid_stream_drops_queued_events() {
        let mut f = Fixture::new();
        let token = f.begin("hi").unwrap();
        f.controller.stream_opened(token);
        f.apply(token, delta("Hel"));

        let cancel = f.controller.pending().unwrap().cancel.clone();
        let finished = f.controller.cancel(&mut f.history).unwrap();
        assert_eq!(finished.outcome, SendOutcome::Cancelled);
        assert!(cancel.is_cancelled());

        // Events already queued behind the abort
        assert_eq!(f.apply(token, delta("lo")), Step::Ignored);
        assert_eq!(f.apply(token, StreamEvent::Done), Step::Ignored);

        let last = f.history.last().unwrap();
        assert_eq!(last.text(), "Hel");
        assert!(last.is_interrupted());
        assert_eq!(f.controller.state(), SendState::Idle);
    }

    #[test]
    fn test_fast_cancel_and_resend() {
        let mut f = Fixture::new();
        let old = f.begin("one").unwrap();
        f.apply(old, delta("a"));
        f.controller.cancel(&mut f.history);

        let new = f.begin("two").unwrap();
        assert_ne!(old, new);
        assert_eq!(f.apply(old, delta("stale")), Step::Ignored);
        f.apply(new, delta("fresh"));
        f.apply(new, StreamEvent::Done);

        assert_eq!(f.history.last().unwrap().text(), "fresh");
        assert!(f.history.messages().iter().all(|m| !m.text().contains("stale")));
    }

    #[test]
    fn test_cancel_while_sending() {
        let mut f = Fixture::new();
        f.begin("hi").unwrap();
        let finished = f.controller.cancel(&mut f.history).unwrap();
        assert_eq!(finished.sealed, None);
        assert_eq!(f.history.len(), 1);
        assert!(f.controller.cancel(&mut f.history).is_none());
    }

    #[test]
    fn test_thinking_indicator() {
        let mut f = Fixture::new();
        f.settings.is_inference = true;
        let token = f.begin("hmm").unwrap();
        assert!(f.controller.is_thinking());
        f.apply(token, delta("x"));
        assert!(!f.controller.is_thinking());
    }

    #[test]
    fn test_fail_before_stream() {
        let mut f = Fixture::new();
        let token = f.begin("hi").unwrap();
        let finished = f
            .controller
            .fail(&mut f.history, token, "Server error 500: boom".into())
            .unwrap();
        assert!(matches!(finished.outcome, SendOutcome::Errored { .. }));
        assert_eq!(f.history.last().unwrap().role(), Role::Error);
        assert!(f.controller.fail(&mut f.history, token, "again".into()).is_none());
    }
}
