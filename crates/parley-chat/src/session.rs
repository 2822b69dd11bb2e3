//! Chat session: one conversation view driven from a single task
//!
//! The session owns the history, settings, attachments and the send
//! controller, and drives a streamed request from the network into them.
//! Cancellation comes from outside through a [`ChatHandle`].

use crate::{
    accumulator::{Applied, RequestToken},
    attachments::{AttachmentKind, Attachments, data_url, mime_for},
    controller::{Finished, SendController, Step},
    error::{Error, Result},
    events::{ChatEvent, SendOutcome},
    handle::ChatHandle,
    history::History,
    notice::{Notice, Notices},
    settings::Settings,
    transport::ChatBackend,
};
use futures::StreamExt;
use parley_api::{Message, ModelCatalog, NewConversationRequest, Part, StreamEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A conversation view and its in-flight request
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    catalog: ModelCatalog,
    conversation_id: Option<String>,
    alias: Option<String>,
    history: History,
    settings: Settings,
    controller: SendController,
    attachments: Attachments,
    draft: String,
    notices: Notices,
    event_tx: broadcast::Sender<ChatEvent>,
    handle: ChatHandle,
}

impl ChatSession {
    /// Create a session with no conversation open
    pub fn new(backend: Arc<dyn ChatBackend>, catalog: ModelCatalog) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            backend,
            catalog,
            conversation_id: None,
            alias: None,
            history: History::new(),
            settings: Settings::default(),
            controller: SendController::new(),
            attachments: Attachments::new(),
            draft: String::new(),
            notices: Notices::default(),
            event_tx,
            handle: ChatHandle::new(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// Get a handle to cancel the current request from outside
    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Alias the backend gave a conversation started in this session
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn controller(&self) -> &SendController {
        &self.controller
    }

    /// Text recovered by an edit, waiting to be resent
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Notices that have not expired yet
    pub fn notices(&mut self) -> Vec<Notice> {
        self.notices.active()
    }

    fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }

    fn notify(&mut self, message: impl Into<String>) {
        let notice = self.notices.push(message);
        self.emit(ChatEvent::Notice {
            message: notice.message,
        });
    }

    /// Surface a rejected operation. Validation errors become notices.
    fn reject(&mut self, error: Error) -> Error {
        if error.is_validation() {
            self.notify(error.to_string());
        }
        error
    }

    fn ensure_idle(&mut self) -> Result<()> {
        if self.controller.is_active() {
            return Err(self.reject(Error::Busy));
        }
        Ok(())
    }

    fn push_error_message(&mut self, text: String) {
        match self.history.append(Message::error(text)) {
            Ok(index) => {
                let message = self.history.messages()[index].clone();
                self.emit(ChatEvent::MessageAdded { index, message });
            }
            Err(e) => tracing::warn!("Could not record error message: {}", e),
        }
    }

    // Settings

    /// Change settings through one of the [`Settings`] operations.
    /// A rejected change leaves the settings untouched and raises a notice.
    pub fn update_settings<T>(
        &mut self,
        f: impl FnOnce(&mut Settings, &ModelCatalog) -> Result<T>,
    ) -> Result<T> {
        let mut next = self.settings.clone();
        match f(&mut next, &self.catalog) {
            Ok(value) => {
                self.settings = next;
                self.emit(ChatEvent::SettingsChanged {
                    settings: self.settings.clone(),
                });
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                self.notify(message);
                Err(e)
            }
        }
    }

    fn sync_image_flag(&mut self) {
        let has_image = self.attachments.has_image();
        if self.settings.is_image == has_image {
            return;
        }
        if self.settings.set_image_pending(has_image, &self.catalog) {
            let message = format!("Switched to {} to read images", self.settings.model);
            self.notify(message);
        }
        self.emit(ChatEvent::SettingsChanged {
            settings: self.settings.clone(),
        });
    }

    // Attachments

    /// Attach local files. Each file resolves independently; failures raise a
    /// notice and drop only that file. Returns how many files were attached.
    pub async fn attach(&mut self, paths: Vec<PathBuf>) -> usize {
        let mut jobs = Vec::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let admission = self.attachments.admit([name]);
            for notice in admission.notices() {
                self.notify(notice);
            }
            jobs.extend(
                admission
                    .accepted
                    .into_iter()
                    .map(|(id, name, kind)| (id, name, kind, path.clone())),
            );
        }

        let backend = Arc::clone(&self.backend);
        let uploads = jobs.into_iter().map(|(id, name, kind, path)| {
            let backend = Arc::clone(&backend);
            async move {
                let result = load_attachment(backend.as_ref(), &path, &name, kind).await;
                (id, result)
            }
        });
        let results = futures::future::join_all(uploads).await;

        let mut attached = 0;
        for (id, result) in results {
            match self.attachments.resolve(id, result) {
                Ok(()) => attached += 1,
                Err(e) => self.notify(format!("Could not attach file: {}", e)),
            }
        }
        self.sync_image_flag();
        attached
    }

    /// Remove a pending attachment by name
    pub fn detach(&mut self, name: &str) -> bool {
        let removed = self.attachments.remove(name);
        self.sync_image_flag();
        removed
    }

    // Conversations

    /// Leave the current conversation and start from a blank state
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.conversation_id = None;
        self.alias = None;
        self.history.clear();
        self.settings = Settings::default();
        self.attachments.clear();
        self.draft.clear();
        self.emit(ChatEvent::HistoryReset { len: 0 });
        self.emit(ChatEvent::SettingsChanged {
            settings: self.settings.clone(),
        });
        Ok(())
    }

    /// Open a stored conversation, replacing history and settings
    pub async fn load(&mut self, id: &str) -> Result<()> {
        self.ensure_idle()?;
        let snapshot = match self.backend.fetch_conversation(id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.notify(format!("Could not open conversation: {}", e));
                return Err(e.into());
            }
        };
        tracing::info!(
            "Loaded conversation {} ({} messages)",
            snapshot.conversation_id,
            snapshot.messages.len()
        );

        self.settings.apply_snapshot(&snapshot, &self.catalog);
        self.conversation_id = Some(snapshot.conversation_id);
        self.alias = None;
        self.history.hydrate(snapshot.messages);
        self.attachments.clear();
        self.settings.is_image = false;
        self.draft.clear();

        self.emit(ChatEvent::HistoryReset {
            len: self.history.len(),
        });
        self.emit(ChatEvent::SettingsChanged {
            settings: self.settings.clone(),
        });
        Ok(())
    }

    /// Create a conversation from its first message, then stream the answer
    pub async fn start_new(&mut self, text: &str) -> Result<SendOutcome> {
        self.ensure_idle()?;
        if text.trim().is_empty() && self.attachments.is_empty() {
            return Err(self.reject(Error::EmptyMessage));
        }
        let model = match self.settings.model_info(&self.catalog) {
            Ok(model) => model.model_name.clone(),
            Err(e) => return Err(self.reject(e)),
        };

        let request = NewConversationRequest {
            model,
            temperature: self.settings.temperature,
            reason: self.settings.reason,
            system_message: self.settings.system_message.clone(),
            user_message: text.to_string(),
        };
        let created = match self.backend.create_conversation(&request).await {
            Ok(created) => created,
            Err(e) => {
                self.notify(format!("Could not start a new conversation: {}", e));
                return Err(e.into());
            }
        };
        tracing::info!(
            "Created conversation {} ({})",
            created.conversation_id,
            created.alias
        );

        let messages = match self.backend.fetch_conversation(&created.conversation_id).await {
            Ok(snapshot) => snapshot.messages,
            Err(e) => {
                tracing::warn!("Fetching new conversation failed: {}", e);
                Vec::new()
            }
        };
        self.conversation_id = Some(created.conversation_id);
        self.alias = Some(created.alias);
        self.history.hydrate(messages);
        self.emit(ChatEvent::HistoryReset {
            len: self.history.len(),
        });

        self.send(text).await
    }

    // Sending

    /// Send a message with the pending attachments and stream the reply.
    ///
    /// Returns once the request reaches a terminal state. Validation failures
    /// return `Err` and raise a notice; transport and server failures are
    /// recorded in the history and reported as [`SendOutcome::Errored`].
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome> {
        self.ensure_idle()?;
        let Some(conversation_id) = self.conversation_id.clone() else {
            return Err(self.reject(Error::NoConversation));
        };

        let cancel = self.handle.arm();
        let begun = self.controller.begin(
            &mut self.history,
            &self.settings,
            &self.catalog,
            &conversation_id,
            text,
            &self.attachments,
            cancel.clone(),
        );
        let pending = match begun {
            Ok(pending) => pending.clone(),
            Err(e) => {
                self.handle.disarm();
                return Err(self.reject(e));
            }
        };

        self.draft.clear();
        self.attachments.clear();
        self.sync_image_flag();

        let user_index = self.history.len() - 1;
        self.emit(ChatEvent::MessageAdded {
            index: user_index,
            message: self.history.messages()[user_index].clone(),
        });
        self.emit(ChatEvent::RequestStart {
            token: pending.token.0,
            model: pending.model.model_name.clone(),
        });
        if self.controller.is_thinking() {
            self.emit(ChatEvent::ThinkingStart);
        }

        let span = tracing::info_span!("request", id = %pending.id, token = pending.token.0);
        let outcome = self
            .drive(pending.token, &pending.model.endpoint, &pending.request, cancel)
            .instrument(span)
            .await;
        self.handle.disarm();
        Ok(outcome)
    }

    /// Send the draft left by an edit
    pub async fn send_draft(&mut self) -> Result<SendOutcome> {
        let text = self.draft.clone();
        self.send(&text).await
    }

    async fn drive(
        &mut self,
        token: RequestToken,
        endpoint: &str,
        request: &parley_api::ChatRequest,
        cancel: CancellationToken,
    ) -> SendOutcome {
        let backend = Arc::clone(&self.backend);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = backend.open_stream(endpoint, request) => Some(result),
        };

        let mut stream = match opened {
            None => return self.finish_cancelled(),
            Some(Err(e)) => {
                let finished = self.controller.fail(&mut self.history, token, e.to_string());
                return self.finish(finished);
            }
            Some(Ok(stream)) => stream,
        };

        if self.controller.stream_opened(token) {
            tracing::debug!("Stream open");
            self.emit(ChatEvent::StreamOpen { token: token.0 });
        }

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = stream.next() => Some(event.unwrap_or(StreamEvent::Done)),
            };
            let Some(event) = event else {
                return self.finish_cancelled();
            };

            let delta = match &event {
                StreamEvent::Delta { text } => Some(text.clone()),
                _ => None,
            };
            let was_thinking = self.controller.is_thinking();
            let step = self.controller.apply(&mut self.history, token, event);
            if was_thinking && !self.controller.is_thinking() {
                self.emit(ChatEvent::ThinkingEnd);
            }

            match step {
                Step::Ignored => {}
                Step::Applied(applied) => {
                    if let Applied::Started(index) = applied {
                        self.emit(ChatEvent::MessageStart { index });
                    }
                    self.emit(ChatEvent::MessageDelta {
                        index: applied.index(),
                        delta: delta.unwrap_or_default(),
                    });
                }
                Step::Finished(finished) => return self.finish(Some(finished)),
            }
        }
    }

    fn finish_cancelled(&mut self) -> SendOutcome {
        let was_thinking = self.controller.is_thinking();
        let finished = self.controller.cancel(&mut self.history);
        if was_thinking {
            self.emit(ChatEvent::ThinkingEnd);
        }
        self.finish(finished)
    }

    fn finish(&mut self, finished: Option<Finished>) -> SendOutcome {
        let Some(finished) = finished else {
            return SendOutcome::Cancelled;
        };
        if let Some(index) = finished.sealed {
            self.emit(ChatEvent::MessageEnd {
                index,
                message: self.history.messages()[index].clone(),
            });
        }
        if let Some(index) = finished.error_index {
            self.emit(ChatEvent::MessageAdded {
                index,
                message: self.history.messages()[index].clone(),
            });
        }
        self.emit(ChatEvent::RequestEnd {
            token: finished.token.0,
            outcome: finished.outcome.clone(),
        });
        finished.outcome
    }

    /// Settle a request whose send future was dropped before it finished.
    /// Returns false when nothing was in flight.
    pub fn cancel(&mut self) -> bool {
        if !self.controller.is_active() {
            return false;
        }
        self.finish_cancelled();
        self.handle.disarm();
        true
    }

    // History edits

    /// Truncate on the backend first, then locally. A backend failure is
    /// recorded as an error message and leaves the history as it was.
    async fn truncate_synced(&mut self, index: usize) -> Result<()> {
        if index > self.history.len() {
            return Err(self.reject(Error::IndexOutOfRange {
                index,
                len: self.history.len(),
            }));
        }
        if let Some(id) = self.conversation_id.clone() {
            let remote = self.history.remote_index(index);
            if remote < self.history.remote_len() {
                if let Err(e) = self.backend.truncate_conversation(&id, remote).await {
                    self.push_error_message(format!("Could not update the conversation: {}", e));
                    return Err(e.into());
                }
            }
        }
        self.history.truncate_from(index)?;
        self.emit(ChatEvent::HistoryReset {
            len: self.history.len(),
        });
        Ok(())
    }

    /// Resubmit the user turn that produced the assistant reply at `index`
    pub async fn regenerate(&mut self, index: usize) -> Result<SendOutcome> {
        self.ensure_idle()?;
        let (text, parts) = match self.history.regenerate_source(index) {
            Ok(source) => source,
            Err(e) => return Err(self.reject(e)),
        };
        self.truncate_synced(index - 1).await?;
        self.attachments.restore(parts);
        self.sync_image_flag();
        self.send(&text).await
    }

    /// Drop the user turn at `index` and everything after it, putting its
    /// text and attachments back into the draft. Returns the draft text.
    pub async fn edit(&mut self, index: usize) -> Result<String> {
        self.ensure_idle()?;
        let (text, parts) = match self.history.edit_source(index) {
            Ok(source) => source,
            Err(e) => return Err(self.reject(e)),
        };
        self.truncate_synced(index).await?;
        self.draft = text.clone();
        self.attachments.restore(parts);
        self.sync_image_flag();
        Ok(text)
    }

    /// Delete the message at `index` and everything after it
    pub async fn delete_from(&mut self, index: usize) -> Result<()> {
        self.ensure_idle()?;
        if index >= self.history.len() {
            return Err(self.reject(Error::IndexOutOfRange {
                index,
                len: self.history.len(),
            }));
        }
        self.truncate_synced(index).await
    }
}

/// Read a file and turn it into a message part
async fn load_attachment(
    backend: &dyn ChatBackend,
    path: &Path,
    name: &str,
    kind: AttachmentKind,
) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(parley_api::Error::from)?;
    let mime = mime_for(name);
    match kind {
        AttachmentKind::Image => {
            let uploaded = backend.upload(name, bytes, mime).await?;
            Ok(Part::image(uploaded.file_name, uploaded.file_path))
        }
        AttachmentKind::Document => Ok(Part::file(name, data_url(mime, &bytes))),
    }
}
