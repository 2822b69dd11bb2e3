//! Backend abstraction for chat sessions

use async_trait::async_trait;
use parley_api::{
    ApiClient, ChatRequest, ConversationSnapshot, NewConversation, NewConversationRequest, Result,
    StreamEventStream, UploadedFile,
};

/// The backend calls a chat session depends on
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a streamed chat request; resolves when response headers arrive
    async fn open_stream(&self, endpoint: &str, request: &ChatRequest) -> Result<StreamEventStream>;

    /// Fetch a stored conversation
    async fn fetch_conversation(&self, id: &str) -> Result<ConversationSnapshot>;

    /// Create a conversation seeded with its first message
    async fn create_conversation(&self, request: &NewConversationRequest) -> Result<NewConversation>;

    /// Drop stored messages at and after `from_index`
    async fn truncate_conversation(&self, id: &str, from_index: usize) -> Result<()>;

    /// Store a file and return its server path
    async fn upload(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> Result<UploadedFile>;
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn open_stream(&self, endpoint: &str, request: &ChatRequest) -> Result<StreamEventStream> {
        self.stream_chat(endpoint, request).await
    }

    async fn fetch_conversation(&self, id: &str) -> Result<ConversationSnapshot> {
        self.get_conversation(id).await
    }

    async fn create_conversation(&self, request: &NewConversationRequest) -> Result<NewConversation> {
        self.new_conversation(request).await
    }

    async fn truncate_conversation(&self, id: &str, from_index: usize) -> Result<()> {
        ApiClient::truncate_conversation(self, id, from_index).await
    }

    async fn upload(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> Result<UploadedFile> {
        ApiClient::upload(self, file_name, bytes, mime).await
    }
}

/// In-memory backend with scripted streams
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use async_stream::stream;
    use parking_lot::Mutex;
    use parley_api::{Error, StreamEvent};
    use std::collections::{HashMap, VecDeque};

    /// One step of a scripted response body
    #[derive(Debug, Clone)]
    pub enum Chunk {
        Event(StreamEvent),
        /// Never yields; the stream hangs until dropped
        Stall,
    }

    pub fn delta(text: &str) -> Chunk {
        Chunk::Event(StreamEvent::Delta { text: text.into() })
    }

    pub fn done() -> Chunk {
        Chunk::Event(StreamEvent::Done)
    }

    #[derive(Default)]
    pub struct MockBackend {
        pub scripts: Mutex<VecDeque<std::result::Result<Vec<Chunk>, String>>>,
        pub requests: Mutex<Vec<(String, ChatRequest)>>,
        pub snapshots: Mutex<HashMap<String, ConversationSnapshot>>,
        pub truncations: Mutex<Vec<(String, usize)>>,
        pub created: Mutex<Vec<NewConversationRequest>>,
        pub uploads: Mutex<Vec<String>>,
        pub fail_truncate: Mutex<Option<String>>,
        pub fail_uploads: Mutex<Vec<String>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the body of the next chat response
        pub fn script(&self, chunks: Vec<Chunk>) {
            self.scripts.lock().push_back(Ok(chunks));
        }

        /// Make the next chat request fail before streaming
        pub fn script_failure(&self, message: &str) {
            self.scripts.lock().push_back(Err(message.to_string()));
        }

        pub fn insert_snapshot(&self, snapshot: ConversationSnapshot) {
            self.snapshots
                .lock()
                .insert(snapshot.conversation_id.clone(), snapshot);
        }

        pub fn requests(&self) -> Vec<(String, ChatRequest)> {
            self.requests.lock().clone()
        }

        pub fn truncations(&self) -> Vec<(String, usize)> {
            self.truncations.lock().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        async fn open_stream(&self, endpoint: &str, request: &ChatRequest) -> Result<StreamEventStream> {
            self.requests
                .lock()
                .push((endpoint.to_string(), request.clone()));
            let script = self
                .scripts
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![done()]));
            let chunks = script.map_err(|message| Error::Status {
                status: 500,
                message,
            })?;

            Ok(Box::pin(stream! {
                for chunk in chunks {
                    match chunk {
                        Chunk::Event(event) => yield event,
                        Chunk::Stall => futures::future::pending::<()>().await,
                    }
                }
            }))
        }

        async fn fetch_conversation(&self, id: &str) -> Result<ConversationSnapshot> {
            self.snapshots
                .lock()
                .get(id)
                .cloned()
                .ok_or_else(|| Error::status(404, r#"{"detail":"Conversation not found"}"#))
        }

        async fn create_conversation(&self, request: &NewConversationRequest) -> Result<NewConversation> {
            let mut created = self.created.lock();
            created.push(request.clone());
            let id = format!("c{}", created.len());
            self.snapshots.lock().insert(
                id.clone(),
                ConversationSnapshot {
                    conversation_id: id.clone(),
                    model: request.model.clone(),
                    temperature: request.temperature,
                    reason: request.reason,
                    system_message: request.system_message.clone(),
                    messages: vec![],
                },
            );
            Ok(NewConversation {
                conversation_id: id,
                alias: "New chat".into(),
            })
        }

        async fn truncate_conversation(&self, id: &str, from_index: usize) -> Result<()> {
            if let Some(message) = self.fail_truncate.lock().clone() {
                return Err(Error::status(400, &message));
            }
            self.truncations.lock().push((id.to_string(), from_index));
            Ok(())
        }

        async fn upload(&self, file_name: &str, _bytes: Vec<u8>, _mime: &str) -> Result<UploadedFile> {
            if self.fail_uploads.lock().iter().any(|n| n == file_name) {
                return Err(Error::Api(format!("cannot store {}", file_name)));
            }
            self.uploads.lock().push(file_name.to_string());
            Ok(UploadedFile {
                file_name: file_name.to_string(),
                file_path: format!("/uploads/{}", file_name),
            })
        }
    }
}
