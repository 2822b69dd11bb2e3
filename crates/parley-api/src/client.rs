//! HTTP client for the chat backend
//!
//! Every call shares one cookie store, so a successful [`ApiClient::login`]
//! authenticates all later requests the way a browser session would.

use crate::{
    error::{Error, Result},
    stream::{StreamEventStream, events_from_body},
    types::{
        AuthStatus, ChatRequest, ConversationList, ConversationSnapshot, ConversationSummary,
        LoginRequest, LoginResponse, NewConversation, NewConversationRequest, RegisterRequest,
        RenameRequest, UploadResponse, UploadedFile, UserInfo,
    },
};
use serde::de::DeserializeOwned;

/// Backend API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the backend at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::InvalidConfig("server URL is empty".into()));
        }
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { client, base_url })
    }

    /// The backend base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into `Error::Status`
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::status(status.as_u16(), &body))
    }

    async fn json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let response = Self::check(response).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::json(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self.client.delete(self.url(path)).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    // Auth

    /// Current session state; never fails on an anonymous session
    pub async fn auth_status(&self) -> Result<AuthStatus> {
        self.get("/auth/status").await
    }

    /// Profile and billing of the signed-in user
    pub async fn user_info(&self) -> Result<UserInfo> {
        self.get("/auth/user").await
    }

    /// Sign in; the backend answers with a session cookie
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        tracing::debug!("Logging in as {}", email);
        let response = self
            .client
            .post(self.url("/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        Self::json(response).await
    }

    /// Drop the session cookie
    pub async fn logout(&self) -> Result<()> {
        let response = self.client.post(self.url("/logout")).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Create an account
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(&RegisterRequest {
                name,
                email,
                password,
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // Conversations

    /// All conversations of the signed-in user
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let list: ConversationList = self.get("/conversations").await?;
        Ok(list.conversations)
    }

    /// Full conversation with settings and history
    pub async fn get_conversation(&self, id: &str) -> Result<ConversationSnapshot> {
        self.get(&format!("/conversation/{}", id)).await
    }

    /// Create a conversation; the backend derives the alias from `user_message`
    pub async fn new_conversation(
        &self,
        request: &NewConversationRequest,
    ) -> Result<NewConversation> {
        let response = self
            .client
            .post(self.url("/new_conversation"))
            .json(request)
            .send()
            .await?;
        Self::json(response).await
    }

    /// Rename a conversation
    pub async fn rename_conversation(&self, id: &str, alias: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/conversation/{}/rename", id)))
            .json(&RenameRequest { alias })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Delete one conversation
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.delete(&format!("/conversation/{}", id)).await
    }

    /// Delete every conversation of the signed-in user
    pub async fn delete_all_conversations(&self) -> Result<()> {
        self.delete("/conversation/all").await
    }

    /// Drop stored messages at and after `from_index`
    pub async fn truncate_conversation(&self, id: &str, from_index: usize) -> Result<()> {
        tracing::debug!("Truncating conversation {} from {}", id, from_index);
        self.delete(&format!("/conversation/{}/{}", id, from_index))
            .await
    }

    // Files

    /// Store a file on the server and return its path
    pub async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<UploadedFile> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;
        let upload: UploadResponse = Self::json(response).await?;

        match upload {
            UploadResponse {
                error: Some(error), ..
            } => Err(Error::Api(error)),
            UploadResponse {
                file_name: Some(file_name),
                file_path: Some(file_path),
                ..
            } => Ok(UploadedFile {
                file_name,
                file_path,
            }),
            _ => Err(Error::Protocol("upload response without file path".into())),
        }
    }

    // Chat

    /// Open a streamed chat request against a model endpoint.
    ///
    /// Resolves once response headers arrive. A non-success status fails here;
    /// failures after that arrive as terminal events on the stream.
    pub async fn stream_chat(
        &self,
        endpoint: &str,
        request: &ChatRequest,
    ) -> Result<StreamEventStream> {
        tracing::info!(
            "Streaming {} via {} for conversation {}",
            request.model,
            endpoint,
            request.conversation_id
        );
        let response = self
            .client
            .post(self.url(endpoint))
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(events_from_body(response.bytes_stream()))
    }
}
