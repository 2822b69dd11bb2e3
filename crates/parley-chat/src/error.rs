//! Error types for parley-chat

use parley_api::Role;
use thiserror::Error;

/// Result type alias using parley-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during chat operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the API layer
    #[error(transparent)]
    Api(#[from] parley_api::Error),

    /// Nothing to send
    #[error("Message is empty")]
    EmptyMessage,

    /// An attachment has not finished uploading
    #[error("Attachments are still uploading")]
    UploadsPending,

    /// A request is already in flight for this conversation
    #[error("A response is still streaming")]
    Busy,

    /// Message index outside the history
    #[error("No message at index {index} (history has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Operation needs a message of a different role
    #[error("Message {index} is not a {expected} turn")]
    WrongRole { index: usize, expected: Role },

    /// History refused a mutation that would break the streaming invariant
    #[error("History is locked while a response streams")]
    Streaming,

    /// File type not accepted as an attachment
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    /// Too many attachments
    #[error("At most {max} files can be attached")]
    TooManyFiles { max: usize },

    /// A settings change the current model does not allow
    #[error("{0}")]
    Setting(String),

    /// Operation needs a conversation
    #[error("No conversation is open")]
    NoConversation,
}

impl Error {
    /// Whether this error was caught before anything reached the backend.
    /// These surface as transient notices instead of chat messages.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Error::Api(_))
    }
}
