//! parley-chat: conversation runtime
//!
//! Holds the client-side state of one conversation (message history,
//! request settings, pending attachments) and drives a streamed reply into
//! it with cancellation. Network access goes through [`ChatBackend`].

pub mod accumulator;
pub mod attachments;
pub mod controller;
pub mod error;
pub mod events;
pub mod handle;
pub mod history;
pub mod notice;
pub mod session;
pub mod settings;
pub mod transport;

pub use accumulator::{Accumulator, Applied, RequestToken};
pub use attachments::{Attachment, AttachmentKind, AttachmentState, Attachments, MAX_ATTACHMENTS};
pub use controller::{SendController, SendState};
pub use error::{Error, Result};
pub use events::{ChatEvent, SendOutcome};
pub use handle::ChatHandle;
pub use history::History;
pub use notice::{Notice, Notices};
pub use session::ChatSession;
pub use settings::Settings;
pub use transport::ChatBackend;
