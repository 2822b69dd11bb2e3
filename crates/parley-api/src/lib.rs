//! parley-api: wire layer for the parley chat backend
//!
//! This crate provides the message types shared with the backend, the
//! incremental stream frame parser, the model catalog and an HTTP client
//! for every backend endpoint.

pub mod client;
pub mod error;
pub mod frame;
pub mod models;
pub mod stream;
pub mod types;

pub use client::ApiClient;
pub use error::{Error, Result};
pub use frame::{Frame, FrameParser};
pub use models::{ModelCatalog, ModelFilter, ModelInfo, ModelType};
pub use stream::{StreamEvent, StreamEventStream};
pub use types::*;
