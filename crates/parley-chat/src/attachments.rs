//! Pending attachments for the next send
//!
//! Each file is admitted by name, then resolved independently: images upload
//! to the server, documents are inlined as base64 data URLs. A failed file is
//! removed without touching the others.

use crate::error::{Error, Result};
use base64::Engine;
use parley_api::Part;
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

/// Most files that can wait for one send
pub const MAX_ATTACHMENTS: usize = 5;

static DOCUMENT_EXTENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(pdf|doc|docx|pptx|xlsx|csv|txt|rtf|html|htm|odt|eml|epub|msg|json|wav|mp3|ogg)$")
        .expect("valid regex")
});

static IMAGE_EXTENSIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|bmp|webp)$").expect("valid regex"));

/// How a file travels to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Uploaded through `/upload`, referenced by server path
    Image,
    /// Sent inline as a data URL
    Document,
}

/// Classify a file by name; `None` means the type is not accepted
pub fn classify(name: &str) -> Option<AttachmentKind> {
    if IMAGE_EXTENSIONS.is_match(name) {
        Some(AttachmentKind::Image)
    } else if DOCUMENT_EXTENSIONS.is_match(name) {
        Some(AttachmentKind::Document)
    } else {
        None
    }
}

/// MIME type guessed from the file extension
pub fn mime_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "html" | "htm" => "text/html",
        "odt" => "application/vnd.oasis.opendocument.text",
        "eml" => "message/rfc822",
        "epub" => "application/epub+zip",
        "msg" => "application/vnd.ms-outlook",
        "json" => "application/json",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Encode file contents as a data URL
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentState {
    Uploading,
    Ready(Part),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: Uuid,
    pub name: String,
    pub kind: AttachmentKind,
    pub state: AttachmentState,
}

impl Attachment {
    pub fn is_uploading(&self) -> bool {
        matches!(self.state, AttachmentState::Uploading)
    }
}

/// Outcome of offering files for attachment
#[derive(Debug, Default)]
pub struct Admission {
    /// Admitted files, now uploading
    pub accepted: Vec<(Uuid, String, AttachmentKind)>,
    /// Files of an unsupported type
    pub rejected: Vec<String>,
    /// Files cut because the limit was reached
    pub over_limit: Vec<String>,
}

impl Admission {
    /// Notices to show for the files that were turned away
    pub fn notices(&self) -> Vec<String> {
        let mut notices = Vec::new();
        if !self.rejected.is_empty() {
            notices.push(Error::UnsupportedFile(self.rejected.join(", ")).to_string());
        }
        if !self.over_limit.is_empty() {
            notices.push(
                Error::TooManyFiles {
                    max: MAX_ATTACHMENTS,
                }
                .to_string(),
            );
        }
        notices
    }
}

/// Files waiting for the next send
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    items: Vec<Attachment>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[Attachment] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether any file is still being uploaded or encoded
    pub fn is_uploading(&self) -> bool {
        self.items.iter().any(|a| a.is_uploading())
    }

    /// Whether an image is among the pending files
    pub fn has_image(&self) -> bool {
        self.items.iter().any(|a| a.kind == AttachmentKind::Image)
    }

    /// Admit files by name, up to the limit. Accepted files start uploading.
    pub fn admit<I, S>(&mut self, names: I) -> Admission
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut admission = Admission::default();
        for name in names {
            let name = name.into();
            let Some(kind) = classify(&name) else {
                admission.rejected.push(name);
                continue;
            };
            if self.items.len() >= MAX_ATTACHMENTS {
                admission.over_limit.push(name);
                continue;
            }
            let id = Uuid::new_v4();
            self.items.push(Attachment {
                id,
                name: name.clone(),
                kind,
                state: AttachmentState::Uploading,
            });
            admission.accepted.push((id, name, kind));
        }
        admission
    }

    /// Settle one upload. A failure drops just that file.
    pub fn resolve(&mut self, id: Uuid, result: Result<Part>) -> Result<()> {
        let Some(pos) = self.items.iter().position(|a| a.id == id) else {
            tracing::debug!("Upload {} settled after its attachment was removed", id);
            return Ok(());
        };
        match result {
            Ok(part) => {
                self.items[pos].state = AttachmentState::Ready(part);
                Ok(())
            }
            Err(e) => {
                let removed = self.items.remove(pos);
                tracing::warn!("Attachment {} failed: {}", removed.name, e);
                Err(e)
            }
        }
    }

    /// Remove a file by name
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|a| a.name != name);
        self.items.len() != before
    }

    /// Parts of all settled files
    pub fn parts(&self) -> Vec<Part> {
        self.items
            .iter()
            .filter_map(|a| match &a.state {
                AttachmentState::Ready(part) => Some(part.clone()),
                AttachmentState::Uploading => None,
            })
            .collect()
    }

    /// Put previously sent parts back, as when editing a message
    pub fn restore(&mut self, parts: Vec<Part>) {
        self.items = parts
            .into_iter()
            .filter_map(|part| {
                let name = part.name()?.to_string();
                let kind = match part {
                    Part::Image { .. } => AttachmentKind::Image,
                    _ => AttachmentKind::Document,
                };
                Some(Attachment {
                    id: Uuid::new_v4(),
                    name,
                    kind,
                    state: AttachmentState::Ready(part),
                })
            })
            .collect();
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
