//! /history, /regen, /edit, /delete and /files commands

use super::CommandResult;
use parley_api::Role;
use parley_chat::{AttachmentKind, AttachmentState, Attachments, History};

pub struct HistoryCommand;

impl HistoryCommand {
    /// List messages with the indexes the other history commands take
    pub fn execute(history: &History) -> String {
        if history.is_empty() {
            return "No messages yet.".to_string();
        }

        let mut output = String::from("Messages in conversation:\n");
        for (i, msg) in history.messages().iter().enumerate() {
            let role = match msg.role() {
                Role::User => "user",
                Role::Assistant if msg.is_interrupted() => "assistant, stopped",
                Role::Assistant => "assistant",
                Role::Error => "error",
            };
            let preview = crate::utils::preview(&msg.text(), 60);
            let files = msg.attachments().len();
            if files > 0 {
                output.push_str(&format!("  {}: [{}] {} (+{} files)\n", i, role, preview, files));
            } else {
                output.push_str(&format!("  {}: [{}] {}\n", i, role, preview));
            }
        }
        output.push_str("\nUse /regen, /edit or /delete with an index.");
        output
    }

    /// Parse a message index, checking it against the history
    pub fn index(
        args: &str,
        history: &History,
        command: fn(usize) -> CommandResult,
    ) -> CommandResult {
        let message_count = history.len();
        if message_count == 0 {
            return CommandResult::Message("No messages yet. Start a conversation first.".to_string());
        }
        match args.parse::<usize>() {
            Ok(index) if index < message_count => command(index),
            Ok(index) => CommandResult::Message(format!(
                "Invalid index {}. Valid range: 0-{}",
                index,
                message_count - 1
            )),
            Err(_) => CommandResult::Message(format!(
                "Invalid index '{}'. Use a number (0-{}); /history shows them.",
                args,
                message_count - 1
            )),
        }
    }
}

pub struct FilesCommand;

impl FilesCommand {
    pub fn execute(attachments: &Attachments) -> String {
        if attachments.is_empty() {
            return "No files attached.".to_string();
        }
        let mut output = String::from("Attached files:\n");
        for item in attachments.items() {
            let kind = match item.kind {
                AttachmentKind::Image => "image",
                AttachmentKind::Document => "document",
            };
            let state = match item.state {
                AttachmentState::Uploading => " (uploading)",
                AttachmentState::Ready(_) => "",
            };
            output.push_str(&format!("  {} [{}]{}\n", item.name, kind, state));
        }
        output
    }
}
