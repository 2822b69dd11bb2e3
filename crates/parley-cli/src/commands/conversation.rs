//! /open, /rename and /remove commands, and the conversation listing

use super::CommandResult;
use parley_api::ConversationSummary;

pub struct ConversationCommand;

impl ConversationCommand {
    pub fn open(args: &str) -> CommandResult {
        if args.is_empty() {
            CommandResult::Message("Usage: /open <id>\nUse /list to find one.".to_string())
        } else {
            CommandResult::Open(args.to_string())
        }
    }

    pub fn rename(args: &str, current: Option<&str>) -> CommandResult {
        if current.is_none() {
            return CommandResult::Message("No conversation is open.".to_string());
        }
        if args.is_empty() {
            return CommandResult::Message("Usage: /rename <alias>".to_string());
        }
        CommandResult::Rename(args.to_string())
    }

    pub fn remove(args: &str, current: Option<&str>) -> CommandResult {
        match (args, current) {
            ("", None) => CommandResult::Message("Usage: /remove <id>".to_string()),
            ("", Some(_)) => CommandResult::Remove(None),
            (id, _) => CommandResult::Remove(Some(id.to_string())),
        }
    }
}

/// Format the conversation list
pub fn list_conversations_text(conversations: &[ConversationSummary], current: Option<&str>) -> String {
    if conversations.is_empty() {
        return "No conversations found.".to_string();
    }

    let mut output = String::from("Conversations:\n\n");
    output.push_str(&format!("{:<38} Alias\n", "ID"));
    output.push_str(&"-".repeat(70));
    output.push('\n');
    for c in conversations {
        let marker = if Some(c.conversation_id.as_str()) == current {
            " *"
        } else {
            ""
        };
        output.push_str(&format!(
            "{:<38} {}{}\n",
            c.conversation_id,
            crate::utils::truncate_chars(&c.alias, 30),
            marker
        ));
    }
    output.push_str("\nOpen with: /open <id> (or parley --conversation <id>)");
    output
}
