//! Slash commands for interactive mode

mod conversation;
mod history;
mod model;
mod settings;

pub use conversation::{ConversationCommand, list_conversations_text};
pub use history::{FilesCommand, HistoryCommand};
pub use model::ModelCommand;
pub use settings::{ReasonCommand, SettingsCommand, SystemCommand, TemperatureCommand};

use parley_chat::ChatSession;
use std::path::PathBuf;

/// Result of executing a slash command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
    /// Switch to a model by name
    ChangeModel(String),
    SetTemperature(f32),
    SetReason(u8),
    SetSystem(String),
    ToggleSearch,
    ToggleInference,
    ToggleDan,
    /// Attach local files to the next message
    Attach(Vec<PathBuf>),
    /// Drop a pending attachment
    Detach(String),
    /// Resend the user turn behind the assistant reply at this index
    Regenerate(usize),
    /// Pull the user turn at this index back into the draft
    Edit(usize),
    /// Delete from this index on
    Delete(usize),
    /// Show stored conversations
    ListConversations,
    Open(String),
    /// Leave the current conversation
    New,
    Rename(String),
    /// Delete a stored conversation (current one if no id)
    Remove(Option<String>),
    RemoveAll,
    Login(String),
    /// Create an account
    Register { email: String, name: String },
    Logout,
    WhoAmI,
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, session: &ChatSession) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "model" | "m" => ModelCommand::execute(args, session.settings(), session.catalog()),

        "models" => CommandResult::Message(ModelCommand::list_models_text(
            session.settings(),
            session.catalog(),
        )),

        "settings" => CommandResult::Message(SettingsCommand::execute(session.settings())),

        "temp" | "temperature" => TemperatureCommand::execute(args, session.settings()),

        "reason" | "r" => ReasonCommand::execute(args, session.settings()),

        "system" => SystemCommand::execute(args, session.settings()),

        "search" => CommandResult::ToggleSearch,

        "think" => CommandResult::ToggleInference,

        "dan" => CommandResult::ToggleDan,

        "attach" | "a" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /attach <path>...".to_string())
            } else {
                CommandResult::Attach(args.split_whitespace().map(PathBuf::from).collect())
            }
        }

        "detach" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /detach <name>".to_string())
            } else {
                CommandResult::Detach(args.to_string())
            }
        }

        "files" => CommandResult::Message(FilesCommand::execute(session.attachments())),

        "history" => CommandResult::Message(HistoryCommand::execute(session.history())),

        "regen" => HistoryCommand::index(args, session.history(), CommandResult::Regenerate),

        "edit" | "e" => HistoryCommand::index(args, session.history(), CommandResult::Edit),

        "delete" | "d" => HistoryCommand::index(args, session.history(), CommandResult::Delete),

        "list" | "l" => CommandResult::ListConversations,

        "open" | "o" => ConversationCommand::open(args),

        "new" | "n" => CommandResult::New,

        "rename" => ConversationCommand::rename(args, session.conversation_id()),

        "remove" => ConversationCommand::remove(args, session.conversation_id()),

        "remove-all" => CommandResult::RemoveAll,

        "login" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /login <email>".to_string())
            } else {
                CommandResult::Login(args.to_string())
            }
        }

        "register" => match args.split_once(' ') {
            Some((email, name)) if !name.trim().is_empty() => CommandResult::Register {
                email: email.to_string(),
                name: name.trim().to_string(),
            },
            _ => CommandResult::Message("Usage: /register <email> <name>".to_string()),
        },

        "logout" => CommandResult::Logout,

        "whoami" => CommandResult::WhoAmI,

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /model, /m [name]      Show models or switch to a model
  /models                List every model
  /settings              Show the request settings
  /temp <t>              Set temperature (0 to 1)
  /reason, /r [level]    Show or set reasoning effort (0-3, low, medium, high)
  /system [text]         Show or set the system message (/system - clears it)
  /search                Toggle web search
  /think                 Toggle reasoning models
  /dan                   Toggle DAN mode
  /attach, /a <path>...  Attach files to the next message
  /detach <name>         Drop a pending attachment
  /files                 List pending attachments
  /history               List messages with their indexes
  /regen <i>             Regenerate the assistant reply at index i
  /edit, /e <i>          Put the user message at index i back into the draft
  /delete, /d <i>        Delete message i and everything after it
  /list, /l              List conversations
  /open, /o <id>         Open a conversation
  /new, /n               Start a new conversation with the next message
  /rename <alias>        Rename the current conversation
  /remove [id]           Delete a conversation (current one by default)
  /remove-all            Delete every conversation
  /login <email>         Log in (password is read from PARLEY_PASSWORD or stdin)
  /register <email> <name>  Create an account (password as for /login)
  /logout                Log out
  /whoami                Show the logged in user and their balance
  /quit, /exit, /q       Exit parley

While a reply streams, Ctrl-C stops it and keeps the partial text.
After /edit, an empty line sends the draft."#
        .to_string()
}
