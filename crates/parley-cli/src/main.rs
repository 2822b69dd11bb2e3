//! parley - streaming chat client for the terminal

mod commands;
mod config;
mod utils;

use clap::Parser;
use parley_api::{ApiClient, Message, ModelCatalog, Role};
use parley_chat::{ChatEvent, ChatHandle, ChatSession, History, SendOutcome};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// parley - chat with hosted models from the terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (default: http://localhost:8000)
    #[arg(long)]
    server: Option<String>,

    /// Model to use (default: gpt-4o)
    #[arg(short, long)]
    model: Option<String>,

    /// Sampling temperature (0 to 1)
    #[arg(short, long)]
    temperature: Option<f32>,

    /// System message
    #[arg(short, long)]
    system: Option<String>,

    /// Open an existing conversation by ID
    #[arg(long)]
    conversation: Option<String>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// List conversations and exit
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Account for automatic login (password from PARLEY_PASSWORD)
    #[arg(long)]
    email: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    let filter = if args.verbose {
        EnvFilter::new("parley=debug,parley_api=debug,parley_chat=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Load config file
    let cfg = config::Config::load();

    // Merge config with CLI args (CLI takes precedence)
    let server = args.server.clone().unwrap_or_else(|| cfg.server().to_string());
    let email = args.email.clone().or(cfg.email.clone());

    let catalog = match cfg.models_file {
        Some(ref file) => ModelCatalog::load(Path::new(file))?,
        None => ModelCatalog::builtin(),
    };

    let client = Arc::new(ApiClient::new(server)?);
    ensure_login(&client, email.as_deref()).await;

    // List conversations and exit
    if args.list {
        let conversations = client.list_conversations().await?;
        println!("{}", commands::list_conversations_text(&conversations, None));
        return Ok(());
    }

    let mut session = ChatSession::new(client.clone(), catalog);

    if let Some(model) = args.model.or(cfg.model) {
        let _ = session.update_settings(|s, c| s.set_model(c, &model));
    }
    if let Some(temperature) = args.temperature.or(cfg.temperature) {
        let _ = session.update_settings(|s, _| s.set_temperature(temperature));
    }
    if let Some(system) = args.system.or(cfg.system_message) {
        let _ = session.update_settings(|s, _| s.set_system_message(system));
    }

    let printer = spawn_printer(session.subscribe());

    // Open an existing conversation
    if let Some(ref id) = args.conversation {
        if let Err(e) = session.load(id).await {
            settle().await;
            eprintln!("Error opening conversation {}: {}", id, e);
            std::process::exit(1);
        }
        print_transcript(session.history());
    }

    watch_ctrl_c(session.handle());

    // Non-interactive mode
    if let Some(command) = args.command {
        let result = run_command(&mut session, &command).await;
        settle().await;
        printer.abort();
        return result;
    }

    let result = run_interactive(&mut session, &client).await;
    printer.abort();
    result
}

/// Log in with the configured account when the session has no cookie yet
async fn ensure_login(client: &ApiClient, email: Option<&str>) {
    match client.auth_status().await {
        Ok(status) if status.logged_in => {
            tracing::debug!("Logged in as {:?}", status.email);
            return;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Could not reach {}: {}", client.base_url(), e);
            return;
        }
    }

    let (Some(email), Ok(password)) = (email, std::env::var("PARLEY_PASSWORD")) else {
        eprintln!("Not logged in. Use /login <email>, or set email and PARLEY_PASSWORD.");
        return;
    };
    match client.login(email, &password).await {
        Ok(user) => tracing::info!("Logged in as {}", user.name),
        Err(e) => eprintln!("Login failed: {}", e),
    }
}

/// Stop the streaming reply on Ctrl-C; exit when nothing is streaming
fn watch_ctrl_c(handle: ChatHandle) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if handle.is_running() {
                handle.abort();
            } else {
                std::process::exit(130);
            }
        }
    });
}

/// Print session events as they arrive
fn spawn_printer(mut receiver: broadcast::Receiver<ChatEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut started = false;
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Printer skipped {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                ChatEvent::RequestStart { .. } => started = false,
                ChatEvent::ThinkingStart => {
                    println!("[thinking...]");
                }
                ChatEvent::MessageStart { .. } => started = true,
                ChatEvent::MessageDelta { delta, .. } => {
                    print!("{}", delta);
                    io::stdout().flush().ok();
                }
                ChatEvent::MessageEnd { message, .. } => {
                    println!();
                    if message.is_interrupted() {
                        println!("[stopped]");
                    }
                }
                ChatEvent::MessageAdded { message, .. } if message.role() == Role::Error => {
                    eprintln!("Error: {}", message.text());
                }
                ChatEvent::RequestEnd {
                    outcome: SendOutcome::Cancelled,
                    ..
                } if !started => {
                    println!("[cancelled]");
                }
                ChatEvent::Notice { message } => {
                    eprintln!("! {}", message);
                }
                _ => {}
            }
        }
    })
}

/// Give the printer a moment to catch up before prompting again
async fn settle() {
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
}

fn print_transcript(history: &History) {
    for message in history.messages() {
        print_message(message);
    }
    if !history.is_empty() {
        println!();
    }
}

fn print_message(message: &Message) {
    match message.role() {
        Role::User => {
            println!("> {}", message.text());
            for part in message.attachments() {
                if let Some(name) = part.name() {
                    println!("  [{}]", name);
                }
            }
        }
        Role::Assistant => {
            println!("{}", message.text());
            if message.is_interrupted() {
                println!("[stopped]");
            }
        }
        Role::Error => println!("Error: {}", message.text()),
    }
}

async fn run_command(session: &mut ChatSession, command: &str) -> anyhow::Result<()> {
    println!("parley> {}", command);
    println!();

    match send(session, command).await {
        Some(SendOutcome::Errored { message }) => anyhow::bail!(message),
        Some(_) => Ok(()),
        None => anyhow::bail!("message was not sent"),
    }
}

/// Send in the open conversation, or create one with this first message
async fn send(session: &mut ChatSession, text: &str) -> Option<SendOutcome> {
    let result = if session.conversation_id().is_some() {
        session.send(text).await
    } else {
        session.start_new(text).await
    };
    match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            if let parley_chat::Error::Api(api) = &e {
                hint_login(api);
            }
            tracing::debug!("Send rejected: {}", e);
            None
        }
    }
}

/// Report a failed backend call
fn report(context: &str, e: &parley_api::Error) {
    eprintln!("{}: {}", context, e);
    hint_login(e);
}

fn hint_login(e: &parley_api::Error) {
    if e.is_unauthorized() {
        eprintln!("Log in with /login <email>.");
    }
}

fn read_line() -> io::Result<Option<String>> {
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Password from PARLEY_PASSWORD, or prompted on stdin
fn read_password() -> io::Result<String> {
    if let Ok(password) = std::env::var("PARLEY_PASSWORD") {
        return Ok(password);
    }
    print!("Password: ");
    io::stdout().flush()?;
    Ok(read_line()?.unwrap_or_default())
}

async fn run_interactive(session: &mut ChatSession, client: &ApiClient) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        match session.conversation_id() {
            Some(id) => eprintln!("parley ({}) conversation: {}", session.settings().model, id),
            None => eprintln!("parley ({})", session.settings().model),
        }
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(input) = read_line()? else {
            // EOF
            break;
        };

        if input.is_empty() {
            if !session.draft().is_empty() {
                let draft = session.draft().to_string();
                send(session, &draft).await;
                settle().await;
                println!();
            }
            continue;
        }

        // Handle slash commands
        if let Some(result) = commands::execute_command(&input, session) {
            if !apply_command(result, session, client).await? {
                break;
            }
            settle().await;
            println!();
            continue;
        }

        println!();
        send(session, &input).await;
        settle().await;
        println!();
    }

    Ok(())
}

/// Carry out a parsed command. Returns false to exit.
async fn apply_command(
    result: commands::CommandResult,
    session: &mut ChatSession,
    client: &ApiClient,
) -> anyhow::Result<bool> {
    use commands::CommandResult;

    match result {
        CommandResult::Exit => return Ok(false),
        CommandResult::Message(msg) => println!("{}", msg),
        CommandResult::Unknown(cmd) => {
            println!("Unknown command: /{}", cmd);
            println!("Type /help for available commands.");
        }
        CommandResult::ChangeModel(name) => {
            if session.update_settings(|s, c| s.set_model(c, &name)).is_ok() {
                println!("Switched to: {}", session.settings().model);
            }
        }
        CommandResult::SetTemperature(t) => {
            if session.update_settings(|s, _| s.set_temperature(t)).is_ok() {
                println!("Temperature set to {:.1}", t);
            }
        }
        CommandResult::SetReason(level) => {
            if session.update_settings(|s, _| s.set_reason(level)).is_ok() {
                println!(
                    "Reasoning level set to: {}",
                    parley_chat::settings::reason_label(level)
                );
            }
        }
        CommandResult::SetSystem(text) => {
            let cleared = text.is_empty();
            if session.update_settings(|s, _| s.set_system_message(text)).is_ok() {
                println!("{}", if cleared { "System message cleared" } else { "System message set" });
            }
        }
        CommandResult::ToggleSearch => {
            if session.update_settings(|s, c| s.toggle_search(c)).is_ok() {
                let on = session.settings().is_search;
                println!("Search {} (model: {})", on_off(on), session.settings().model);
            }
        }
        CommandResult::ToggleInference => {
            if session.update_settings(|s, c| s.toggle_inference(c)).is_ok() {
                let on = session.settings().is_inference;
                println!("Thinking {} (model: {})", on_off(on), session.settings().model);
            }
        }
        CommandResult::ToggleDan => {
            if let Ok(on) = session.update_settings(|s, _| s.toggle_dan()) {
                println!("DAN mode {}", on_off(on));
            }
        }
        CommandResult::Attach(paths) => {
            let attached = session.attach(paths).await;
            println!("Attached {} file(s), {} pending", attached, session.attachments().len());
        }
        CommandResult::Detach(name) => {
            if session.detach(&name) {
                println!("Removed {}", name);
            } else {
                println!("No attachment named {}", name);
            }
        }
        CommandResult::Regenerate(index) => {
            println!();
            if let Err(e) = session.regenerate(index).await {
                tracing::debug!("Regenerate failed: {}", e);
            }
        }
        CommandResult::Edit(index) => {
            if let Ok(text) = session.edit(index).await {
                println!("Draft: {}", text);
                println!("Press Enter to send it, or type a replacement.");
            }
        }
        CommandResult::Delete(index) => {
            if session.delete_from(index).await.is_ok() {
                println!("Deleted messages from {} on", index);
            }
        }
        CommandResult::ListConversations => match client.list_conversations().await {
            Ok(conversations) => println!(
                "{}",
                commands::list_conversations_text(&conversations, session.conversation_id())
            ),
            Err(e) => report("Error listing conversations", &e),
        },
        CommandResult::Open(id) => {
            if session.load(&id).await.is_ok() {
                println!("Opened {} ({} messages)\n", id, session.history().len());
                print_transcript(session.history());
            }
        }
        CommandResult::New => {
            if session.reset().is_ok() {
                println!("Started fresh. Your next message creates the conversation.");
            }
        }
        CommandResult::Rename(alias) => {
            let Some(id) = session.conversation_id() else {
                return Ok(true);
            };
            match client.rename_conversation(id, &alias).await {
                Ok(()) => println!("Renamed to: {}", alias),
                Err(e) => report("Rename failed", &e),
            }
        }
        CommandResult::Remove(id) => {
            let current = session.conversation_id().map(str::to_string);
            let Some(target) = id.or(current.clone()) else {
                return Ok(true);
            };
            match client.delete_conversation(&target).await {
                Ok(()) => {
                    println!("Deleted conversation {}", target);
                    if current.as_deref() == Some(target.as_str()) {
                        let _ = session.reset();
                    }
                }
                Err(e) => report("Delete failed", &e),
            }
        }
        CommandResult::RemoveAll => match client.delete_all_conversations().await {
            Ok(()) => {
                println!("Deleted every conversation");
                let _ = session.reset();
            }
            Err(e) => report("Delete failed", &e),
        },
        CommandResult::Login(email) => {
            let password = read_password()?;
            match client.login(&email, &password).await {
                Ok(user) => println!("Logged in as {}", user.name),
                Err(e) => eprintln!("Login failed: {}", e),
            }
        }
        CommandResult::Register { email, name } => {
            let password = read_password()?;
            match client.register(&name, &email, &password).await {
                Ok(()) => println!("Registered {}. Log in with /login {}", name, email),
                Err(e) => eprintln!("Registration failed: {}", e),
            }
        }
        CommandResult::Logout => match client.logout().await {
            Ok(()) => println!("Logged out"),
            Err(e) => report("Logout failed", &e),
        },
        CommandResult::WhoAmI => match client.auth_status().await {
            Ok(status) if status.logged_in => match client.user_info().await {
                Ok(user) => println!("{} <{}>\nBalance: {:.4}", user.name, user.email, user.billing),
                Err(e) => report("Error", &e),
            },
            Ok(_) => println!("Not logged in"),
            Err(e) => report("Error", &e),
        },
    }

    Ok(true)
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
