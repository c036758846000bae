use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use convo_core::storage::ConversationMetadata;
use convo_core::{
    ChatEngine, ChatStorage, ConvoError, JsonFileStore, MemoryStore, Role, SendOptions,
};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{handle_command, CommandResult};

const LIST_LIMIT: usize = 20;
const PREVIEW_CHARS: usize = 72;
const TRANSPORT_HINT: &str =
    "Could not reach the API. Check the network and `api.base_url` in the config.";

/// The store the engine persists to, kept concrete so the CLI can list it.
#[derive(Clone)]
pub enum Library {
    File(Arc<JsonFileStore>),
    Memory(Arc<MemoryStore>),
}

impl Library {
    pub fn storage(&self) -> Arc<dyn ChatStorage> {
        match self {
            Library::File(store) => store.clone(),
            Library::Memory(store) => store.clone(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Library::File(store) => store.base_dir().display().to_string(),
            Library::Memory(_) => "in-memory".to_string(),
        }
    }

    /// Most recent first.
    pub async fn list(&self, limit: usize) -> Result<Vec<ConversationMetadata>> {
        match self {
            Library::File(store) => Ok(store.list_recent(limit).await?),
            Library::Memory(store) => Ok(store
                .recent(limit)
                .await
                .iter()
                .rev()
                .map(ConversationMetadata::from)
                .collect()),
        }
    }
}

// ── Single prompt ───────────────────────────────────────────────────────

pub async fn run_single_prompt(
    engine: &mut ChatEngine,
    prompt: &str,
    stream: bool,
) -> Result<()> {
    respond(engine, prompt, SendOptions::default(), stream).await
}

/// Send one turn and print the reply, fragment by fragment when streaming.
async fn respond(
    engine: &mut ChatEngine,
    text: &str,
    options: SendOptions,
    stream: bool,
) -> Result<()> {
    if !stream {
        let reply = engine.send_message(text, options).await?;
        println!("{reply}");
        return Ok(());
    }

    let mut fragments = engine.send_message_stream(text, options).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(text) => {
                print!("{text}");
                stdout.flush()?;
            }
            Err(e) => {
                println!();
                return Err(e.into());
            }
        }
    }
    println!();
    Ok(())
}

// ── Interactive REPL ────────────────────────────────────────────────────

pub async fn run_repl(mut engine: ChatEngine, library: Library, stream: bool) -> Result<()> {
    println!(
        "convo v{} | {} | type /help for commands",
        env!("CARGO_PKG_VERSION"),
        engine.model().display_name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match handle_command(input) {
            CommandResult::Quit => break,
            CommandResult::NotACommand => {
                let options = SendOptions::default();
                if let Err(e) = respond(&mut engine, input, options, stream).await {
                    report(&e);
                }
            }
            command => {
                if let Err(e) = apply_command(&mut engine, &library, command, stream).await {
                    report(&e);
                }
            }
        }
    }

    // Leave nothing behind unsaved.
    match engine.save_conversation().await {
        Ok(Some(id)) => eprintln!("Conversation saved: {id}"),
        Ok(None) => {}
        Err(e) => tracing::warn!("Could not save conversation on exit: {}", e),
    }
    Ok(())
}

async fn apply_command(
    engine: &mut ChatEngine,
    library: &Library,
    command: CommandResult,
    stream: bool,
) -> Result<()> {
    match command {
        CommandResult::Message(msg) => println!("{msg}"),
        CommandResult::Clear => {
            engine.delete_history();
            println!("History cleared.");
        }
        CommandResult::NewConversation => {
            engine.start_new_conversation(true).await;
            println!("Started a new conversation.");
        }
        CommandResult::ModelChanged(model) => {
            engine.set_model(model);
            println!("Model: {}", engine.model());
        }
        CommandResult::TemperatureChanged(value) => {
            engine.set_temperature(value);
            println!("Temperature: {}", engine.temperature());
        }
        CommandResult::SystemPromptChanged(prompt) => {
            engine.set_system_prompt(&prompt).await?;
            println!("System prompt updated.");
        }
        CommandResult::SaveConversation => match engine.save_conversation().await? {
            Some(id) => println!("Conversation saved: {id}"),
            None => println!("Nothing to save yet."),
        },
        CommandResult::LoadConversation(id) => {
            engine.load_conversation(id, true).await?;
            println!(
                "Loaded conversation: {} ({} messages)",
                engine.current_conversation().title(),
                engine.history().len()
            );
        }
        CommandResult::ListConversations => {
            let conversations = library.list(LIST_LIMIT).await?;
            if conversations.is_empty() {
                println!("No saved conversations.");
            } else {
                println!("Recent conversations:");
                for c in &conversations {
                    println!(
                        "  {} | {} | {} msgs | {}",
                        c.id,
                        c.title,
                        c.message_count,
                        c.last_interaction.format("%Y-%m-%d %H:%M")
                    );
                }
                println!("\nUse /load <id> to resume a conversation.");
            }
        }
        CommandResult::ShowHistory => print_history(engine),
        CommandResult::Rewind(index) => {
            engine.remove_messages_from(index).await?;
            println!("Kept {} messages.", engine.history().len());
        }
        CommandResult::Edit { index, text } => {
            respond(engine, &text, SendOptions::new().overwrite_from(index), stream).await?;
        }
        CommandResult::ShowStatus => {
            let id = engine
                .conversation_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "(unsaved)".to_string());
            println!("Model:        {} ({})", engine.model().display_name(), engine.model());
            println!("Temperature:  {}", engine.temperature());
            println!("Conversation: {id}");
            println!("Messages:     {}", engine.history().len());
            println!("Storage:      {}", library.describe());
        }
        CommandResult::Quit | CommandResult::NotACommand => {}
    }
    Ok(())
}

fn report(e: &anyhow::Error) {
    eprintln!("Error: {e}");
    if let Some(hint) = hint_for(e) {
        eprintln!("{hint}");
    }
}

fn hint_for(e: &anyhow::Error) -> Option<&'static str> {
    e.downcast_ref::<ConvoError>()
        .filter(|e| e.is_transport())
        .map(|_| TRANSPORT_HINT)
}

fn print_history(engine: &ChatEngine) {
    println!("[system] {}", preview(engine.system_message().content()));
    if engine.history().is_empty() {
        println!("(no messages)");
        return;
    }
    for (index, message) in engine.history().iter().enumerate() {
        let role = match message.role() {
            Role::User => "you",
            Role::Assistant => "assistant",
            other => other.as_str(),
        };
        let marker = if message.is_example() { " (example)" } else { "" };
        println!("{index:>3} {role}{marker}: {}", preview(message.content()));
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > PREVIEW_CHARS || line.len() < text.len() {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_shortens_long_and_multiline_text() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("first\nsecond"), "first...");
        let long = "x".repeat(100);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(PREVIEW_CHARS)));
    }

    #[test]
    fn test_hint_only_for_transport_failures() {
        let unreachable = anyhow::Error::from(ConvoError::Transport("connection refused".into()));
        assert!(hint_for(&unreachable).is_some());

        let rejected = anyhow::Error::from(ConvoError::bad_response(401, "Invalid API key"));
        assert!(hint_for(&rejected).is_none());
        assert!(hint_for(&anyhow::anyhow!("other")).is_none());
    }

    #[tokio::test]
    async fn test_memory_library_lists_newest_first() {
        use chrono::{Duration, Utc};
        use convo_core::{Conversation, Message};

        let store = Arc::new(MemoryStore::new());
        let older = Conversation::new(
            vec![Message::user("older")],
            None,
            Some(Utc::now() - Duration::hours(1)),
        );
        let newer = Conversation::new(vec![Message::user("newer")], None, None);
        store.save(older.clone()).await.unwrap();
        store.save(newer.clone()).await.unwrap();

        let listed = Library::Memory(store).list(10).await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["newer", "older"]);
    }
}
