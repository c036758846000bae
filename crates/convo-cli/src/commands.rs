use uuid::Uuid;

/// Result of processing a slash command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Delete the chat history, keeping the system prompt.
    Clear,
    /// Quit the application.
    Quit,
    /// Change the model.
    ModelChanged(String),
    /// Change the sampling temperature.
    TemperatureChanged(f64),
    /// Replace the system prompt.
    SystemPromptChanged(String),
    /// Not a command - treat as regular input.
    NotACommand,
    /// Save current conversation.
    SaveConversation,
    /// Load conversation by ID.
    LoadConversation(Uuid),
    /// List saved conversations.
    ListConversations,
    /// Start a fresh conversation.
    NewConversation,
    /// Drop history from this index on.
    Rewind(usize),
    /// Resend from this index with new text.
    Edit { index: usize, text: String },
    /// Print the numbered history.
    ShowHistory,
    /// Show status (model, temperature, conversation id).
    ShowStatus,
}

pub fn handle_command(input: &str) -> CommandResult {
    let input = input.trim();
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/help" | "/h" => show_help(),
        "/exit" | "/quit" | "/q" => CommandResult::Quit,
        "/clear" => CommandResult::Clear,
        "/new" => CommandResult::NewConversation,

        // Session settings
        "/model" => {
            if arg.is_empty() {
                CommandResult::Message(
                    "Usage: /model <model-id>  (current model is shown in /status)".into(),
                )
            } else {
                CommandResult::ModelChanged(arg.to_string())
            }
        }
        "/temp" | "/temperature" => match arg.parse::<f64>() {
            Ok(value) if value.is_finite() => CommandResult::TemperatureChanged(value),
            _ => CommandResult::Message("Usage: /temp <value between 0.0 and 2.0>".into()),
        },
        "/system" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /system <prompt text>".into())
            } else {
                CommandResult::SystemPromptChanged(arg.to_string())
            }
        }
        "/status" => CommandResult::ShowStatus,

        // Conversation commands
        "/save" => CommandResult::SaveConversation,
        "/load" => match Uuid::parse_str(arg) {
            Ok(id) => CommandResult::LoadConversation(id),
            Err(_) if arg.is_empty() => {
                CommandResult::Message("Usage: /load <conversation-id>".into())
            }
            Err(_) => CommandResult::Message(format!("Not a conversation id: {arg}")),
        },
        "/list" | "/conversations" => CommandResult::ListConversations,
        "/history" => CommandResult::ShowHistory,
        "/rewind" => match arg.parse::<usize>() {
            Ok(index) => CommandResult::Rewind(index),
            Err(_) => {
                CommandResult::Message("Usage: /rewind <index>  (see /history for indices)".into())
            }
        },
        "/edit" => {
            let mut edit = arg.splitn(2, ' ');
            let index = edit.next().and_then(|i| i.parse::<usize>().ok());
            let text = edit.next().map(str::trim).unwrap_or("");
            match index {
                Some(index) if !text.is_empty() => CommandResult::Edit {
                    index,
                    text: text.to_string(),
                },
                _ => CommandResult::Message("Usage: /edit <index> <new message>".into()),
            }
        }
        "/version" => CommandResult::Message(format!("convo v{}", env!("CARGO_PKG_VERSION"))),

        // Unknown command
        _ => {
            if input.starts_with('/') {
                CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands."))
            } else {
                CommandResult::NotACommand
            }
        }
    }
}

fn show_help() -> CommandResult {
    let help_text = "\
convo commands

  CONVERSATION
    /clear                    Delete the chat history (system prompt stays)
    /new                      Start a fresh conversation
    /save                     Save current conversation
    /load <id>                Load a saved conversation
    /list, /conversations     List saved conversations
    /history                  Show the numbered message history
    /rewind <index>           Remove messages from <index> onward
    /edit <index> <text>      Replace the message at <index> and resend

  SESSION
    /system <text>            Replace the system prompt
    /model <id>               Change model
    /temp <value>             Set temperature (0.0 - 2.0)
    /status                   Show model, temperature and conversation id

  OTHER
    /help, /h                 Show this help message
    /version                  Show version information
    /exit, /quit, /q          Quit";

    CommandResult::Message(help_text.into())
}
