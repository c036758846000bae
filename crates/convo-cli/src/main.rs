use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use convo_core::config::StorageBackend;
use convo_core::{JsonFileStore, MemoryStore, Settings};
use convo_cli::app::{self, Library};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "convo")]
#[command(about = "convo - chat with a chat-completions model from the terminal")]
#[command(version)]
struct Cli {
    /// Run a single prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Model id to use
    #[arg(short, long)]
    model: Option<String>,

    /// Resume a saved conversation
    #[arg(short, long)]
    conversation: Option<Uuid>,

    /// Wait for complete replies instead of streaming them
    #[arg(long)]
    no_stream: bool,

    /// Keep conversations in memory only
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(ref model) = cli.model {
        settings.api.model = model.as_str().into();
    }
    if cli.memory {
        settings.storage.backend = StorageBackend::Memory;
    }

    let library = match settings.storage.backend {
        StorageBackend::Memory => Library::Memory(Arc::new(MemoryStore::new())),
        StorageBackend::File => {
            let store: JsonFileStore = settings
                .build_file_store()
                .context("Failed to open the conversation store")?;
            Library::File(Arc::new(store))
        }
    };

    let mut engine = settings.build_engine(library.storage())?;
    if let Some(id) = cli.conversation {
        engine
            .load_conversation(id, false)
            .await
            .with_context(|| format!("Failed to load conversation {id}"))?;
    }

    let stream = !cli.no_stream;
    if let Some(prompt) = cli.prompt {
        app::run_single_prompt(&mut engine, &prompt, stream).await?;
    } else {
        app::run_repl(engine, library, stream).await?;
    }

    Ok(())
}
