mod config;
mod core;
mod tools;

use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;

use crate::core::api::CohereClient;
use crate::core::chat::{ChatEngine, ChatRequest};
use crate::core::store::Store;
use crate::core::ChatError;

#[derive(Parser, Debug)]
#[command(name = "taskchat", version, about = "Conversational to-do list assistant")]
struct Args {
    /// Act as this user (the transport layer's authenticated identity)
    #[arg(long, short)]
    user: String,

    /// Override the database path (default: ~/.taskchat/tasks.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Override the model to use
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Resume an existing conversation
    #[arg(long)]
    conversation: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("taskchat=info")),
        )
        .init();

    let args = Args::parse();
    let mut app_config = config::settings::load_config();
    if let Some(model) = args.model {
        app_config.model = model;
    }

    let Some(api_key) = config::settings::resolve_api_key(&app_config) else {
        bail!(
            "No Cohere API key configured. Set COHERE_API_KEY or add \"apiKey\" to {}",
            config::settings::config_file().display()
        );
    };

    let store = Arc::new(match args.db {
        Some(path) => Store::open_at(path)?,
        None => Store::open()?,
    });

    // One client for the process; turns borrow it through the engine.
    let client = CohereClient::new(&api_key, &app_config.model);
    let engine = ChatEngine::new(client, store);

    println!("taskchat: chatting as {}. Type /exit to quit.", args.user);

    let mut conversation_id = args.conversation;
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/exit" || message == "/quit" {
            break;
        }

        let request = ChatRequest {
            message: message.to_string(),
            conversation_id,
        };
        match engine.handle_turn(&args.user, &args.user, &request).await {
            Ok(response) => {
                conversation_id = Some(response.conversation_id);
                println!("assistant> {}", response.response);
            }
            Err(ChatError::ConversationNotFound) => {
                eprintln!("Conversation not found; starting a new one.");
                conversation_id = None;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
