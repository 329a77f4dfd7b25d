use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

use crate::config::Config;
use crate::controller::{ChatController, ChatUpdate, SendOutcome};
use crate::llm::AzureClient;
use crate::storage::{ConversationStore, FileSlot};
use crate::ui::conversation::{format_history, ConversationManager, StreamingResponse};

/// Wire config, client and persisted conversation into a controller.
fn build_controller(config: &Config) -> Result<ChatController<AzureClient>> {
    let client = Arc::new(AzureClient::new(config.azure.clone())?);
    let store = ConversationStore::open(Box::new(FileSlot::new(config.history_path())));
    Ok(ChatController::new(store, client, config.chat.clone()))
}

fn load_config(no_stream: bool) -> Result<Config> {
    let mut config = Config::load()?;
    if no_stream {
        config.chat.stream = false;
    }
    Ok(config)
}

pub async fn start_chat(no_stream: bool) -> Result<()> {
    let config = load_config(no_stream)?;
    let controller = build_controller(&config)?;
    let export_dir = std::env::current_dir().context("Failed to resolve current directory")?;

    let mut manager = ConversationManager::new(controller, io::stdout(), export_dir)
        .with_reloader(|| Ok(Config::load()?.azure));
    manager.run(BufReader::new(tokio::io::stdin())).await?;

    println!();
    Ok(())
}

/// Send one message, print the reply and exit.
pub async fn ask(text: &str, no_stream: bool) -> Result<()> {
    let config = load_config(no_stream)?;
    let mut controller = build_controller(&config)?;

    match controller.submit(text) {
        SendOutcome::Started => {}
        SendOutcome::Empty => bail!("Nothing to ask: the message is empty"),
        _ => bail!(controller
            .error_message()
            .unwrap_or("Unable to send the message")
            .to_string()),
    }

    let mut streaming = StreamingResponse::new();
    let mut stdout = io::stdout();
    let mut failure = None;
    while let Some(update) = controller.next_update().await {
        match update {
            ChatUpdate::Partial(text) => {
                write!(stdout, "{}", streaming.push(&text))?;
                stdout.flush()?;
            }
            ChatUpdate::Replied(message) => {
                if streaming.is_streaming() {
                    writeln!(stdout, "{}", streaming.finish(&message.content))?;
                } else {
                    writeln!(stdout, "{}", message.content)?;
                }
            }
            ChatUpdate::Failed(message) => failure = Some(message),
            ChatUpdate::Discarded => {}
        }
    }

    if let Some(warning) = controller.take_storage_warning() {
        eprintln!("⚠️ {}", warning);
    }
    if let Some(message) = failure {
        bail!(message);
    }
    Ok(())
}

pub async fn show_history() -> Result<()> {
    let config = Config::load()?;
    let store = ConversationStore::open(Box::new(FileSlot::new(config.history_path())));

    println!("{}", format_history(store.messages()));
    Ok(())
}

pub async fn export_history(dir: Option<PathBuf>) -> Result<()> {
    let config = Config::load()?;
    let controller = build_controller(&config)?;

    if controller.messages().is_empty() {
        println!("📭 Nothing to export yet.");
        return Ok(());
    }

    let dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let path = controller.export_to(&dir)?;
    println!("💾 Exported {} messages to {}", controller.messages().len(), path.display());
    Ok(())
}

pub async fn clear_history(yes: bool) -> Result<()> {
    let config = Config::load()?;
    let mut controller = build_controller(&config)?;

    if controller.messages().is_empty() {
        println!("📭 Chat history is already empty.");
        return Ok(());
    }

    let cleared = controller.clear(|| yes || confirm("Are you sure you want to clear all chat history?"));
    if cleared {
        println!("🧹 Chat history cleared.");
    } else {
        println!("Kept chat history.");
    }
    if let Some(warning) = controller.take_storage_warning() {
        eprintln!("⚠️ {}", warning);
    }
    Ok(())
}

pub async fn show_config() -> Result<()> {
    let config = Config::load()?;
    let azure = &config.azure;

    println!("⚙️  Paddock configuration");
    println!("{}", "=".repeat(50));
    println!("📄 Config file: {}", config.config_path().display());
    println!("💬 History:     {}", config.history_path().display());
    println!();
    println!("🔑 API key:     {}", azure.redacted_api_key());
    println!("🌐 Endpoint:    {}", azure.endpoint.as_deref().unwrap_or("NOT SET"));
    println!("🧠 Deployment:  {}", azure.deployment.as_deref().unwrap_or("NOT SET"));
    println!("📅 API version: {}", azure.api_version());
    println!();
    println!("🎚️  Max tokens: {}, temperature: {}, streaming: {}",
        config.chat.max_tokens, config.chat.temperature, config.chat.stream);
    println!();

    match azure.validate() {
        Ok(_) => println!("✅ Ready to chat."),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    match io::stdin().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}
