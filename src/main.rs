use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use paddock::commands;

#[derive(Parser)]
#[command(name = "paddock")]
#[command(version)]
#[command(about = "Formula 1 chat in your terminal, powered by Azure OpenAI", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat (default)
    Chat {
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Ask a single question and print the reply
    Ask {
        /// The message to send
        #[arg(required = true)]
        text: Vec<String>,
        #[arg(long)]
        no_stream: bool,
    },
    /// Print the saved conversation
    History,
    /// Export the conversation to chat-history-<date>.json
    Export {
        /// Directory to write into (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Delete the saved conversation
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the resolved configuration
    Config,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "paddock=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        None => commands::start_chat(false).await,
        Some(Commands::Chat { no_stream }) => commands::start_chat(no_stream).await,
        Some(Commands::Ask { text, no_stream }) => commands::ask(&text.join(" "), no_stream).await,
        Some(Commands::History) => commands::show_history().await,
        Some(Commands::Export { dir }) => commands::export_history(dir).await,
        Some(Commands::Clear { yes }) => commands::clear_history(yes).await,
        Some(Commands::Config) => commands::show_config().await,
    }
}
