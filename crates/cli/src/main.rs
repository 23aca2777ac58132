//! querysmith CLI: the main entry point.
//!
//! Commands:
//! - `init`           : Write a default config file
//! - `ask`            : Answer one question against a dataset
//! - `feedback`       : Mark a previous answer correct or wrong
//! - `daemon`         : Run retention cleanup and the embedding worker
//! - `macros`         : List the prompt macros
//! - `providers`      : List provider kinds and their settings
//! - `test-connection`: Check that configured connections are reachable

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "querysmith",
    about = "querysmith: ask questions of your data in natural language",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.querysmith/config.toml)
    #[arg(short, long, global = true, env = "QUERYSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Answer a question against a dataset
    Ask {
        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        session: Option<String>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,

        /// The question
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Record a reviewer verdict for an answer
    Feedback {
        /// The correlation id printed by `ask`
        chat_id: i64,

        /// Mark the answer wrong instead of correct
        #[arg(long)]
        wrong: bool,
    },

    /// Run background jobs until interrupted
    Daemon,

    /// List the prompt macros
    Macros,

    /// List provider kinds and their settings
    Providers,

    /// Check that configured connections are reachable
    TestConnection {
        /// Only test this connection
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config, force).await?,
        Commands::Ask {
            dataset,
            session,
            json,
            question,
        } => commands::ask::run(config, &dataset, session, &question.join(" "), json).await?,
        Commands::Feedback { chat_id, wrong } => commands::feedback::run(config, chat_id, !wrong).await?,
        Commands::Daemon => commands::daemon::run(config).await?,
        Commands::Macros => commands::macros::run().await?,
        Commands::Providers => commands::providers::run().await?,
        Commands::TestConnection { name } => commands::test_connection::run(config, name.as_deref()).await?,
    }

    Ok(())
}
