//! m1nd CLI: the main entry point.
//!
//! Commands:
//! - `run`: start the bot (Telegram, or the terminal with `--cli`)
//! - `ask`: answer a single question and exit
//! - `providers`: show configured providers and fallback order
//! - `config`: validate, show or initialize configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "m1nd",
    about = "m1nd: conversational bot with multi-provider fallback",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.m1nd/config.toml)
    #[arg(short, long, global = true, env = "M1ND_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run {
        /// Chat in the terminal instead of Telegram
        #[arg(long)]
        cli: bool,

        /// Terminal user name with `--cli`; seeded as an admin
        #[arg(short, long, default_value = "local_user")]
        user: String,
    },

    /// Answer one question and exit
    Ask {
        /// The question to ask
        question: String,

        /// Conversation owner
        #[arg(short, long, default_value = "local_user")]
        user: String,
    },

    /// Show configured providers and the fallback order
    Providers,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check the configuration for errors
    Validate,

    /// Print the effective configuration (secrets redacted)
    Show,

    /// Write an example config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "warn,m1nd=debug" } else { "warn,m1nd=info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.unwrap_or_else(m1nd_config::AppConfig::default_path);

    match cli.command {
        Commands::Run { cli: terminal, user } => {
            let terminal_user = terminal.then_some(user);
            commands::run::run(&config_path, terminal_user.as_deref()).await?
        }
        Commands::Ask { question, user } => commands::ask::run(&config_path, &user, &question).await?,
        Commands::Providers => commands::providers::run(&config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(&config_path).await?,
            ConfigAction::Show => commands::config_cmd::show(&config_path).await?,
            ConfigAction::Init { force } => commands::config_cmd::init(&config_path, force).await?,
        },
    }

    Ok(())
}
