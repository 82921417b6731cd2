use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::fs;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod settings;
pub mod threads;

use crate::chat::ContentStore;
use crate::core::db::async_db;
use crate::core::{AppConfig, SharedStorage, SqliteStorage};
use crate::settings::SettingsStore;
use settings::Toggle;

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session
    Chat {
        /// Thread to open, defaults to the most recent one
        #[arg(long)]
        thread: Option<String>,
    },
    /// Set the API token or show the stored one
    Token {
        value: Option<String>,
    },
    /// Turn developer mode on or off
    DevMode {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// List all threads
    Threads {},
    /// Print the transcript of a thread
    Export {
        #[arg(long)]
        thread: String,
    },
    /// Replace all threads with a single empty one
    Reset {},
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Both stores, loaded from the same storage.
pub struct Stores {
    pub content: ContentStore,
    pub settings: SettingsStore,
}

impl Stores {
    pub async fn open(config: &AppConfig) -> Result<Self> {
        fs::create_dir_all(&config.storage_path)?;
        let db = async_db(&config.db_path).await?;
        let storage: SharedStorage = Arc::new(SqliteStorage::new(db).await?);
        Self::load(&storage).await
    }

    pub async fn load(storage: &SharedStorage) -> Result<Self> {
        Ok(Self {
            content: ContentStore::load(storage).await?,
            settings: SettingsStore::load(storage).await?,
        })
    }

    /// Waits for pending writes so nothing is lost on exit.
    pub async fn flush(&self) {
        self.content.flush().await;
        self.settings.flush().await;
    }
}

fn init_tracing() {
    // Logs go to stderr so they don't mix with chat output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=warn", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let config = AppConfig::default();
    let stores = Stores::open(&config).await?;

    // Handle each sub command
    let result = match args.command {
        Some(Command::Chat { thread }) => chat::run(&config, &stores, thread).await,
        Some(Command::Token { value }) => {
            settings::token(&stores.settings, value.as_deref());
            Ok(())
        }
        Some(Command::DevMode { state }) => {
            settings::dev_mode(&stores.settings, state);
            Ok(())
        }
        Some(Command::Threads {}) => {
            threads::list(&stores.content);
            Ok(())
        }
        Some(Command::Export { thread }) => threads::export(&stores.content, &thread),
        Some(Command::Reset {}) => {
            stores.content.reset_state();
            println!("Threads reset");
            Ok(())
        }
        None => Err(anyhow!("Missing command, run with --help for usage")),
    };

    stores.flush().await;
    result
}
