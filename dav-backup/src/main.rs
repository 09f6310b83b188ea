//! dav-backup - command line entry point.
//!
//! Backs up a local data directory to a WebDAV remote and restores it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dav_backup::store::{JsonFileStore, JsonSettingsStore};
use dav_backup::transport::{select_transport, DavClient};
use dav_backup::security::Session;
use dav_backup::{utils, Config, SyncEngine, SyncResult};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Local data directory (overrides config)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Encryption password for the core document
    #[arg(long, global = true)]
    password: Option<String>,

    /// Master password that seals the stored AI API key (set on first use)
    #[arg(long, global = true)]
    master_password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the remote answers and accepts the credentials
    Test,
    /// Upload local data
    Upload {
        /// Write the single-document format instead of the manifest layout
        #[arg(long)]
        legacy: bool,
        /// Leave assets out
        #[arg(long)]
        no_images: bool,
    },
    /// Restore local data from the remote
    Download {
        /// Read only the single-document backup
        #[arg(long)]
        legacy: bool,
    },
    /// Upload or download, whichever side changed last
    Sync,
    /// Show the remote manifest
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.store.data_dir = dir;
    }
    if let Some(password) = args.password {
        config.sync.encryption_password = Some(password);
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting dav-backup v{} (data dir: {})",
        env!("CARGO_PKG_VERSION"),
        config.store.data_dir.display()
    );

    let webdav = config.webdav()?;
    let transport = select_transport(None, config.timeout())?;
    let client = DavClient::new(transport, config.sync.user_agent.clone());
    let mut settings = JsonSettingsStore::new(&config.store.data_dir);
    if let Some(password) = args.master_password.as_deref() {
        let session = open_session(&settings, password).await?;
        settings = settings.with_session(session);
    }
    let engine = SyncEngine::new(
        client,
        Arc::new(JsonFileStore::new(&config.store.data_dir)),
        Arc::new(settings),
    )
    .with_remote_names(config.sync.root_dir.clone(), config.sync.legacy_filename.clone());
    let mut options = config.sync_options();

    let result: SyncResult = match args.command {
        Command::Test => engine.test_connection(&webdav).await,
        Command::Upload { legacy, no_images } => {
            options.incremental &= !legacy;
            options.include_images &= !no_images;
            engine.upload(&webdav, &options).await?
        }
        Command::Download { legacy } => {
            options.incremental &= !legacy;
            engine.download(&webdav, &options).await?
        }
        Command::Sync => engine.auto_sync(&webdav, &options).await?,
        Command::Status => match engine.remote_status(&webdav).await? {
            Some(manifest) => {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
                return Ok(());
            }
            None => SyncResult::failure("No manifest on remote"),
        },
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Unlock against the stored master password, or configure it when none
/// exists yet.
async fn open_session(settings: &JsonSettingsStore, password: &str) -> Result<Session> {
    let mut session = Session::new();
    match settings.master_password_record().await? {
        Some(record) => {
            if !session.unlock(&record, password) {
                anyhow::bail!("master password does not match");
            }
            tracing::info!("Master password accepted");
        }
        None => {
            let record = session.set_master_password(password);
            settings.save_master_password_record(&record).await?;
            tracing::info!("Master password configured");
        }
    }
    Ok(session)
}
