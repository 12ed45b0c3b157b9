use anyhow::Context;
use clap::Parser;
use sigmirror::config::{resolve_local_directory, secrets_path_from_env};
use sigmirror::{
    sync_mirror, AppSecrets, HttpObjectStore, HttpStoreConfig, LocalObjectStore, ObjectStore,
    SyncConfig, SyncMode, SyncReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sigmirror")]
#[command(about = "Mirror signature databases from an S3-compatible bucket", long_about = None)]
#[command(version)]
struct Args {
    /// Secrets file (defaults to $CLAM_SECRETS_FILE, then /secrets/clam_update_config.json)
    #[arg(long)]
    secrets_file: Option<PathBuf>,

    /// Local signature directory (overrides the secrets file and $CLAM_DB_DIRECTORY)
    #[arg(short, long)]
    directory: Option<String>,

    /// Selection mode (overrides the secrets file)
    #[arg(short, long, value_enum)]
    mode: Option<SyncMode>,

    /// S3-compatible endpoint URL (overrides the secrets file)
    #[arg(long)]
    endpoint: Option<String>,

    /// Mirror from a local directory instead of a bucket
    #[arg(long, conflicts_with = "endpoint")]
    source_dir: Option<PathBuf>,

    /// Maximum number of objects downloaded at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

async fn run(args: Args) -> anyhow::Result<SyncReport> {
    let secrets_path = args.secrets_file.unwrap_or_else(secrets_path_from_env);
    let mut secrets = AppSecrets::load_or_default(&secrets_path);
    if let Some(endpoint) = args.endpoint {
        secrets.endpoint = Some(endpoint);
    }

    let mut config = SyncConfig::from_secrets(&secrets);
    if let Some(directory) = args.directory.as_deref() {
        config.local_directory = resolve_local_directory(Some(directory), None);
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(limit) = args.max_concurrent {
        config.max_concurrent_fetches = limit.max(1);
    }
    if config.mode == SyncMode::AllowList && config.managed_keys.is_empty() {
        warn!("Allow-list mode with no managed files configured; nothing will be selected");
    }

    info!("Mirror bucket: {}", config.mirror_bucket);
    info!("Local directory: {}", config.local_directory.display());

    let store: Arc<dyn ObjectStore> = match args.source_dir {
        Some(dir) => Arc::new(LocalObjectStore::new(dir)),
        None => Arc::new(
            HttpObjectStore::new(HttpStoreConfig::from_secrets(&secrets))
                .context("Error establishing object store session")?,
        ),
    };

    sync_mirror(store, Arc::new(config))
        .await
        .context("Error synchronizing signatures")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("sigmirror={}", log_level))
        .init();

    println!("Signature mirror updater v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(report) => {
            info!(
                "Finished: {} listed, {} selected, {} verified, {} unverified, {} failed",
                report.listed,
                report.candidates,
                report.verified(),
                report.unverified(),
                report.failed()
            );
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
