use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use alert_relay::{
    alert::Batch,
    config::Config,
    handler::Handler,
    notifier::{Notifier, SlackClient},
    processor::Processor,
    server::{shutdown_signal, Server},
    store::{create_store, LeaseStore},
};

const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Parser)]
#[command(author, version, about = "Relays pub/sub alert batches into a Slack channel", long_about = None)]
struct Cli {
    /// Log level (debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[arg(long, env = "LOG_MODE", value_enum, default_value_t = LogMode::Prod, global = true)]
    log_mode: LogMode,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogMode {
    /// Multi-line, colored output
    Dev,
    /// One line per event, no colors
    Prod,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP delivery endpoint (default)
    Serve,
    /// Process one batch file once, e.g. to check token scopes
    Debug {
        /// Topic the batch is attributed to
        #[arg(short, long)]
        topic: String,

        /// JSON file with an alert batch
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_mode)?;

    let config = Config::load().context("loading configuration")?;
    info!(
        channel = %config.slack.channel,
        database = ?config.database.db_type,
        ignore_rules = ?config.ignore_rules,
        "Loaded configuration"
    );

    let store = LeaseStore::new(create_store(&config.database).await?);

    let token = config.slack.resolve_token().await.context("resolving Slack token")?;
    let client = SlackClient::new(&token)?.with_base_url(&config.slack.api_url);
    let notifier = Notifier::new(
        Arc::new(client),
        &config.slack.channel,
        &config.slack.channel_id,
    );

    let processor = Processor::new(config.ignore_rules.clone(), store.clone(), notifier);
    let handler = Handler::new(Arc::new(processor));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config, handler, store).await,
        Commands::Debug { topic, file } => debug(handler, &topic, &file).await,
    }
}

fn init_logging(level: &str, mode: LogMode) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match mode {
        LogMode::Dev => builder.pretty().init(),
        LogMode::Prod => builder.compact().with_ansi(false).init(),
    }
    Ok(())
}

async fn serve(config: &Config, handler: Handler, store: LeaseStore) -> Result<()> {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let mut interval = tokio::time::interval(PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => info!(purged, "Purged expired leases"),
                        Err(e) => warn!("Failed to purge expired leases: {}", e),
                    },
                }
            }
        }
    });

    let server = Server::new(handler, config.server.invocation_timeout());
    server.start(&config.server.addr, shutdown).await?;
    Ok(())
}

async fn debug(handler: Handler, topic: &str, file: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let batch: Batch = serde_json::from_str(&raw)
        .with_context(|| format!("decoding {}", file.display()))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    handler.process_batch(topic, batch, &cancel).await?;
    info!("Processed {}", file.display());
    Ok(())
}
