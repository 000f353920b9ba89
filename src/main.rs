use clap::{Parser, Subcommand};
use qcsync::{ClientConfig, Delivery, HttpTransport, OfflineClientBuilder, SharedToken, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "qcsync")]
#[command(about = "Inspect and flush the QC offline sync queue", long_about = None)]
struct Args {
    /// Directory holding qcsync.toml and .env
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Treat the API as unreachable instead of probing it
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show connectivity, pending mutations and last sync time
    Status,
    /// Replay pending mutations now
    Sync,
    /// List pending mutations in replay order
    Queue,
    /// Fetch a resource and cache it for offline use
    Prefetch {
        /// API path, e.g. /templates
        url: String,
        /// Cache key, e.g. templates
        key: String,
    },
    /// Manage cached responses
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// List cache keys
    List,
    /// Remove one entry, or all entries when no key is given
    Clear { key: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qcsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ClientConfig::load(&args.config_dir)?;
    // One-shot process: sync only when asked to
    config.auto_sync = false;
    config.probe_interval_secs = None;

    let tokens = Arc::new(SharedToken::new(config.api_token.clone()));
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        &config.api_url,
        tokens,
        config.request_timeout(),
    )?);

    let online = !args.offline && transport.ping().await;
    if !online {
        tracing::warn!("API at {} is not reachable", config.api_url);
    }

    let client = OfflineClientBuilder::new(config)
        .transport(transport)
        .online(online)
        .build()
        .await?;

    match args.command {
        Command::Status => {
            let state = client.sync_state().await?;
            println!("online:        {}", state.is_online);
            println!("pending sync:  {}", state.pending_sync_count);
            match state.last_sync_time {
                Some(at) => println!("last sync:     {}", at.to_rfc3339()),
                None => println!("last sync:     never"),
            }
        }
        Command::Sync => match client.sync_now().await? {
            Some(report) => {
                println!(
                    "pushed {}, failed {}, pending {}",
                    report.pushed, report.failed, report.remaining
                );
                for error in &report.errors {
                    println!("  {}", error);
                }
            }
            None => println!("sync skipped: offline"),
        },
        Command::Queue => {
            let items = client.queue().snapshot().await?;
            if items.is_empty() {
                println!("queue is empty");
            }
            for item in items {
                let queued_at = chrono::DateTime::from_timestamp_millis(item.timestamp)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                println!("{}  {:<6} {}  {}", item.id, item.method, item.url, queued_at);
            }
        }
        Command::Prefetch { url, key } => {
            match client.prefetch(&url, &key).await? {
                Delivery::Live(_) => println!("cached {} as '{}'", url, key),
                Delivery::Cached(_) => println!("offline, kept existing '{}' entry", key),
                Delivery::Pending { .. } => {
                    anyhow::bail!("unexpected pending delivery for GET {}", url)
                }
            }
        }
        Command::Cache { action } => match action {
            CacheAction::List => {
                for key in client.cache().keys().await? {
                    println!("{}", key);
                }
            }
            CacheAction::Clear { key } => {
                let removed = client.cache().clear(key.as_deref()).await?;
                println!("removed {} entries", removed);
            }
        },
    }

    Ok(())
}
