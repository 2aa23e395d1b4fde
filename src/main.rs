use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use feedhub::archive::ArchiveStore;
use feedhub::bus::HandlerRegistry;
use feedhub::config::Config;
use feedhub::hub::Hub;
use feedhub::storage::Database;
use feedhub::util::validate_feed_url;

#[derive(Parser, Debug)]
#[command(name = "feedhub", about = "Feed poller: fetch, dedupe, store, notify")]
struct Args {
    /// Path of the configuration file
    #[arg(long, default_value = "feedhub.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch all enabled feeds once
    FetchAll,
    /// Register a feed URL
    AddFeed {
        url: String,
        /// Create the feed excluded from scheduled collection
        #[arg(long)]
        disabled: bool,
    },
    /// List all known feeds
    ListFeeds,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let db = Database::open(&config.database_path).await?;
    let archive = ArchiveStore::new(config.archive_dir.clone());
    // Subscriber callbacks are registered by embedding code; the bare CLI
    // carries none, but persisted subscriptions are still replayed so
    // resolvable ones reconnect.
    let registry = HandlerRegistry::new();
    let hub = Hub::new(db, registry, archive, reqwest::Client::new(), config);
    hub.load_subscriptions().await;

    match args.command {
        Command::FetchAll => {
            let feeds = match hub.db().enabled_feeds().await {
                Ok(feeds) => feeds,
                Err(e) => {
                    eprintln!("Cannot fetch the enabled feeds.\n{}", e);
                    std::process::exit(1);
                }
            };
            let elapsed = hub.fetch_collection(&feeds, "[cli]").await;
            println!(
                "{} enabled feeds fetched in {:.3}s.",
                feeds.len(),
                elapsed.as_secs_f64()
            );
        }
        Command::AddFeed { url, disabled } => {
            validate_feed_url(&url)?;
            let feed = hub.db().get_or_create_feed(&url).await?;
            if disabled {
                hub.db().set_feed_enabled(feed.id, false).await?;
            }
            println!("Feed #{}: {}", feed.id, feed.url);
        }
        Command::ListFeeds => {
            for feed in hub.db().all_feeds().await? {
                println!(
                    "#{}\t{}\t{}\tetag={}",
                    feed.id,
                    if feed.enabled { "enabled" } else { "disabled" },
                    feed.url,
                    feed.etag.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
