mod config;
mod db;
mod oui;
#[cfg(test)]
mod test_utils;
mod web;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::CacheConfig;
use oui::{DEFAULT_SEARCH_LIMIT, HttpRegistryFetcher, OuiCache, RefreshOutcome, Store};

#[derive(Parser)]
#[command(name = "oui-cache")]
#[command(about = "Local IEEE OUI registry cache for MAC address vendor lookups")]
struct Cli {
    /// Path to the SQLite cache file (overrides OUI_DATABASE_PATH)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Refresh the registry once the cache is older than this many days
    #[arg(long)]
    max_age_days: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the JSON lookup API
    Serve {
        /// Address to listen on (overrides OUI_BIND)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Refresh the cache if it is stale
    Update {
        /// Download even if the cache is fresh
        #[arg(long)]
        force: bool,
    },
    /// Look up the vendor of one or more MAC addresses
    Lookup {
        #[arg(required = true)]
        macs: Vec<String>,
    },
    /// Search vendors by (part of) their name
    Search {
        name: String,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Show cache statistics
    Stats,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }
    if let Some(days) = cli.max_age_days {
        config.set_max_age_days(days)?;
    }

    let cache = Arc::new(build_cache(&config)?);

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            actix_rt::System::new().block_on(web::serve(cache, &bind))?;
        }
        Command::Update { force } => {
            let outcome = cache.update(force)?;
            tracing::info!("{}", outcome);
            print_json(&serde_json::json!({
                "status": outcome.as_str(),
                "message": outcome.to_string(),
            }))?;
            if let RefreshOutcome::Failed(reason) = outcome {
                return Err(reason.into());
            }
        }
        Command::Lookup { macs } => {
            if let [mac] = macs.as_slice() {
                match cache.lookup_mac(mac)? {
                    Some(info) => print_json(&info)?,
                    None => return Err(format!("No vendor found for {}", mac).into()),
                }
            } else {
                print_json(&cache.lookup_batch(&macs)?)?;
            }
        }
        Command::Search { name, limit } => {
            print_json(&cache.search_vendor(&name, limit)?)?;
        }
        Command::Stats => {
            print_json(&cache.stats()?)?;
        }
    }

    Ok(())
}

fn build_cache(config: &CacheConfig) -> Result<OuiCache, Box<dyn std::error::Error>> {
    let store = Store::open(&config.resolved_database_path())?;
    let fetcher = HttpRegistryFetcher::new(
        config.mirrors.clone(),
        config.fetch_timeout,
        config.min_content_length,
    )?;
    Ok(OuiCache::new(store, Box::new(fetcher), config.max_age()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
