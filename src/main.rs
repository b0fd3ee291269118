use clap::{Parser, Subcommand};
use pixcache::adapter::{ImageStorage, StorageAdapter};
use pixcache::cache::{Cache, CacheOptions};
use pixcache::config::{self, ServiceConfig};
use pixcache::imaging::{self, RustBackend, TransformLimits};
use pixcache::params::RawParams;
use pixcache::store::S3Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pixcache")]
#[command(about = "Derivative-image cache in front of an S3-compatible object store")]
#[command(long_about = "\
Derivative-image cache in front of an S3-compatible object store

Originals are read from the configured bucket. Image requests are resized
and optionally re-encoded as WebP on first access, then served from the
local cache folder.

Query parameters:

  width=<n>     fit within n pixels wide (never enlarges)
  webp=1        re-encode as WebP
  original=1    bypass the cache and stream the stored object

Cache layout:

  <folder>/<path>                           default width
  <folder>/resized/<n>/<path>               width=n
  <folder>/webp/<path>.webp                 webp=1
  <folder>/webp/resized/<n>/<path>.webp     width=n&webp=1

Run 'pixcache gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, env = "PIXCACHE_CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve originals and derivatives over HTTP
    Serve,
    /// Print a stock config.toml with all options documented
    GenConfig,
    /// Materialize one derivative into the cache
    Warm {
        /// Logical path of the original, e.g. 2024/01/photo.jpg
        path: String,
        /// Fit within this width
        #[arg(long)]
        width: Option<u32>,
        /// Re-encode as WebP
        #[arg(long)]
        webp: bool,
    },
    /// Remove every cached derivative of one original
    Purge {
        /// Logical path of the original
        path: String,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "pixcache=info,tower_http=info",
        1 => "pixcache=debug,tower_http=debug",
        _ => "pixcache=trace,tower_http=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn build_cache(config: &ServiceConfig) -> Cache {
    let store = S3Store::new(&config.storage).await;
    Cache::new(
        CacheOptions::from(&config.cache),
        Arc::new(store),
        Arc::new(RustBackend::new()),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    imaging::init(TransformLimits::default());

    match cli.command {
        Command::Serve => {
            let config = config::load_config(&cli.config)?;
            let storage = ImageStorage::new(
                build_cache(&config).await,
                &config.storage.server_url,
                config.server.max_age_secs,
            );
            let listener = tokio::net::TcpListener::bind(config.server.bind.as_str()).await?;
            info!(
                bind = %config.server.bind,
                bucket = %config.storage.bucket,
                cache = %config.cache.folder.display(),
                "serving"
            );
            axum::serve(listener, storage.serve())
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Warm { path, width, webp } => {
            let config = config::load_config(&cli.config)?;
            let cache = build_cache(&config).await;
            let raw = RawParams {
                original: None,
                webp: webp.then(|| "1".to_string()),
                width: width.map(|w| w.to_string()),
            };
            let cached = cache.ensure(&path, &raw).await?;
            println!("{}", cached.display());
        }
        Command::Purge { path } => {
            let config = config::load_config(&cli.config)?;
            let removed = build_cache(&config).await.delete(&path).await?;
            println!("Removed {removed} cached variant(s) of {path}");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
