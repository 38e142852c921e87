// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! bucketwatch: Bucket Poller & Live Image Feed
//!
//! Polls a storage bucket for new images, mirrors them into a local cache,
//! raises desktop alerts and pushes every arrival to connected browsers.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use bucketwatch::cache::LocalImageCache;
use bucketwatch::config::AppConfig;
use bucketwatch::notifier::Notifier;
use bucketwatch::poller::Poller;
use bucketwatch::storage::GcsStore;
use bucketwatch::web::{self, AppState};
use bucketwatch::{desktop, location, BucketwatchError, Result};

/// bucketwatch CLI - Bucket Poller & Live Image Feed
#[derive(Parser, Debug)]
#[command(name = "bucketwatch")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "0.1.0")]
#[command(about = "Polls a storage bucket for new images and pushes live alerts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the bucket and serve the live web page
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on (overrides config and $PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve the cache without polling the bucket
        #[arg(long)]
        no_poll: bool,

        /// Open the page in the system browser
        #[arg(long)]
        open: bool,
    },

    /// Run a single poll cycle and exit
    Poll,

    /// Show which cached images count as just arrived
    Recent,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    let mut config = AppConfig::load(&cli.config)?;
    config.apply_env()?;

    match cli.command {
        Some(Commands::Serve { host, port, no_poll, open }) => {
            run_serve(config, host, port, no_poll, open).await
        }
        Some(Commands::Poll) => run_poll(config).await,
        Some(Commands::Recent) => run_recent(config).await,
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        None => run_serve(config, None, None, false, false).await,
    }
}

fn open_cache(config: &AppConfig) -> Result<LocalImageCache> {
    let cache = LocalImageCache::open(Path::new(&config.cache.dir), &config.storage.suffix)?;
    info!("Image cache: {:?}", cache.root());
    Ok(cache)
}

fn build_poller(config: &AppConfig, cache: LocalImageCache, notifier: Arc<Notifier>) -> Result<Poller> {
    let store = Arc::new(GcsStore::from_config(&config.storage)?);
    info!("Bucket: {} (prefix {:?})", config.storage.bucket, config.storage.prefix);
    Ok(Poller::new(
        store,
        cache,
        notifier,
        desktop::from_config(&config.notifications),
        &config.storage.prefix,
        &config.notifications.title,
    ))
}

/// Run the poller and web server until Ctrl+C / SIGTERM
async fn run_serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    no_poll: bool,
    open: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }
    if no_poll {
        warn!("Polling disabled, serving cached images only");
    } else {
        config.validate()?;
    }

    let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port)
        .parse()
        .map_err(|e| BucketwatchError::Config(format!("Invalid listen address: {}", e)))?;

    let cache = open_cache(&config)?;
    let notifier = Arc::new(Notifier::new(config.recency.clone(), &config.storage.suffix));
    let location = location::from_config(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listener(shutdown_tx);

    let poller_task = if no_poll {
        None
    } else {
        let poller = build_poller(&config, cache.clone(), notifier.clone())?;
        Some(tokio::spawn(poller.run(config.poller.interval(), shutdown_rx.clone())))
    };

    if open {
        let url = format!("http://{}", addr);
        if let Err(e) = open_browser(&url) {
            error!("Failed to open browser: {}", e);
        }
    }

    let state = Arc::new(AppState::new(config, cache, notifier, location)?);
    web::start_server(state, addr, shutdown_rx).await?;

    if let Some(task) = poller_task {
        if let Err(e) = task.await {
            error!("Poller task failed: {}", e);
        }
    }

    info!("bucketwatch stopped.");
    Ok(())
}

fn spawn_shutdown_listener(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });
}

/// Run one poll cycle and print what happened
async fn run_poll(config: AppConfig) -> Result<()> {
    config.validate()?;
    let cache = open_cache(&config)?;
    let notifier = Arc::new(Notifier::new(config.recency.clone(), &config.storage.suffix));
    let poller = build_poller(&config, cache, notifier)?;

    let report = poller.poll_once().await?;
    println!("Listed {} objects", report.listed);
    for name in &report.downloaded {
        println!("  downloaded {}", name);
    }
    for name in &report.failed {
        println!("  failed     {}", name);
    }
    if report.downloaded.is_empty() && report.failed.is_empty() {
        println!("Nothing new");
    }

    Ok(())
}

/// Print the recent subset of the cache
async fn run_recent(config: AppConfig) -> Result<()> {
    let cache = open_cache(&config)?;
    let notifier = Notifier::new(config.recency.clone(), &config.storage.suffix);

    let images = cache.list_images().await?;
    let recent = notifier.recent(&images);
    println!("{} cached, {} recent:", images.len(), recent.len());
    for name in recent {
        println!("  {}", name);
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Bucket: {}", config.storage.bucket);
            println!("  Cache: {}", config.cache.dir);
            println!("  Listen: {}:{}", config.web.host, config.web.port);
        }
    }

    Ok(())
}

fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd").args(["/c", "start", url]).spawn()?;
    }
    Ok(())
}
