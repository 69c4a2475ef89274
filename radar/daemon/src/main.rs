//! con-radar - Console Convention Bot
//!
//! Runs the bot against a console transport: each stdin line is a message
//! from one user, replies are printed to stdout, logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Text commands only
//! con-radar
//!
//! # With image rendering through a local Chrome
//! chrome --headless --remote-debugging-port=9222 &
//! con-radar --browser http://127.0.0.1:9222 --image-dir ./out
//!
//! # Verbose logging
//! RUST_LOG=debug con-radar
//! ```
//!
//! # Configuration
//!
//! `~/.config/con-radar/con-radar.toml`, then `CON_RADAR_*` environment
//! variables, then the flags below.

mod console;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use con_radar_core::{
    default_config_path, load_config, BotOptions, BrowserAutomation, ConfigError, ConventionBot,
    CoverSource, EventRenderer, HttpSearchBackend, JsonFileSubscriptionStore, MemorySubscriptionStore,
    QueryOrchestrator, RadarConfig, Rasterizer, SelectionCache, SubscriptionStore,
};

use console::{spawn_stdin_reader, Console, ConsoleIdentity};

/// con-radar - convention lookups from the terminal
#[derive(Parser, Debug)]
#[command(name = "con-radar")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CON_RADAR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// User id the console speaks as
    #[arg(short = 'u', long, default_value = "console")]
    user: String,

    /// Channel id the console speaks in
    #[arg(long, default_value = "console")]
    channel: String,

    /// Guild id; omit to behave like a direct message
    #[arg(long)]
    guild: Option<String>,

    /// DevTools endpoint (`http://host:port` or `ws://...`)
    #[arg(short = 'b', long, value_name = "URL")]
    browser: Option<String>,

    /// Search service URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Dark palette for rendered images
    #[arg(long)]
    dark: bool,

    /// Enable both image commands
    #[arg(long)]
    images: bool,

    /// Subscription file
    #[arg(long, value_name = "FILE")]
    subscriptions: Option<PathBuf>,

    /// Write received images here instead of summarizing them
    #[arg(long, value_name = "DIR")]
    image_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "CON_RADAR_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    /// CLI flags win over file and environment; the result is re-validated
    fn apply_overrides(&self, config: &mut RadarConfig) -> Result<(), ConfigError> {
        if let Some(browser) = &self.browser {
            config.browser_endpoint = Some(browser.clone());
        }
        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.clone();
        }
        if let Some(path) = &self.subscriptions {
            config.subscriptions_path = Some(path.clone());
        }
        if self.dark {
            config.enable_dark_mode = true;
        }
        if self.images {
            config.enable_image_query = true;
            config.enable_image_batch_query = true;
        }
        config.validate()
    }
}

#[cfg(feature = "cdp")]
async fn connect_browser(config: &RadarConfig) -> Option<Arc<dyn BrowserAutomation>> {
    use con_radar_core::render::cdp::CdpBrowser;

    let endpoint = config.browser_endpoint.as_deref()?;
    match CdpBrowser::connect(endpoint, config.browser_timeout()).await {
        Ok(browser) => {
            info!(endpoint, "Connected to browser");
            Some(Arc::new(browser))
        }
        Err(e) => {
            warn!(endpoint, error = %e, "Browser unavailable, image commands disabled");
            None
        }
    }
}

#[cfg(not(feature = "cdp"))]
async fn connect_browser(config: &RadarConfig) -> Option<Arc<dyn BrowserAutomation>> {
    if config.browser_endpoint.is_some() {
        warn!("Built without the cdp feature, ignoring browser endpoint");
    }
    None
}

async fn open_store(config: &RadarConfig) -> Result<Arc<dyn SubscriptionStore>> {
    match &config.subscriptions_path {
        Some(path) => {
            let store = JsonFileSubscriptionStore::open(path)
                .await
                .with_context(|| format!("Failed to open subscriptions at {}", path.display()))?;
            info!(path = %path.display(), "Using subscription file");
            Ok(Arc::new(store))
        }
        None => {
            info!("No subscription file configured, subscriptions are kept in memory");
            Ok(Arc::new(MemorySubscriptionStore::new()))
        }
    }
}

async fn build_bot(config: &RadarConfig) -> Result<ConventionBot> {
    let search = Arc::new(
        HttpSearchBackend::new(&config.api_url, config.request_timeout())
            .context("Failed to build search client")?,
    );
    let covers: Arc<dyn CoverSource> = search.clone();
    let orchestrator = QueryOrchestrator::new(search, open_store(config).await?);

    let bot = ConventionBot::new(
        BotOptions::from(config),
        orchestrator,
        SelectionCache::new(config.selection_ttl()),
        Arc::clone(&covers),
    );

    Ok(match connect_browser(config).await {
        Some(browser) => {
            let rasterizer = Rasterizer::new(browser, config.screenshot_options());
            let renderer = EventRenderer::new(rasterizer, covers, config.render_settings());
            bot.with_renderer(Arc::new(renderer))
        }
        None => bot,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    args
        .apply_overrides(&mut config)
        .context("Invalid command-line options")?;

    let bot = build_bot(&config).await?;
    info!(
        api_url = %config.api_url,
        images = bot.has_renderer(),
        user = %args.user,
        "con-radar ready, type 漫展 to start"
    );

    let console = Console::new(
        ConsoleIdentity {
            user_id: args.user.clone(),
            channel_id: args.channel.clone(),
            guild_id: args.guild.clone(),
        },
        spawn_stdin_reader(),
        args.image_dir.clone(),
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = console.next_line() => {
                let Some(line) = line else {
                    info!("Stdin closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let handled = bot.handle(Arc::new(console.session(line))).await;
                debug!(?handled, "Message handled");
            }
            _ = &mut shutdown => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
