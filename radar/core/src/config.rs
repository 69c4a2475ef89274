//! TOML Configuration File Support
//!
//! The bot reads `con-radar.toml` from `$XDG_CONFIG_HOME/con-radar/`
//! (typically `~/.config/con-radar/con-radar.toml`).
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the daemon)
//! 2. `CON_RADAR_*` environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! api_url = "http://xwl.vincentzyu233.cn:51225/search"
//! add_quote = true
//! enable_image_query = true
//! enable_image_batch_query = true
//! image_display_mode = "flip-horizontal"
//! enable_dark_mode = false
//! image_type = "jpeg"
//! screenshot_quality = 80
//! browser_endpoint = "http://127.0.0.1:9222"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::DisplayMode;
use crate::render::{ImageFormat, RenderSettings, ScreenshotOptions};
use crate::search::DEFAULT_API_URL;
use crate::selection::SelectionTtl;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CON_RADAR_";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Bot configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Search service endpoint
    pub api_url: String,

    /// Search and cover request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Quote the triggering message in replies
    pub add_quote: bool,

    /// Enable `图片查询`
    pub enable_image_query: bool,

    /// Enable `一键图片查询`
    pub enable_image_batch_query: bool,

    /// Cover imagery on rendered result lists
    pub image_display_mode: DisplayMode,

    /// Font file embedded into rendered pages
    pub custom_font_path: Option<String>,

    /// Dark palette for rendered pages
    pub enable_dark_mode: bool,

    /// Screenshot encoding
    pub image_type: ImageFormat,

    /// Quality for lossy encodings, 0-100
    pub screenshot_quality: u8,

    /// DevTools endpoint, `http://host:port` or `ws://...`.
    ///
    /// No endpoint means image commands answer with the unavailable notice.
    pub browser_endpoint: Option<String>,

    /// DevTools command timeout in milliseconds
    pub browser_timeout_ms: u64,

    /// Subscription file; in-memory subscriptions when absent
    pub subscriptions_path: Option<PathBuf>,

    /// Selection window for text lists, in seconds
    pub text_ttl_secs: u64,

    /// Selection window for image lists, in seconds
    pub image_ttl_secs: u64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: 10_000,
            add_quote: true,
            enable_image_query: false,
            enable_image_batch_query: false,
            image_display_mode: DisplayMode::default(),
            custom_font_path: None,
            enable_dark_mode: false,
            image_type: ImageFormat::default(),
            screenshot_quality: 80,
            browser_endpoint: None,
            browser_timeout_ms: 30_000,
            subscriptions_path: None,
            text_ttl_secs: 15,
            image_ttl_secs: 30,
        }
    }
}

impl RadarConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `CON_RADAR_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by full variable name.
    ///
    /// Values that do not parse are logged and skipped.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, v)) = get("API_URL") {
            self.api_url = v;
        }
        if let Some((key, v)) = get("REQUEST_TIMEOUT_MS") {
            override_parsed(&key, &v, &mut self.request_timeout_ms);
        }
        if let Some((_, v)) = get("ADD_QUOTE") {
            self.add_quote = parse_bool(&v);
        }
        if let Some((_, v)) = get("ENABLE_IMAGE_QUERY") {
            self.enable_image_query = parse_bool(&v);
        }
        if let Some((_, v)) = get("ENABLE_IMAGE_BATCH_QUERY") {
            self.enable_image_batch_query = parse_bool(&v);
        }
        if let Some((key, v)) = get("IMAGE_DISPLAY_MODE") {
            override_parsed(&key, &v, &mut self.image_display_mode);
        }
        if let Some((_, v)) = get("CUSTOM_FONT_PATH") {
            self.custom_font_path = non_empty(v);
        }
        if let Some((_, v)) = get("ENABLE_DARK_MODE") {
            self.enable_dark_mode = parse_bool(&v);
        }
        if let Some((key, v)) = get("IMAGE_TYPE") {
            override_parsed(&key, &v, &mut self.image_type);
        }
        if let Some((key, v)) = get("SCREENSHOT_QUALITY") {
            override_parsed(&key, &v, &mut self.screenshot_quality);
        }
        if let Some((_, v)) = get("BROWSER_ENDPOINT") {
            self.browser_endpoint = non_empty(v);
        }
        if let Some((key, v)) = get("BROWSER_TIMEOUT_MS") {
            override_parsed(&key, &v, &mut self.browser_timeout_ms);
        }
        if let Some((_, v)) = get("SUBSCRIPTIONS_PATH") {
            self.subscriptions_path = non_empty(v).map(PathBuf::from);
        }
        if let Some((key, v)) = get("TEXT_TTL_SECS") {
            override_parsed(&key, &v, &mut self.text_ttl_secs);
        }
        if let Some((key, v)) = get("IMAGE_TTL_SECS") {
            override_parsed(&key, &v, &mut self.image_ttl_secs);
        }
    }

    /// Reject values the bot cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("api_url must not be empty".into()));
        }
        if self.screenshot_quality > 100 {
            return Err(ConfigError::ValidationError(format!(
                "screenshot_quality must be within 0-100, got {}",
                self.screenshot_quality
            )));
        }
        if self.text_ttl_secs == 0 || self.image_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "selection windows must be at least one second".into(),
            ));
        }
        if self.request_timeout_ms == 0 || self.browser_timeout_ms == 0 {
            return Err(ConfigError::ValidationError("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn browser_timeout(&self) -> Duration {
        Duration::from_millis(self.browser_timeout_ms)
    }

    /// Selection windows
    #[must_use]
    pub fn selection_ttl(&self) -> SelectionTtl {
        SelectionTtl {
            text: Duration::from_secs(self.text_ttl_secs),
            image: Duration::from_secs(self.image_ttl_secs),
        }
    }

    /// Appearance of rendered images
    #[must_use]
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            dark_mode: self.enable_dark_mode,
            display_mode: self.image_display_mode,
            font_path: self.custom_font_path.clone(),
        }
    }

    #[must_use]
    pub fn screenshot_options(&self) -> ScreenshotOptions {
        ScreenshotOptions::new(self.image_type, self.screenshot_quality)
    }
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.to_lowercase() == "true"
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn override_parsed<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(key, value, "Ignoring unparseable environment override"),
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/con-radar/con-radar.toml` or
/// `~/.config/con-radar/con-radar.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("con-radar").join("con-radar.toml"))
}

/// Load configuration from a file, then the environment.
///
/// A missing file is not an error (defaults are used); an unreadable or
/// malformed one is.
pub fn load_config(path: Option<&Path>) -> Result<RadarConfig, ConfigError> {
    let mut config = match path {
        Some(config_path) if config_path.exists() => {
            let content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;
            let config = RadarConfig::from_toml(&content)?;
            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
            config
        }
        Some(config_path) => {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
            RadarConfig::default()
        }
        None => RadarConfig::default(),
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}
