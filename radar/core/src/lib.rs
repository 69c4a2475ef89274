//! con-radar Core - Convention Lookup Bot
//!
//! This crate holds everything the bot does apart from talking to a real
//! chat platform: searching the convention service, the numbered
//! disambiguation protocol, subscriptions, and rendering result cards to
//! images through a headless browser.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Chat transport (daemon)                      │
//! │               ChatSession per inbound message                    │
//! └────────────────────────────┬─────────────────────────────────────┘
//!                              │
//! ┌────────────────────────────┼─────────────────────────────────────┐
//! │                      CON-RADAR CORE                              │
//! │  ┌─────────────────────────┴──────────────────────────────────┐  │
//! │  │                     ConventionBot                          │  │
//! │  │  ┌───────────┐  ┌──────────┐  ┌──────────────┐  ┌────────┐ │  │
//! │  │  │ Selection │  │ Command  │  │    Query     │  │ Event  │ │  │
//! │  │  │   Cache   │  │  Parser  │  │ Orchestrator │  │Renderer│ │  │
//! │  │  └───────────┘  └──────────┘  └──────┬───────┘  └───┬────┘ │  │
//! │  └──────────────────────────────────────┼──────────────┼──────┘  │
//! │                                         │              │         │
//! │                SearchBackend  SubscriptionStore   Layout + CDP   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ConventionBot`]: routes messages to the selection cache or commands
//! - [`SelectionCache`]: per-user pending result lists with expiry
//! - [`QueryOrchestrator`]: single and fan-out keyword lookups
//! - [`LayoutComposer`]: pure record-to-HTML composition
//! - [`Rasterizer`]: HTML-to-image through a [`BrowserAutomation`]
//!
//! # Module Overview
//!
//! - [`bot`]: message dispatch and reply flows
//! - [`chat`]: chat transport trait and outgoing message builder
//! - [`command`]: `漫展` command parsing
//! - [`config`]: TOML configuration with environment overrides
//! - [`event`]: event records as returned by the search service
//! - [`font`]: custom font embedding
//! - [`layout`]: list and detail page composition, display modes
//! - [`query`]: lookups against the search backend
//! - [`render`]: rasterization and the DevTools browser backend
//! - [`search`]: search service and cover download seams
//! - [`selection`]: the disambiguation cache
//! - [`subscription`]: saved keywords
//! - [`theme`]: light and dark palettes

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bot;
pub mod chat;
pub mod command;
pub mod config;
pub mod event;
pub mod font;
pub mod layout;
pub mod query;
pub mod render;
pub mod search;
pub mod selection;
pub mod subscription;
pub mod theme;

pub use bot::{BotOptions, ConventionBot, Handled};
pub use chat::{ChatSession, InboundMessage, OutgoingMessage, Segment, TransportError};
pub use command::{Command, CommandError, CommandParser};
pub use config::{default_config_path, load_config, ConfigError, RadarConfig};
pub use event::{EventRecord, EventStatus};
pub use font::{resolve_font, FontConfig};
pub use layout::{ComposedPage, DisplayMode, LayoutComposer};
pub use query::{BatchOutcome, QueryOrchestrator};
pub use render::{
    BrowserAutomation, BrowserPage, EventRenderer, ImageFormat, Rasterizer, RenderError,
    RenderSettings, RenderedImage, ScreenshotOptions,
};
pub use search::{CoverSource, HttpSearchBackend, SearchBackend, SearchError, SearchResponse};
pub use selection::{Outcome, Presentation, SelectionCache, SelectionTtl};
pub use subscription::{
    JsonFileSubscriptionStore, MemorySubscriptionStore, StoreError, Subscription,
    SubscriptionStore,
};
pub use theme::DisplayTheme;
