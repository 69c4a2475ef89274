//! Browser Automation Traits
//!
//! The rasterizer only needs a handful of page operations. Implementations
//! handle the wire protocol; see `cdp` for the Chrome DevTools backend.

use async_trait::async_trait;

use super::{RenderError, ScreenshotOptions, Viewport};

/// A headless browser able to open pages
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Open a fresh blank page. The caller must [`BrowserPage::close`] it.
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, RenderError>;
}

/// One browser page
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Set viewport size and device scale
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), RenderError>;

    /// Replace the document with `html`
    async fn set_content(&self, html: &str) -> Result<(), RenderError>;

    /// Resolve once `selector` matches an element. Unbounded; callers
    /// apply their own timeout.
    async fn wait_for_selector(&self, selector: &str) -> Result<(), RenderError>;

    /// `document.documentElement.scrollHeight`
    async fn content_height(&self) -> Result<u32, RenderError>;

    /// Capture the full page, returning the base64 payload
    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<String, RenderError>;

    /// Release the page
    async fn close(self: Box<Self>) -> Result<(), RenderError>;
}
