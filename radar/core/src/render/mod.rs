//! Rasterizer
//!
//! Turns composed HTML pages into screenshots through a headless browser.
//!
//! # Design Philosophy
//!
//! The browser sits behind [`BrowserAutomation`]/[`BrowserPage`] so the
//! rasterization sequence can be driven against a real Chromium (the `cdp`
//! feature) or a recording fake in tests. Every render acquires its own
//! page and the page is closed on every exit path, success or failure.
//!
//! # Sequence
//!
//! 1. Viewport `width × 800` at device scale 1.5
//! 2. Load the markup
//! 3. Wait for `body`, bounded by [`BODY_WAIT_TIMEOUT`]
//! 4. Measure `document.documentElement.scrollHeight`
//! 5. Resize the viewport to the measured height
//! 6. Capture the screenshot as base64

mod browser;
#[cfg(feature = "cdp")]
pub mod cdp;
mod pipeline;

pub use browser::{BrowserAutomation, BrowserPage};
pub use pipeline::{EventRenderer, RenderSettings};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::ComposedPage;

/// Initial viewport height before measuring the content
pub const INITIAL_VIEWPORT_HEIGHT: u32 = 800;
/// Device scale factor for every render
pub const DEVICE_SCALE_FACTOR: f64 = 1.5;
/// Upper bound for the `body` selector wait
pub const BODY_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    /// Could not reach the browser
    #[error("failed to connect to browser: {0}")]
    Connect(String),

    /// The browser rejected a command
    #[error("browser command {method} failed: {message}")]
    Protocol { method: String, message: String },

    /// The browser answered with something unexpected
    #[error("unexpected browser response to {method}: {detail}")]
    UnexpectedResponse { method: String, detail: String },

    /// A bounded wait ran out
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// The browser connection went away
    #[error("browser connection closed")]
    ConnectionClosed,
}

/// Screenshot encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Name used by the browser and in MIME types
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    /// `image/<format>`
    #[must_use]
    pub fn mime(&self) -> String {
        format!("image/{}", self.as_str())
    }

    /// Whether the format accepts a quality setting
    #[must_use]
    pub fn is_lossy(&self) -> bool {
        !matches!(self, Self::Png)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised image format name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown image format '{0}' (expected png, jpeg or webp)")]
pub struct ParseImageFormatError(pub String);

impl FromStr for ImageFormat {
    type Err = ParseImageFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            _ => Err(ParseImageFormatError(s.to_string())),
        }
    }
}

/// Browser viewport
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Viewport {
    /// Viewport at the standard device scale
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: DEVICE_SCALE_FACTOR,
        }
    }
}

/// Screenshot parameters as sent to the browser
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub format: ImageFormat,
    /// Only set for lossy formats
    pub quality: Option<u8>,
}

impl ScreenshotOptions {
    /// Options for a format; `quality` is clamped to 0–100 and dropped for PNG
    #[must_use]
    pub fn new(format: ImageFormat, quality: u8) -> Self {
        Self {
            format,
            quality: format.is_lossy().then_some(quality.min(100)),
        }
    }
}

/// A finished screenshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedImage {
    pub format: ImageFormat,
    /// Base64 payload as returned by the browser
    pub base64: String,
}

impl RenderedImage {
    /// `data:image/<fmt>;base64,…` URI for chat transports
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), self.base64)
    }
}

/// Runs the rasterization sequence against a browser
#[derive(Clone)]
pub struct Rasterizer {
    browser: Arc<dyn BrowserAutomation>,
    screenshot: ScreenshotOptions,
}

impl fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rasterizer")
            .field("browser", &self.browser.name())
            .field("screenshot", &self.screenshot)
            .finish()
    }
}

impl Rasterizer {
    #[must_use]
    pub fn new(browser: Arc<dyn BrowserAutomation>, screenshot: ScreenshotOptions) -> Self {
        Self {
            browser,
            screenshot,
        }
    }

    /// Output format
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.screenshot.format
    }

    /// Rasterize a composed page. The page is closed whatever the outcome;
    /// a failure to close is logged and does not mask the render result.
    pub async fn rasterize(&self, page: &ComposedPage) -> Result<RenderedImage, RenderError> {
        let browser_page = self.browser.new_page().await?;

        let result = self.drive(browser_page.as_ref(), page).await;

        if let Err(e) = browser_page.close().await {
            tracing::warn!(error = %e, "Failed to close browser page");
        }

        match &result {
            Ok(image) => tracing::debug!(
                browser = self.browser.name(),
                format = %image.format,
                bytes = image.base64.len(),
                "Rendered page"
            ),
            Err(e) => tracing::error!(browser = self.browser.name(), error = %e, "Render failed"),
        }
        result
    }

    async fn drive(
        &self,
        page: &dyn BrowserPage,
        composed: &ComposedPage,
    ) -> Result<RenderedImage, RenderError> {
        let width = composed.size.viewport_width;

        page.set_viewport(Viewport::new(width, INITIAL_VIEWPORT_HEIGHT))
            .await?;
        page.set_content(&composed.html).await?;

        tokio::time::timeout(BODY_WAIT_TIMEOUT, page.wait_for_selector("body"))
            .await
            .map_err(|_| RenderError::Timeout {
                what: "selector 'body'".to_string(),
                after: BODY_WAIT_TIMEOUT,
            })??;

        let height = page.content_height().await?;
        page.set_viewport(Viewport::new(width, height)).await?;

        let base64 = page.screenshot(&self.screenshot).await?;
        Ok(RenderedImage {
            format: self.screenshot.format,
            base64,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, FakeBrowser, Script};
    use super::*;
    use crate::layout::PageSize;
    use pretty_assertions::assert_eq;

    fn page() -> ComposedPage {
        ComposedPage {
            html: "<html><body>hi</body></html>".to_string(),
            size: PageSize::LIST,
        }
    }

    #[test]
    fn test_quality_only_for_lossy_formats() {
        assert_eq!(ScreenshotOptions::new(ImageFormat::Png, 80).quality, None);
        assert_eq!(ScreenshotOptions::new(ImageFormat::Jpeg, 80).quality, Some(80));
        assert_eq!(ScreenshotOptions::new(ImageFormat::Webp, 250).quality, Some(100));
    }

    #[test]
    fn test_image_format_parse_and_uri() {
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert!("gif".parse::<ImageFormat>().is_err());

        let image = RenderedImage {
            format: ImageFormat::Webp,
            base64: "AAAA".to_string(),
        };
        assert_eq!(image.data_uri(), "data:image/webp;base64,AAAA");
    }

    #[tokio::test]
    async fn test_rasterize_sequence() {
        let browser = Arc::new(FakeBrowser::new(Script {
            height: 1234,
            ..Default::default()
        }));
        let rasterizer = Rasterizer::new(
            browser.clone(),
            ScreenshotOptions::new(ImageFormat::Png, 80),
        );

        let image = rasterizer.rasterize(&page()).await.unwrap();

        assert_eq!(image.base64, "SU1H");
        assert_eq!(
            browser.calls(),
            vec![
                Call::Viewport(Viewport::new(900, 800)),
                Call::Content(page().html),
                Call::Wait("body".to_string()),
                Call::Height,
                Call::Viewport(Viewport::new(900, 1234)),
                Call::Screenshot(ScreenshotOptions {
                    format: ImageFormat::Png,
                    quality: None
                }),
                Call::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_page_closed_on_failure() {
        let browser = Arc::new(FakeBrowser::new(Script {
            fail_content: true,
            ..Default::default()
        }));
        let rasterizer = Rasterizer::new(
            browser.clone(),
            ScreenshotOptions::new(ImageFormat::Jpeg, 80),
        );

        let err = rasterizer.rasterize(&page()).await.unwrap_err();

        assert!(matches!(err, RenderError::Protocol { .. }));
        assert_eq!(browser.calls().last(), Some(&Call::Close));
        assert!(!browser.calls().contains(&Call::Height));
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_wait_is_bounded() {
        let browser = Arc::new(FakeBrowser::new(Script {
            hang_wait: true,
            ..Default::default()
        }));
        let rasterizer = Rasterizer::new(
            browser.clone(),
            ScreenshotOptions::new(ImageFormat::Png, 80),
        );

        let err = rasterizer.rasterize(&page()).await.unwrap_err();

        assert!(matches!(err, RenderError::Timeout { after, .. } if after == BODY_WAIT_TIMEOUT));
        assert_eq!(browser.calls().last(), Some(&Call::Close));
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_success() {
        let browser = Arc::new(FakeBrowser::new(Script {
            height: 10,
            fail_close: true,
            ..Default::default()
        }));
        let rasterizer = Rasterizer::new(browser, ScreenshotOptions::new(ImageFormat::Png, 0));

        assert!(rasterizer.rasterize(&page()).await.is_ok());
    }
}
