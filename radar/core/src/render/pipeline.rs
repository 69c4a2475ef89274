//! Event Renderer
//!
//! Glue between the search results and the rasterizer: downloads covers,
//! resolves the custom font, composes the page and rasterizes it.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::join_all;

use super::{Rasterizer, RenderError, RenderedImage};
use crate::event::EventRecord;
use crate::font::resolve_font;
use crate::layout::{format_timestamp, DisplayMode, LayoutComposer};
use crate::search::CoverSource;
use crate::theme::DisplayTheme;

/// Appearance settings for rendered images
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderSettings {
    /// Dark palette instead of light
    pub dark_mode: bool,
    /// Cover imagery on list pages
    pub display_mode: DisplayMode,
    /// Optional font file, resolved on every render
    pub font_path: Option<String>,
}

/// Renders result lists and detail views to images
pub struct EventRenderer {
    rasterizer: Rasterizer,
    covers: Arc<dyn CoverSource>,
    settings: RenderSettings,
}

impl EventRenderer {
    #[must_use]
    pub fn new(rasterizer: Rasterizer, covers: Arc<dyn CoverSource>, settings: RenderSettings) -> Self {
        Self {
            rasterizer,
            covers,
            settings,
        }
    }

    /// Settings in use
    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    fn composer(&self) -> LayoutComposer {
        LayoutComposer::new(
            *DisplayTheme::select(self.settings.dark_mode),
            resolve_font(self.settings.font_path.as_deref()),
            format_timestamp(&chrono::Local::now()),
        )
    }

    async fn cover(&self, record: &EventRecord) -> Option<String> {
        let url = record.cover_url()?;
        let bytes = self.covers.fetch_cover(url).await?;
        Some(STANDARD.encode(bytes))
    }

    /// Render a numbered result list under `title`
    pub async fn render_list(
        &self,
        title: &str,
        records: &[EventRecord],
    ) -> Result<RenderedImage, RenderError> {
        let mode = self.settings.display_mode;
        let covers: Vec<Option<String>> = if mode.wants_cover() {
            join_all(records.iter().map(|r| self.cover(r))).await
        } else {
            Vec::new()
        };

        tracing::debug!(
            title,
            records = records.len(),
            covers = covers.iter().filter(|c| c.is_some()).count(),
            %mode,
            "Rendering list"
        );

        let page = self.composer().compose_list(title, records, &covers, mode);
        self.rasterizer.rasterize(&page).await
    }

    /// Render the detail view of one record
    pub async fn render_detail(&self, record: &EventRecord) -> Result<RenderedImage, RenderError> {
        let cover = self.cover(record).await;
        tracing::debug!(name = %record.name, has_cover = cover.is_some(), "Rendering detail");

        let page = self.composer().compose_detail(record, cover.as_deref());
        self.rasterizer.rasterize(&page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{Call, FakeBrowser, Script};
    use crate::render::{ImageFormat, ScreenshotOptions};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Covers {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CoverSource for Covers {
        async fn fetch_cover(&self, url: &str) -> Option<Vec<u8>> {
            self.requested.lock().push(url.to_string());
            url.ends_with(".jpg").then(|| b"ABC".to_vec())
        }
    }

    fn record(name: &str, cover: Option<&str>) -> EventRecord {
        EventRecord {
            name: name.to_string(),
            app_logo_pic_url: cover.map(str::to_string),
            ..Default::default()
        }
    }

    fn renderer(
        mode: DisplayMode,
    ) -> (EventRenderer, Arc<FakeBrowser>, Arc<Covers>) {
        let browser = Arc::new(FakeBrowser::new(Script {
            height: 500,
            ..Default::default()
        }));
        let covers = Arc::new(Covers::default());
        let renderer = EventRenderer::new(
            Rasterizer::new(browser.clone(), ScreenshotOptions::new(ImageFormat::Png, 80)),
            covers.clone(),
            RenderSettings {
                display_mode: mode,
                font_path: Some("/nonexistent/font.ttf".to_string()),
                ..Default::default()
            },
        );
        (renderer, browser, covers)
    }

    fn rendered_html(browser: &FakeBrowser) -> String {
        browser
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Content(html) => Some(html),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_fetches_covers_in_record_order() {
        let (renderer, browser, covers) = renderer(DisplayMode::Compact);
        let records = vec![
            record("a", Some("https://img/a.jpg")),
            record("b", None),
            record("c", Some("https://img/c.png")),
        ];

        let image = renderer.render_list("漫展查询：南京", &records).await.unwrap();

        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(
            *covers.requested.lock(),
            vec!["https://img/a.jpg".to_string(), "https://img/c.png".to_string()]
        );
        let html = rendered_html(&browser);
        // only the first record got a cover
        assert_eq!(html.matches(r#"<div class="event-logo">"#).count(), 1);
        assert!(html.contains("data:image/jpeg;base64,QUJD"));
    }

    #[tokio::test]
    async fn test_list_without_imagery_skips_downloads() {
        let (renderer, _browser, covers) = renderer(DisplayMode::None);
        renderer
            .render_list("t", &[record("a", Some("https://img/a.jpg"))])
            .await
            .unwrap();
        assert!(covers.requested.lock().is_empty());
    }

    #[tokio::test]
    async fn test_detail_uses_detail_viewport_and_default_font() {
        let (renderer, browser, _covers) = renderer(DisplayMode::None);
        renderer
            .render_detail(&record("CP30", Some("https://img/cp.jpg")))
            .await
            .unwrap();

        let calls = browser.calls();
        assert!(matches!(calls[0], Call::Viewport(v) if v.width == 700 && v.height == 800));
        let html = rendered_html(&browser);
        assert!(html.contains(r#"<div class="logo-section">"#));
        assert!(!html.contains("@font-face"));
    }
}
