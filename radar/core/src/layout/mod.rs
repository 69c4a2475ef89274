//! Layout Composer
//!
//! Pure transformation from event records to complete HTML documents ready
//! for rasterization. Nothing in this module performs I/O: cover images,
//! the resolved font and the generation timestamp are all handed in by the
//! caller, so the same inputs always produce the same markup.
//!
//! # Pages
//!
//! - **List page**: header band with the title and aggregate status counts,
//!   one numbered card per record, attribution footer. Cover imagery is
//!   controlled by [`DisplayMode`].
//! - **Detail page**: one record with a full-width cover on top, badges,
//!   info rows, counters and the canonical link.
//!
//! Colours come from [`DisplayTheme`] as CSS custom properties; the static
//! stylesheets only reference `var(--…)` names.

mod card;
mod mode;

pub use mode::{DisplayMode, ParseDisplayModeError};

use chrono::{DateTime, TimeZone};

use crate::event::{EventRecord, EventStatus};
use crate::font::{font_family, FontConfig};
use crate::theme::DisplayTheme;

const LIST_CSS: &str = include_str!("list.css");
const DETAIL_CSS: &str = include_str!("detail.css");

/// Data source line in every footer
pub const FOOTER_SOURCE: &str = "数据来源：https://www.allcpp.cn 无差别同人站";
/// Attribution line in every footer
pub const FOOTER_GENERATOR: &str = "generated by con-radar";

/// Footer timestamp format (`YYYY/MM/DD HH:MM:SS`)
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Format a generation time for the footer
#[must_use]
pub fn format_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Widths for a page, in CSS pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSize {
    /// Max width of the main container
    pub container_width: u32,
    /// Body width, also the browser viewport width
    pub viewport_width: u32,
}

impl PageSize {
    /// Result list
    pub const LIST: Self = Self {
        container_width: 800,
        viewport_width: 900,
    };

    /// Single record
    pub const DETAIL: Self = Self {
        container_width: 600,
        viewport_width: 700,
    };
}

/// A composed HTML document and the viewport it is laid out for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedPage {
    pub html: String,
    pub size: PageSize,
}

/// Aggregate status counts shown in the list header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub ongoing: usize,
    pub upcoming: usize,
    pub ended: usize,
}

impl StatusCounts {
    /// Count records by derived status
    #[must_use]
    pub fn tally(records: &[EventRecord]) -> Self {
        records.iter().fold(
            Self {
                total: records.len(),
                ..Self::default()
            },
            |mut acc, r| {
                match r.status() {
                    EventStatus::Ongoing => acc.ongoing += 1,
                    EventStatus::Upcoming => acc.upcoming += 1,
                    EventStatus::Ended => acc.ended += 1,
                }
                acc
            },
        )
    }
}

/// Escape text for interpolation into HTML content and attribute values
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Composes list and detail pages for one theme, font and timestamp
#[derive(Clone, Debug)]
pub struct LayoutComposer {
    theme: DisplayTheme,
    font: Option<FontConfig>,
    generated_at: String,
}

impl LayoutComposer {
    /// Create a composer; `generated_at` is printed verbatim in the footer
    #[must_use]
    pub fn new(
        theme: DisplayTheme,
        font: Option<FontConfig>,
        generated_at: impl Into<String>,
    ) -> Self {
        Self {
            theme,
            font,
            generated_at: generated_at.into(),
        }
    }

    /// Palette in use
    #[must_use]
    pub fn theme(&self) -> &DisplayTheme {
        &self.theme
    }

    fn stylesheet(&self, size: PageSize, body_css: &str) -> String {
        let font_face = self.font.as_ref().map_or("", |f| f.css.as_str());
        format!(
            "{font_face}:root {{\n{vars}  --font-family: {family};\n  --viewport-width: {vw}px;\n  --container-width: {cw}px;\n}}\n{body_css}",
            vars = self.theme.css_variables(),
            family = font_family(self.font.as_ref()),
            vw = size.viewport_width,
            cw = size.container_width,
        )
    }

    fn footer(&self) -> String {
        format!(
            r#"<div class="footer"><span class="footer-timestamp">{}</span><span class="footer-source">{FOOTER_SOURCE}</span><span class="footer-plugin">{FOOTER_GENERATOR}</span></div>"#,
            escape_html(&self.generated_at)
        )
    }

    fn document(&self, size: PageSize, css: &str, body: String) -> ComposedPage {
        let html = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<style>\n{}</style>\n</head>\n<body>\n<div class=\"main-container\">{body}{}</div>\n</body>\n</html>\n",
            self.stylesheet(size, css),
            self.footer(),
        );
        ComposedPage { html, size }
    }

    /// Compose the result list.
    ///
    /// `covers[i]` is the base64 cover of `records[i]`; missing or `None`
    /// entries render that card without imagery.
    #[must_use]
    pub fn compose_list(
        &self,
        title: &str,
        records: &[EventRecord],
        covers: &[Option<String>],
        mode: DisplayMode,
    ) -> ComposedPage {
        let counts = StatusCounts::tally(records);
        let strategy = mode.strategy();

        let stats: String = [
            ("共计", counts.total),
            ("进行中", counts.ongoing),
            ("未开始", counts.upcoming),
            ("已结束", counts.ended),
        ]
        .iter()
        .map(|(label, n)| {
            format!(
                r#"<div class="header-stat"><span class="header-stat-label">{label}</span><span class="header-stat-value">{n}</span></div>"#
            )
        })
        .collect();

        let cards: String = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let cover = covers.get(i).and_then(|c| c.as_deref());
                card::list_card(record, i + 1, cover, strategy, &self.theme)
            })
            .collect();

        let body = format!(
            r#"<div class="header"><div class="title">🎉 {}</div><div class="stats-row">{stats}</div></div><div class="events-container">{cards}</div>"#,
            escape_html(title)
        );
        self.document(PageSize::LIST, LIST_CSS, body)
    }

    /// Compose the detail page for one record
    #[must_use]
    pub fn compose_detail(&self, record: &EventRecord, cover: Option<&str>) -> ComposedPage {
        let logo = cover.map_or_else(String::new, |c| {
            format!(
                r#"<div class="logo-section"><img src="data:image/jpeg;base64,{c}" alt="封面" /></div>"#
            )
        });
        let url = escape_html(&record.url);

        let body = format!(
            r#"<div class="header"><div class="page-title">🎉 漫展详情</div><div class="page-subtitle">详细信息</div></div><div class="content">{logo}<div class="badges">{badges}</div><div class="event-title">{name}</div><div class="info-list">{rows}</div><div class="stats-section">{stats}</div><div class="link-section"><a class="link-url" href="{url}">{url}</a></div></div>"#,
            badges = card::badges(record, &self.theme),
            name = escape_html(&record.name),
            rows = card::info_rows(record),
            stats = card::stat_boxes(record),
        );
        self.document(PageSize::DETAIL, DETAIL_CSS, body)
    }
}
