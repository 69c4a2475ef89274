//! Display Theme
//!
//! Fixed light and dark palettes for rendered cards, in the orange-yellow
//! house style of the convention site. The only axis of customisation is
//! light versus dark.

use crate::event::EventStatus;

/// Colour palette for one render
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayTheme {
    /// Whether this is the dark palette
    pub dark: bool,
    /// Page background
    pub background: &'static str,
    /// Card and container background (6-digit hex, alpha suffixes are appended)
    pub card_background: &'static str,
    /// Main text
    pub text_primary: &'static str,
    /// Labels and footers
    pub text_secondary: &'static str,
    /// Primary accent
    pub primary: &'static str,
    /// Secondary accent (header gradient end)
    pub secondary: &'static str,
    /// Participation badge and plugin footer
    pub accent: &'static str,
    /// Borders
    pub border: &'static str,
    /// Ongoing status
    pub ongoing: &'static str,
    /// Ended status
    pub ended: &'static str,
    /// Upcoming status
    pub upcoming: &'static str,
    /// Links
    pub link: &'static str,
    /// Translucent stat background
    pub stat_background: &'static str,

    // Secondary tones that differ between light and dark
    pub(crate) container_shadow: &'static str,
    pub(crate) title_shadow: &'static str,
    pub(crate) emboss_shadow: &'static str,
    pub(crate) keyword_background: &'static str,
    pub(crate) tag_background: &'static str,
    pub(crate) tag_border: &'static str,
    pub(crate) stat_box_background: &'static str,
    pub(crate) row_divider: &'static str,
    pub(crate) footer_background: &'static str,
    pub(crate) footer_source: &'static str,
    pub(crate) backdrop_fade: &'static str,
    pub(crate) backdrop_text_fade: &'static str,
    pub(crate) overlay_tint: &'static str,
    pub(crate) overlay_text_tint: &'static str,
    pub(crate) overlay_stat_background: &'static str,
    pub(crate) overlay_divider: &'static str,
}

impl DisplayTheme {
    /// Light palette
    pub const LIGHT: Self = Self {
        dark: false,
        background: "#f8f9fa",
        card_background: "#ffffff",
        text_primary: "#333333",
        text_secondary: "#888888",
        primary: "#f5a623",
        secondary: "#e8a000",
        accent: "#667eea",
        border: "#eaeaea",
        ongoing: "#f5a623",
        ended: "#cccccc",
        upcoming: "#4ecdc4",
        link: "#f5a623",
        stat_background: "rgba(245, 166, 35, 0.08)",
        container_shadow: "rgba(0,0,0,0.05)",
        title_shadow: "rgba(0,0,0,0.12)",
        emboss_shadow: "rgba(255,255,255,0.6)",
        keyword_background: "#f0f0f0",
        tag_background: "#fff3e0",
        tag_border: "#ffe0b2",
        stat_box_background: "#fafafa",
        row_divider: "#eee",
        footer_background: "#fafafa",
        footer_source: "#666",
        backdrop_fade: "rgba(255,255,255,0.1)",
        backdrop_text_fade: "rgba(255,255,255,0.15)",
        overlay_tint: "rgba(255,255,255,0.1)",
        overlay_text_tint: "rgba(255,255,255,0.2)",
        overlay_stat_background: "rgba(250,250,250,0.4)",
        overlay_divider: "rgba(0,0,0,0.05)",
    };

    /// Dark palette
    pub const DARK: Self = Self {
        dark: true,
        background: "#1a1a1a",
        card_background: "#252525",
        text_primary: "#ffffff",
        text_secondary: "#a0a0a0",
        primary: "#f5a623",
        secondary: "#e8a000",
        accent: "#667eea",
        border: "#3a3a3a",
        ongoing: "#f5a623",
        ended: "#666666",
        upcoming: "#4ecdc4",
        link: "#f5a623",
        stat_background: "rgba(245, 166, 35, 0.15)",
        container_shadow: "rgba(0,0,0,0.25)",
        title_shadow: "rgba(0,0,0,0.35)",
        emboss_shadow: "rgba(0,0,0,0.35)",
        keyword_background: "#444",
        tag_background: "#3a3a3a",
        tag_border: "#4a4a4a",
        stat_box_background: "#2a2a2a",
        row_divider: "#3a3a3a",
        footer_background: "#1f1f1f",
        footer_source: "#d0d0d0",
        backdrop_fade: "rgba(0,0,0,0.2)",
        backdrop_text_fade: "rgba(0,0,0,0.25)",
        overlay_tint: "rgba(0,0,0,0.15)",
        overlay_text_tint: "rgba(0,0,0,0.35)",
        overlay_stat_background: "rgba(42,42,42,0.4)",
        overlay_divider: "rgba(255,255,255,0.08)",
    };

    /// Pick the palette for the dark-mode flag
    #[must_use]
    pub fn select(dark: bool) -> &'static Self {
        if dark {
            &Self::DARK
        } else {
            &Self::LIGHT
        }
    }

    /// Badge colour for a status
    #[must_use]
    pub fn status_color(&self, status: EventStatus) -> &'static str {
        match status {
            EventStatus::Ongoing => self.ongoing,
            EventStatus::Upcoming => self.upcoming,
            EventStatus::Ended => self.ended,
        }
    }

    /// CSS custom properties for this palette, one declaration per line
    pub(crate) fn css_variables(&self) -> String {
        let card = self.card_background;
        let vars = [
            ("background", self.background.to_string()),
            ("card-bg", card.to_string()),
            ("card-bg-13", format!("{card}22")),
            ("card-bg-40", format!("{card}66")),
            ("card-bg-67", format!("{card}aa")),
            ("card-bg-87", format!("{card}dd")),
            ("text-primary", self.text_primary.to_string()),
            ("text-secondary", self.text_secondary.to_string()),
            ("primary", self.primary.to_string()),
            ("secondary", self.secondary.to_string()),
            ("accent", self.accent.to_string()),
            ("border", self.border.to_string()),
            ("ongoing", self.ongoing.to_string()),
            ("ended", self.ended.to_string()),
            ("upcoming", self.upcoming.to_string()),
            ("link", self.link.to_string()),
            ("stat-bg", self.stat_background.to_string()),
            ("container-shadow", self.container_shadow.to_string()),
            ("title-shadow", self.title_shadow.to_string()),
            ("emboss-shadow", self.emboss_shadow.to_string()),
            ("keyword-bg", self.keyword_background.to_string()),
            ("tag-bg", self.tag_background.to_string()),
            ("tag-border", self.tag_border.to_string()),
            ("stat-box-bg", self.stat_box_background.to_string()),
            ("row-divider", self.row_divider.to_string()),
            ("footer-bg", self.footer_background.to_string()),
            ("footer-source", self.footer_source.to_string()),
            ("backdrop-fade", self.backdrop_fade.to_string()),
            ("backdrop-text-fade", self.backdrop_text_fade.to_string()),
            ("overlay-tint", self.overlay_tint.to_string()),
            ("overlay-text-tint", self.overlay_text_tint.to_string()),
            ("overlay-stat-bg", self.overlay_stat_background.to_string()),
            ("overlay-divider", self.overlay_divider.to_string()),
            ("header-text", "white".to_string()),
            ("header-stat-label", "#666".to_string()),
        ];

        vars.iter()
            .map(|(name, value)| format!("  --{name}: {value};\n"))
            .collect()
    }
}

impl Default for DisplayTheme {
    fn default() -> Self {
        Self::LIGHT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select() {
        assert!(!DisplayTheme::select(false).dark);
        assert!(DisplayTheme::select(true).dark);
        assert_eq!(DisplayTheme::select(true).card_background, "#252525");
    }

    #[test]
    fn test_status_colors() {
        let light = DisplayTheme::LIGHT;
        assert_eq!(light.status_color(EventStatus::Ongoing), "#f5a623");
        assert_eq!(light.status_color(EventStatus::Upcoming), "#4ecdc4");
        assert_eq!(light.status_color(EventStatus::Ended), "#cccccc");
        assert_eq!(DisplayTheme::DARK.status_color(EventStatus::Ended), "#666666");
    }

    #[test]
    fn test_css_variables_carry_alpha_suffixes() {
        let vars = DisplayTheme::LIGHT.css_variables();
        assert!(vars.contains("--card-bg: #ffffff;"));
        assert!(vars.contains("--card-bg-67: #ffffffaa;"));
        assert!(vars.contains("--primary: #f5a623;"));

        let dark = DisplayTheme::DARK.css_variables();
        assert!(dark.contains("--footer-bg: #1f1f1f;"));
    }
}
