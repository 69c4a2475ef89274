//! Display modes and their per-mode styling strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How cover imagery is placed inside a list card
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// No imagery
    None,
    /// 100×75 thumbnail beside the text
    Compact,
    /// Cover fills the left 60% of the card and fades into the background
    #[default]
    Gradient,
    /// Full-width backdrop of the cover plus its mirror image
    FlipHorizontal,
    /// Mirrored backdrop, blurred, with text across the whole card
    FullBlurBgText,
}

/// Where the cover goes for a given mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Imagery {
    /// Card has no image
    Hidden,
    /// Small image inside the content row
    Thumbnail,
    /// Absolutely positioned backdrop behind the content
    Backdrop {
        /// Add a horizontally flipped copy next to the original
        mirrored: bool,
    },
}

/// Styling data for one display mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ModeStrategy {
    pub imagery: Imagery,
    /// Extra classes on `.event-card`
    pub card_classes: &'static str,
    /// Extra classes on `.event-bg-gradient`
    pub backdrop_classes: &'static str,
}

impl ModeStrategy {
    /// Strategy used for a card whose cover is unavailable
    pub(crate) const PLAIN: Self = Self {
        imagery: Imagery::Hidden,
        card_classes: "",
        backdrop_classes: "",
    };
}

const STRATEGIES: [(DisplayMode, ModeStrategy); 5] = [
    (DisplayMode::None, ModeStrategy::PLAIN),
    (
        DisplayMode::Compact,
        ModeStrategy {
            imagery: Imagery::Thumbnail,
            card_classes: "",
            backdrop_classes: "",
        },
    ),
    (
        DisplayMode::Gradient,
        ModeStrategy {
            imagery: Imagery::Backdrop { mirrored: false },
            card_classes: " has-gradient-bg",
            backdrop_classes: "",
        },
    ),
    (
        DisplayMode::FlipHorizontal,
        ModeStrategy {
            imagery: Imagery::Backdrop { mirrored: true },
            card_classes: " has-gradient-bg",
            backdrop_classes: " is-full",
        },
    ),
    (
        DisplayMode::FullBlurBgText,
        ModeStrategy {
            imagery: Imagery::Backdrop { mirrored: true },
            card_classes: " has-gradient-bg has-gradient-full-text",
            backdrop_classes: " is-full is-full-text",
        },
    ),
];

impl DisplayMode {
    /// Every mode, in configuration order
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Compact,
        Self::Gradient,
        Self::FlipHorizontal,
        Self::FullBlurBgText,
    ];

    /// Configuration name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Compact => "compact",
            Self::Gradient => "gradient",
            Self::FlipHorizontal => "flip-horizontal",
            Self::FullBlurBgText => "full-blur-bg-text",
        }
    }

    /// Whether this mode shows covers at all
    #[must_use]
    pub fn wants_cover(&self) -> bool {
        self.strategy().imagery != Imagery::Hidden
    }

    pub(crate) fn strategy(&self) -> &'static ModeStrategy {
        STRATEGIES
            .iter()
            .find(|(mode, _)| mode == self)
            .map_or(&ModeStrategy::PLAIN, |(_, s)| s)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised display mode name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown display mode '{0}' (expected none, compact, gradient, flip-horizontal or full-blur-bg-text)")]
pub struct ParseDisplayModeError(pub String);

impl FromStr for DisplayMode {
    type Err = ParseDisplayModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ParseDisplayModeError(s.to_string()))
    }
}
