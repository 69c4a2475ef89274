//! Custom Font Resolution
//!
//! Turns the configured font path into an inlined `@font-face` rule so the
//! headless browser can use the font without file access. Every failure
//! (blank path, missing file, unreadable file) degrades to the default
//! platform font stack with a warning; nothing here returns an error.
//!
//! The resolver is called for every render and does not cache, so edits to
//! the configured path or the font file take effect on the next render.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, warn};

/// Platform font stack used when no custom font is available
pub const BASE_FONT_STACK: &str =
    r#"-apple-system, BlinkMacSystemFont, "Segoe UI", "Microsoft YaHei", "PingFang SC", sans-serif"#;

/// Family name the embedded font is registered under
pub const CUSTOM_FONT_FAMILY: &str = "ConRadarCustomFont";

/// Embedding format, chosen from the file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontFormat {
    /// `.otf`
    OpenType,
    /// `.woff2`
    Woff2,
    /// `.woff`
    Woff,
    /// Anything else
    TrueType,
}

impl FontFormat {
    /// Detect the format from a path's extension (case-insensitive)
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("otf") => Self::OpenType,
            Some("woff2") => Self::Woff2,
            Some("woff") => Self::Woff,
            _ => Self::TrueType,
        }
    }

    /// Value for the CSS `format()` hint
    #[must_use]
    pub fn css_format(&self) -> &'static str {
        match self {
            Self::OpenType => "opentype",
            Self::Woff2 => "woff2",
            Self::Woff => "woff",
            Self::TrueType => "truetype",
        }
    }

    /// MIME type for the data URI
    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Self::OpenType => "font/otf",
            Self::Woff2 => "font/woff2",
            Self::Woff => "font/woff",
            Self::TrueType => "font/ttf",
        }
    }
}

/// A successfully embedded custom font
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontConfig {
    /// Absolute path the font was read from
    pub path: PathBuf,
    /// Detected format
    pub format: FontFormat,
    /// Base64-encoded font bytes
    pub encoded: String,
    /// `@font-face` rule to place at the top of the stylesheet
    pub css: String,
    /// Family prefix to put ahead of [`BASE_FONT_STACK`]
    pub family_prefix: String,
}

/// CSS `font-family` value for an optional custom font
#[must_use]
pub fn font_family(font: Option<&FontConfig>) -> String {
    match font {
        Some(f) => format!("{}{BASE_FONT_STACK}", f.family_prefix),
        None => BASE_FONT_STACK.to_string(),
    }
}

/// Resolve the configured font path.
///
/// Returns `None` for a blank path, a missing file or a read error.
#[must_use]
pub fn resolve_font(raw_path: Option<&str>) -> Option<FontConfig> {
    let trimmed = raw_path.map(str::trim).filter(|p| !p.is_empty())?;

    let path = absolute(Path::new(trimmed));
    if !path.exists() {
        warn!(path = %path.display(), "Custom font not found, using default font stack");
        return None;
    }

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read custom font, using default font stack");
            return None;
        }
    };

    let format = FontFormat::from_path(&path);
    let encoded = STANDARD.encode(&bytes);
    let css = format!(
        "@font-face {{\n  font-family: '{CUSTOM_FONT_FAMILY}';\n  \
         src: url('data:{};base64,{encoded}') format('{}');\n  \
         font-weight: normal;\n  font-style: normal;\n}}\n",
        format.mime(),
        format.css_format(),
    );

    debug!(path = %path.display(), bytes = bytes.len(), ?format, "Embedded custom font");

    Some(FontConfig {
        path,
        format,
        encoded,
        css,
        family_prefix: format!("'{CUSTOM_FONT_FAMILY}', "),
    })
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_blank_path_means_default() {
        assert!(resolve_font(None).is_none());
        assert!(resolve_font(Some("")).is_none());
        assert!(resolve_font(Some("   ")).is_none());
    }

    #[test]
    fn test_missing_file_means_default() {
        let font = resolve_font(Some("/definitely/not/here/Font-Regular.ttf"));
        assert!(font.is_none());
        assert_eq!(font_family(font.as_ref()), BASE_FONT_STACK);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(FontFormat::from_path(Path::new("a.otf")), FontFormat::OpenType);
        assert_eq!(FontFormat::from_path(Path::new("a.WOFF2")), FontFormat::Woff2);
        assert_eq!(FontFormat::from_path(Path::new("a.woff")), FontFormat::Woff);
        assert_eq!(FontFormat::from_path(Path::new("a.ttf")), FontFormat::TrueType);
        assert_eq!(FontFormat::from_path(Path::new("font")), FontFormat::TrueType);
    }

    #[test]
    fn test_embeds_existing_font() {
        let mut file = tempfile::Builder::new().suffix(".woff2").tempfile().unwrap();
        file.write_all(b"wOF2fake").unwrap();

        let font = resolve_font(file.path().to_str()).unwrap();

        assert_eq!(font.format, FontFormat::Woff2);
        assert_eq!(font.encoded, STANDARD.encode(b"wOF2fake"));
        assert!(font.css.contains("data:font/woff2;base64,"));
        assert!(font.css.contains("format('woff2')"));
        assert!(font.css.contains(CUSTOM_FONT_FAMILY));
        assert_eq!(
            font_family(Some(&font)),
            format!("'{CUSTOM_FONT_FAMILY}', {BASE_FONT_STACK}")
        );
    }

    #[test]
    fn test_directory_read_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_font(dir.path().to_str()).is_none());
    }
}
