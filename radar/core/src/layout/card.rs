//! Markup fragments shared by the list and detail pages.

use super::escape_html;
use super::mode::{Imagery, ModeStrategy};
use crate::event::{counter_text, EventRecord, TAG_PLACEHOLDER};
use crate::theme::DisplayTheme;

fn cover_src(cover: &str) -> String {
    format!("data:image/jpeg;base64,{cover}")
}

fn or_dash(value: &str) -> String {
    if value.is_empty() {
        TAG_PLACEHOLDER.to_string()
    } else {
        escape_html(value)
    }
}

/// Status, participation and optional keyword badges
pub(crate) fn badges(record: &EventRecord, theme: &DisplayTheme) -> String {
    let status = record.status();
    let mut html = format!(
        r#"<span class="status-badge" style="background: {};">{}</span><span class="online-badge">{}</span>"#,
        theme.status_color(status),
        status.label(),
        escape_html(record.participation()),
    );
    if let Some(keyword) = record.keyword.as_deref() {
        html.push_str(&format!(
            r#"<span class="keyword-badge">🔖 {}</span>"#,
            escape_html(keyword)
        ));
    }
    html
}

/// Tag chips, or the single placeholder chip when there are no tags
pub(crate) fn tag_chips(record: &EventRecord) -> String {
    let tags = record.tags();
    if tags.is_empty() {
        return format!(r#"<span class="tag-empty">{TAG_PLACEHOLDER}</span>"#);
    }
    tags.into_iter()
        .map(|t| format!(r#"<span class="tag-item">{}</span>"#, escape_html(t)))
        .collect()
}

fn info_row(icon: &str, label: &str, value_class: &str, value: &str) -> String {
    format!(
        r#"<div class="info-row"><span class="info-icon">{icon}</span><span class="info-label">{label}</span><span class="{value_class}">{value}</span></div>"#
    )
}

/// Venue, address, time and tag rows
pub(crate) fn info_rows(record: &EventRecord) -> String {
    [
        info_row("📍", "地点", "info-value", &or_dash(&record.location)),
        info_row("📮", "地址", "info-value", &or_dash(&record.address)),
        info_row("📅", "时间", "info-value", &or_dash(&record.time)),
        info_row("🏷️", "标签", "info-value tags-container", &tag_chips(record)),
    ]
    .concat()
}

/// The three counter boxes
pub(crate) fn stat_boxes(record: &EventRecord) -> String {
    [
        (counter_text(record.wanna_go_count.as_ref()), "❤️ 想去"),
        (counter_text(record.circle_count.as_ref()), "🏠 社团"),
        (counter_text(record.doujinshi_count.as_ref()), "📚 同人作"),
    ]
    .iter()
    .map(|(num, label)| {
        format!(
            r#"<div class="stat-box"><span class="stat-num">{}</span><span class="stat-text">{label}</span></div>"#,
            escape_html(num)
        )
    })
    .collect()
}

fn backdrop(cover: &str, mirrored: bool, classes: &str) -> String {
    let src = cover_src(cover);
    let mut images = format!(r#"<img class="img-orig" src="{src}" alt="封面" />"#);
    if mirrored {
        images.push_str(&format!(r#"<img class="img-mirror" src="{src}" alt="封面" />"#));
    }
    format!(
        r#"<div class="event-bg-gradient{classes}"><div class="bg-layer img-clear">{images}</div><div class="bg-layer img-blur">{images}</div></div>"#
    )
}

/// One card of the list page.
///
/// `index` is the 1-based number the user replies with. A mode that wants
/// imagery but has no cover renders the card without imagery.
pub(crate) fn list_card(
    record: &EventRecord,
    index: usize,
    cover: Option<&str>,
    strategy: &ModeStrategy,
    theme: &DisplayTheme,
) -> String {
    let strategy = match cover {
        Some(_) => strategy,
        None => &ModeStrategy::PLAIN,
    };

    let mut thumbnail = String::new();
    let mut background = String::new();
    if let Some(cover) = cover {
        match strategy.imagery {
            Imagery::Hidden => {}
            Imagery::Thumbnail => {
                thumbnail = format!(
                    r#"<div class="event-logo"><img src="{}" alt="封面" /></div>"#,
                    cover_src(cover)
                );
            }
            Imagery::Backdrop { mirrored } => {
                background = backdrop(cover, mirrored, strategy.backdrop_classes);
            }
        }
    }

    format!(
        r#"<div class="event-card{card_classes}" style="border-left-color: {status_color};">{background}<div class="event-main">{thumbnail}<div class="event-content"><div class="event-header"><span class="event-index">{index}</span>{badges}</div><div class="event-title">{name}</div><div class="info-list">{rows}</div><div class="event-stats">{stats}</div></div></div></div>"#,
        card_classes = strategy.card_classes,
        status_color = theme.status_color(record.status()),
        badges = badges(record, theme),
        name = escape_html(&record.name),
        rows = info_rows(record),
        stats = stat_boxes(record),
    )
}
