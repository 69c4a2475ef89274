//! Event Records
//!
//! Types for the convention records returned by the search service.
//!
//! # Wire Format
//!
//! The search service answers with camelCase JSON objects. Several fields
//! are loosely typed upstream: the interest counters may arrive as numbers
//! or strings, and `isOnline` is either a boolean or a free-text label.
//! Missing or `null` text fields deserialize to empty strings so that a
//! partially filled record still renders.
//!
//! Records are immutable once fetched. The only derived copy is the
//! keyword-annotated one produced by fan-out queries (see
//! [`EventRecord::with_keyword`]).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Status label the service uses for conventions that already took place
pub const STATUS_ENDED: &str = "已结束";
/// Status label the service uses for conventions that have not started
pub const STATUS_UPCOMING: &str = "未开始";
/// Status label shown for everything else
pub const STATUS_ONGOING: &str = "进行中";

/// Placeholder shown when a record has no tags
pub const TAG_PLACEHOLDER: &str = "-";

/// A counter sent either as a JSON number or as a string
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayValue {
    /// Integral number
    Integer(i64),
    /// Fractional number
    Float(f64),
    /// Any textual value, shown verbatim
    Text(String),
}

impl DisplayValue {
    /// Whether the value counts as "empty" for display purposes
    #[must_use]
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Integer(n) => *n == 0,
            Self::Float(f) => *f == 0.0 || f.is_nan(),
            Self::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Render a counter for display, defaulting to `0` when absent or falsy.
///
/// Counters are opaque display values; no arithmetic is performed on them.
#[must_use]
pub fn counter_text(value: Option<&DisplayValue>) -> String {
    match value {
        Some(v) if !v.is_falsy() => v.to_string(),
        _ => "0".to_string(),
    }
}

/// How a convention can be attended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Participation {
    /// `true` means online, `false` offline
    Flag(bool),
    /// Free-text label used verbatim
    Label(String),
}

impl Participation {
    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Flag(true) => "线上",
            Self::Flag(false) => "线下",
            Self::Label(s) => s,
        }
    }
}

/// Convention status derived from the free-text status label
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventStatus {
    /// Currently running (also the fallback for unknown labels)
    Ongoing,
    /// Not started yet
    Upcoming,
    /// Already over
    Ended,
}

impl EventStatus {
    /// Map a status label to a status.
    ///
    /// Only the two exact labels are recognised; anything else, including
    /// an empty string, is treated as ongoing.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            STATUS_ENDED => Self::Ended,
            STATUS_UPCOMING => Self::Upcoming,
            _ => Self::Ongoing,
        }
    }

    /// Badge text
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ongoing => STATUS_ONGOING,
            Self::Upcoming => STATUS_UPCOMING,
            Self::Ended => STATUS_ENDED,
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One convention as returned by the search service
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventRecord {
    /// Convention name
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    /// Venue label
    #[serde(deserialize_with = "nullable")]
    pub location: String,
    /// Street address
    #[serde(deserialize_with = "nullable")]
    pub address: String,
    /// Free-text time range
    #[serde(deserialize_with = "nullable")]
    pub time: String,
    /// Delimiter-separated tags
    #[serde(deserialize_with = "nullable")]
    pub tag: String,
    /// Status label ("已结束", "未开始", or anything else)
    #[serde(deserialize_with = "nullable")]
    pub ended: String,
    /// Number of users who want to go
    pub wanna_go_count: Option<DisplayValue>,
    /// Number of participating circles
    pub circle_count: Option<DisplayValue>,
    /// Number of fan works
    pub doujinshi_count: Option<DisplayValue>,
    /// Canonical page
    #[serde(deserialize_with = "nullable")]
    pub url: String,
    /// Online/offline flag or label
    pub is_online: Option<Participation>,
    /// Cover image
    pub app_logo_pic_url: Option<String>,
    /// Subscription keyword that produced this record (fan-out only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl EventRecord {
    /// Copy of this record annotated with the keyword that found it
    #[must_use]
    pub fn with_keyword(&self, keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..self.clone()
        }
    }

    /// Derived status
    #[must_use]
    pub fn status(&self) -> EventStatus {
        EventStatus::from_label(&self.ended)
    }

    /// Participation label; a missing flag reads as offline
    #[must_use]
    pub fn participation(&self) -> &str {
        self.is_online.as_ref().map_or("线下", Participation::label)
    }

    /// Cover URL if one is present and non-empty
    #[must_use]
    pub fn cover_url(&self) -> Option<&str> {
        self.app_logo_pic_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Individual tags (see [`split_tags`])
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        split_tags(&self.tag)
    }

    /// Plain-text detail view used by text mode and as the image fallback
    #[must_use]
    pub fn detail_text(&self) -> String {
        let status = if self.ended.is_empty() {
            "未知"
        } else {
            self.ended.as_str()
        };
        format!(
            "漫展名称: \t{}\n地点: \t{}\n地址: \t{}\n时间: \t{}\n标签: \t{}\n状态: \t{}\n\
             想去人数: \t{}\n社团数: \t{}\n同人作数: \t{}\n链接: \t{}\n参与方式: \t{}",
            self.name,
            self.location,
            self.address,
            self.time,
            self.tag,
            status,
            counter_text(self.wanna_go_count.as_ref()),
            counter_text(self.circle_count.as_ref()),
            counter_text(self.doujinshi_count.as_ref()),
            self.url,
            self.participation(),
        )
    }
}

fn is_tag_delimiter(c: char) -> bool {
    matches!(c, '|' | ',' | '，' | '、') || c.is_whitespace()
}

/// Split a tag field into individual tags.
///
/// Delimiters are `|`, `,`, `，`, `、` and any whitespace; runs of delimiters
/// collapse and empty pieces are dropped. Callers render a single
/// [`TAG_PLACEHOLDER`] chip when the result is empty.
#[must_use]
pub fn split_tags(raw: &str) -> Vec<&str> {
    raw.split(is_tag_delimiter)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_tags_mixed_delimiters() {
        assert_eq!(split_tags("A|B，C、D E"), vec!["A", "B", "C", "D", "E"]);
        assert_eq!(split_tags("x,,y |  z"), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_split_tags_empty() {
        assert!(split_tags("").is_empty());
        assert!(split_tags("   \t ").is_empty());
        assert!(split_tags("|，、").is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(EventStatus::from_label("已结束"), EventStatus::Ended);
        assert_eq!(EventStatus::from_label("未开始"), EventStatus::Upcoming);
        assert_eq!(EventStatus::from_label("进行中"), EventStatus::Ongoing);
        assert_eq!(EventStatus::from_label(""), EventStatus::Ongoing);
        assert_eq!(EventStatus::from_label("whatever"), EventStatus::Ongoing);
    }

    #[test]
    fn test_counter_text_defaults_to_zero() {
        assert_eq!(counter_text(None), "0");
        assert_eq!(counter_text(Some(&DisplayValue::Integer(0))), "0");
        assert_eq!(counter_text(Some(&DisplayValue::Text(String::new()))), "0");
        assert_eq!(counter_text(Some(&DisplayValue::Integer(42))), "42");
        assert_eq!(
            counter_text(Some(&DisplayValue::Text("1.2k".to_string()))),
            "1.2k"
        );
    }

    #[test]
    fn test_deserialize_loose_record() {
        let json = r#"{
            "name": "CP30",
            "location": null,
            "address": "上海",
            "wannaGoCount": "120",
            "circleCount": 35,
            "isOnline": true,
            "appLogoPicUrl": "https://img.example/cp30.jpg"
        }"#;
        let record: EventRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.name, "CP30");
        assert_eq!(record.location, "");
        assert_eq!(record.tag, "");
        assert_eq!(
            record.wanna_go_count,
            Some(DisplayValue::Text("120".to_string()))
        );
        assert_eq!(record.circle_count, Some(DisplayValue::Integer(35)));
        assert_eq!(record.doujinshi_count, None);
        assert_eq!(record.participation(), "线上");
        assert_eq!(record.cover_url(), Some("https://img.example/cp30.jpg"));
        assert!(record.keyword.is_none());
    }

    #[test]
    fn test_participation_labels() {
        let mut record = EventRecord::default();
        assert_eq!(record.participation(), "线下");

        record.is_online = Some(Participation::Flag(false));
        assert_eq!(record.participation(), "线下");

        record.is_online = Some(Participation::Label("线上+线下".to_string()));
        assert_eq!(record.participation(), "线上+线下");
    }

    #[test]
    fn test_with_keyword_leaves_original_untouched() {
        let record = EventRecord {
            name: "南京漫展".to_string(),
            ..Default::default()
        };
        let tagged = record.with_keyword("南京");

        assert_eq!(tagged.keyword.as_deref(), Some("南京"));
        assert_eq!(tagged.name, record.name);
        assert!(record.keyword.is_none());
    }

    #[test]
    fn test_detail_text() {
        let record = EventRecord {
            name: "CP30".to_string(),
            location: "国家会展中心".to_string(),
            ended: String::new(),
            wanna_go_count: Some(DisplayValue::Integer(7)),
            url: "https://www.allcpp.cn/allcpp/event/event.do?event=1".to_string(),
            ..Default::default()
        };
        let text = record.detail_text();

        assert!(text.starts_with("漫展名称: \tCP30\n地点: \t国家会展中心\n"));
        assert!(text.contains("状态: \t未知\n"));
        assert!(text.contains("想去人数: \t7\n"));
        assert!(text.contains("社团数: \t0\n"));
        assert!(text.ends_with("参与方式: \t线下"));
    }

    #[test]
    fn test_blank_cover_url_is_absent() {
        let record = EventRecord {
            app_logo_pic_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(record.cover_url(), None);
    }
}
