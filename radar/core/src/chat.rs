//! Chat Transport
//!
//! The bot talks to users through [`ChatSession`], one session per inbound
//! message. A session knows who sent the message and where, and can send
//! replies, delete messages, and wait for the same user's next message.
//!
//! Outgoing messages are a flat list of [`Segment`]s so transports can map
//! quotes, text, and images onto whatever their platform supports.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

/// Transport failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The platform rejected the operation
    #[error("chat operation failed: {0}")]
    Failed(String),

    /// The transport cannot do this at all
    #[error("not supported by this transport: {0}")]
    Unsupported(&'static str),
}

/// The message a session was created for
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    pub channel_id: String,
    /// Set for group conversations, absent for direct messages
    pub guild_id: Option<String>,
    pub message_id: Option<String>,
    pub content: String,
}

impl InboundMessage {
    /// Subscription scope: the channel in groups, `private:<user>` in
    /// direct messages
    #[must_use]
    pub fn channel_key(&self) -> String {
        match self.guild_id {
            Some(_) => self.channel_id.clone(),
            None => format!("private:{}", self.user_id),
        }
    }
}

/// One piece of an outgoing message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Reply-to reference
    Quote(String),
    Text(String),
    /// `data:` URI
    Image(String),
}

/// Outgoing message builder
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    segments: Vec<Segment>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text message
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new().with_text(text)
    }

    /// Quote `message_id` when `enabled` and an id is known
    #[must_use]
    pub fn quoting(enabled: bool, message_id: Option<&str>) -> Self {
        let mut message = Self::new();
        if let (true, Some(id)) = (enabled, message_id) {
            message.segments.push(Segment::Quote(id.to_string()));
        }
        message
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.segments.push(Segment::Text(text.into()));
        self
    }

    #[must_use]
    pub fn with_image(mut self, data_uri: impl Into<String>) -> Self {
        self.segments.push(Segment::Image(data_uri.into()));
        self
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Concatenated text segments
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Whether the message quotes another
    #[must_use]
    pub fn is_quoted(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Quote(_)))
    }

    #[must_use]
    pub fn image_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Image(_)))
            .count()
    }
}

/// One inbound message and the means to answer it
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// The message this session answers
    fn message(&self) -> &InboundMessage;

    /// Send a message, returning the ids of what was posted
    async fn send(&self, message: OutgoingMessage) -> Result<Vec<String>, TransportError>;

    /// Delete a previously sent message
    async fn delete_message(&self, message_id: &str) -> Result<(), TransportError>;

    /// Wait for the same user's next message in this conversation
    async fn prompt(&self, timeout: Duration) -> Option<String>;
}

/// Await a cosmetic side effect and discard its failure.
///
/// Used for things whose failure must not change what the user sees next,
/// such as deleting a "please wait" notice. Failures are logged at debug.
pub async fn fire_and_ignore<F, T, E>(action: &str, effect: F)
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    if let Err(e) = effect.await {
        tracing::debug!(action, error = %e, "Ignoring failed cosmetic action");
    }
}

/// Guess an image MIME type from magic bytes, defaulting to JPEG
#[must_use]
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/jpeg",
    }
}

/// `data:` URI for raw image bytes
#[must_use]
pub fn image_data_uri(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_image_mime(bytes), STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_key() {
        let mut message = InboundMessage {
            user_id: "42".to_string(),
            channel_id: "group-7".to_string(),
            guild_id: Some("guild-1".to_string()),
            ..Default::default()
        };
        assert_eq!(message.channel_key(), "group-7");

        message.guild_id = None;
        assert_eq!(message.channel_key(), "private:42");
    }

    #[test]
    fn test_builder() {
        let message = OutgoingMessage::quoting(true, Some("m1"))
            .with_image("data:image/png;base64,AAAA")
            .with_text("\n请输入序号");
        assert!(message.is_quoted());
        assert_eq!(message.image_count(), 1);
        assert_eq!(message.plain_text(), "\n请输入序号");

        assert!(!OutgoingMessage::quoting(false, Some("m1")).is_quoted());
        assert!(!OutgoingMessage::quoting(true, None).is_quoted());
    }

    #[test]
    fn test_sniff_image_mime() {
        assert_eq!(sniff_image_mime(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(sniff_image_mime(b"GIF89a"), "image/gif");
        assert_eq!(sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_image_mime(b"\xff\xd8\xff"), "image/jpeg");
        assert_eq!(image_data_uri(b"ABC"), "data:image/jpeg;base64,QUJD");
    }

    #[tokio::test]
    async fn test_fire_and_ignore_swallows_errors() {
        fire_and_ignore("delete notice", async {
            Err::<(), _>(TransportError::Unsupported("delete"))
        })
        .await;
        fire_and_ignore("noop", async { Ok::<_, TransportError>(()) }).await;
    }
}
