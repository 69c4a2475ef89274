//! Selection Cache
//!
//! Per-user ephemeral state that turns a one-shot query into a short
//! numbered-reply protocol: the bot lists results, the user answers with an
//! index, and the cached record is returned.
//!
//! # State Machine
//!
//! ```text
//!            start (replaces, aborts old timer)
//!     ┌──────────────────────────────┐
//!     │                              ▼
//!  ┌──┴────┐   "0" / valid index   ┌─────────┐
//!  │ Empty │◀──────────────────────│ Pending │──┐ invalid reply
//!  └───────┘   TTL fires (notice)  └─────────┘◀─┘ (entry untouched)
//! ```
//!
//! Entries are keyed by user id, not channel, so a selection started in
//! one conversation can be answered from another. At most one entry lives
//! per user; a new query replaces the old one silently.
//!
//! # Timers
//!
//! Each entry owns the `JoinHandle` of its expiry task and a generation
//! number. Every transition out of Pending aborts the handle, and a timer
//! that fires only removes the entry it was armed for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::event::EventRecord;

/// Default selection window for text results
pub const DEFAULT_TEXT_TTL: Duration = Duration::from_secs(15);
/// Default selection window for image results
pub const DEFAULT_IMAGE_TTL: Duration = Duration::from_secs(30);

/// Reply that cancels a pending selection
pub const CANCEL_REPLY: &str = "0";

/// Callback run when a selection expires unanswered
pub type ExpiryHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// How the result list was shown, and so how the detail is shown
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Presentation {
    Text,
    Image,
}

/// Selection windows per presentation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionTtl {
    pub text: Duration,
    pub image: Duration,
}

impl SelectionTtl {
    /// Window for a presentation
    #[must_use]
    pub fn for_presentation(&self, presentation: Presentation) -> Duration {
        match presentation {
            Presentation::Text => self.text,
            Presentation::Image => self.image,
        }
    }
}

impl Default for SelectionTtl {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_TTL,
            image: DEFAULT_IMAGE_TTL,
        }
    }
}

/// Result of feeding a message to the cache
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// No pending selection; the message is not for us
    NoEntry,
    /// User replied "0"; the entry is gone
    Canceled,
    /// Not a valid index; the entry is still pending
    Invalid,
    /// Valid index; the entry is gone
    Resolved {
        record: EventRecord,
        presentation: Presentation,
    },
}

struct Entry {
    records: Vec<EventRecord>,
    presentation: Presentation,
    generation: u64,
    timer: JoinHandle<()>,
}

struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    generation: AtomicU64,
    ttl: SelectionTtl,
}

/// Process-wide map of pending selections
#[derive(Clone)]
pub struct SelectionCache {
    inner: Arc<Inner>,
}

impl SelectionCache {
    #[must_use]
    pub fn new(ttl: SelectionTtl) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                ttl,
            }),
        }
    }

    /// Windows in use
    #[must_use]
    pub fn ttl(&self) -> SelectionTtl {
        self.inner.ttl
    }

    /// Start a selection for `user_id`, replacing any pending one.
    ///
    /// Must be called from within a tokio runtime. `on_expire` runs once if
    /// the window passes without a valid reply or cancel.
    pub fn start(
        &self,
        user_id: &str,
        records: Vec<EventRecord>,
        presentation: Presentation,
        on_expire: ExpiryHook,
    ) {
        let ttl = self.inner.ttl.for_presentation(presentation);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let count = records.len();

        let mut entries = self.inner.entries.lock();
        let timer = tokio::spawn(expire_after(
            Arc::downgrade(&self.inner),
            user_id.to_string(),
            generation,
            ttl,
            on_expire,
        ));

        let replaced = entries.insert(
            user_id.to_string(),
            Entry {
                records,
                presentation,
                generation,
                timer,
            },
        );
        drop(entries);

        if let Some(old) = replaced {
            old.timer.abort();
            tracing::debug!(user_id, "Replaced pending selection");
        }
        tracing::debug!(user_id, count, ?presentation, ?ttl, "Selection started");
    }

    /// Interpret `raw_text` as a reply to the user's pending selection
    pub fn resolve(&self, user_id: &str, raw_text: &str) -> Outcome {
        let text = raw_text.trim();
        let mut entries = self.inner.entries.lock();

        let Some(entry) = entries.get(user_id) else {
            return Outcome::NoEntry;
        };

        if text == CANCEL_REPLY {
            if let Some(entry) = entries.remove(user_id) {
                entry.timer.abort();
            }
            tracing::debug!(user_id, "Selection canceled");
            return Outcome::Canceled;
        }

        let Some(index) = parse_index(text, entry.records.len()) else {
            return Outcome::Invalid;
        };

        let Some(entry) = entries.remove(user_id) else {
            return Outcome::NoEntry;
        };
        drop(entries);
        entry.timer.abort();

        let presentation = entry.presentation;
        match entry.records.into_iter().nth(index - 1) {
            Some(record) => {
                tracing::debug!(user_id, index, "Selection resolved");
                Outcome::Resolved {
                    record,
                    presentation,
                }
            }
            None => Outcome::Invalid,
        }
    }

    /// Drop the user's pending selection without notice
    pub fn clear(&self, user_id: &str) -> bool {
        let removed = self.inner.entries.lock().remove(user_id);
        match removed {
            Some(entry) => {
                entry.timer.abort();
                tracing::debug!(user_id, "Selection cleared");
                true
            }
            None => false,
        }
    }

    /// Whether the user has a pending selection
    #[must_use]
    pub fn is_pending(&self, user_id: &str) -> bool {
        self.inner.entries.lock().contains_key(user_id)
    }

    /// Number of pending selections
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

impl Default for SelectionCache {
    fn default() -> Self {
        Self::new(SelectionTtl::default())
    }
}

/// 1-based index from the leading integer of `text`, within `1..=len`.
///
/// An optional sign followed by the longest run of ASCII digits is taken
/// and the rest ignored, so `"2号"` and `"1.5"` pick 2 and 1.
fn parse_index(text: &str, len: usize) -> Option<usize> {
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if negative || digits == 0 {
        return None;
    }
    rest[..digits]
        .parse::<usize>()
        .ok()
        .filter(|i| (1..=len).contains(i))
}

async fn expire_after(
    inner: Weak<Inner>,
    user_id: String,
    generation: u64,
    ttl: Duration,
    on_expire: ExpiryHook,
) {
    tokio::time::sleep(ttl).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };

    let expired = {
        let mut entries = inner.entries.lock();
        match entries.get(&user_id) {
            Some(entry) if entry.generation == generation => entries.remove(&user_id).is_some(),
            _ => false,
        }
    };
    drop(inner);

    if expired {
        tracing::info!(user_id = %user_id, ?ttl, "Selection expired");
        on_expire().await;
    }
}
