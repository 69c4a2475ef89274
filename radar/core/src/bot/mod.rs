//! Convention Bot
//!
//! Routes each inbound message through the command parser and then the
//! selection interceptor, and drives the query, render and subscription flows.
//!
//! # Message Flow
//!
//! ```text
//! inbound ──▶ command parser ──(not a command)──▶ selection interceptor
//!                  │                                     │
//!                  ▼                                     ▼
//!       query, render, subscribe            cancel / invalid / detail
//! ```
//!
//! Commands run even while a selection is pending. The query commands
//! replace the pending entry; everything else leaves it alone.

pub mod messages;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::chat::{fire_and_ignore, image_data_uri, ChatSession, OutgoingMessage};
use crate::command::{Command, CommandError, CommandParser};
use crate::config::RadarConfig;
use crate::event::EventRecord;
use crate::query::{BatchOutcome, QueryOrchestrator};
use crate::render::EventRenderer;
use crate::search::CoverSource;
use crate::selection::{ExpiryHook, Outcome, Presentation, SelectionCache};
use crate::subscription::Subscription;

/// How long `取消订阅` without a keyword waits for confirmation
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// What the bot did with a message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handled {
    /// Consumed by a pending selection
    Selection,
    /// Ran a command
    Command(Command),
    /// Not for the bot
    Ignored,
}

/// Reply behaviour and feature gates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BotOptions {
    pub add_quote: bool,
    pub enable_image_query: bool,
    pub enable_image_batch_query: bool,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            add_quote: true,
            enable_image_query: false,
            enable_image_batch_query: false,
        }
    }
}

impl From<&RadarConfig> for BotOptions {
    fn from(config: &RadarConfig) -> Self {
        Self {
            add_quote: config.add_quote,
            enable_image_query: config.enable_image_query,
            enable_image_batch_query: config.enable_image_batch_query,
        }
    }
}

/// The chat-facing bot
pub struct ConventionBot {
    options: BotOptions,
    orchestrator: QueryOrchestrator,
    selections: SelectionCache,
    covers: Arc<dyn CoverSource>,
    /// Absent when no browser is configured or reachable
    renderer: Option<Arc<EventRenderer>>,
}

impl ConventionBot {
    #[must_use]
    pub fn new(
        options: BotOptions,
        orchestrator: QueryOrchestrator,
        selections: SelectionCache,
        covers: Arc<dyn CoverSource>,
    ) -> Self {
        Self {
            options,
            orchestrator,
            selections,
            covers,
            renderer: None,
        }
    }

    /// Enable image rendering
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<EventRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn options(&self) -> BotOptions {
        self.options
    }

    #[must_use]
    pub fn selections(&self) -> &SelectionCache {
        &self.selections
    }

    #[must_use]
    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    /// Handle one inbound message
    pub async fn handle(&self, session: Arc<dyn ChatSession>) -> Handled {
        let message = session.message();
        let user_id = message.user_id.clone();

        match CommandParser::parse(&message.content) {
            Ok(Some(command)) if self.is_enabled(&command) => {
                tracing::info!(user_id = %user_id, command = command.name(), "Running command");
                self.run(&session, &command).await;
                return Handled::Command(command);
            }
            Ok(Some(command)) => {
                tracing::debug!(command = command.name(), "Command disabled, ignoring");
            }
            Ok(None) => {}
            Err(CommandError::UnknownSubcommand(sub)) => {
                tracing::debug!(user_id = %user_id, subcommand = %sub, "Unknown subcommand");
                self.send(&*session, OutgoingMessage::text(self.help())).await;
                return Handled::Command(Command::Help);
            }
        }

        match self.selections.resolve(&user_id, &message.content) {
            Outcome::NoEntry => Handled::Ignored,
            Outcome::Canceled => {
                self.send(&*session, OutgoingMessage::text(messages::SELECTION_CANCELED))
                    .await;
                Handled::Selection
            }
            Outcome::Invalid => {
                self.send(&*session, OutgoingMessage::text(messages::SELECTION_INVALID))
                    .await;
                Handled::Selection
            }
            Outcome::Resolved {
                record,
                presentation,
            } => {
                tracing::info!(user_id = %user_id, name = %record.name, ?presentation, "Showing detail");
                self.show_detail(&*session, &record, presentation).await;
                Handled::Selection
            }
        }
    }

    fn is_enabled(&self, command: &Command) -> bool {
        match command {
            Command::ImageQuery { .. } => self.options.enable_image_query,
            Command::ImageBatchQuery => self.options.enable_image_batch_query,
            _ => true,
        }
    }

    fn help(&self) -> String {
        messages::help(
            self.options.enable_image_query,
            self.options.enable_image_batch_query,
        )
    }

    async fn run(&self, session: &Arc<dyn ChatSession>, command: &Command) {
        match command {
            Command::Query { keyword } => self.text_query(session, non_blank(keyword)).await,
            Command::ImageQuery { keyword } => self.image_query(session, non_blank(keyword)).await,
            Command::BatchQuery => self.batch_query(session).await,
            Command::ImageBatchQuery => self.image_batch_query(session).await,
            Command::Subscribe { keyword } => self.subscribe(&**session, non_blank(keyword)).await,
            Command::Unsubscribe { keyword } => {
                self.unsubscribe(&**session, non_blank(keyword)).await;
            }
            Command::ListSubscriptions => self.list_subscriptions(&**session).await,
            Command::Help => self.send(&**session, OutgoingMessage::text(self.help())).await,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    async fn text_query(&self, session: &Arc<dyn ChatSession>, keyword: Option<&str>) {
        let Some(keyword) = keyword else {
            self.send(&**session, OutgoingMessage::text(messages::QUERY_USAGE))
                .await;
            return;
        };

        let user_id = session.message().user_id.clone();
        self.selections.clear(&user_id);

        let records = match self.orchestrator.search(keyword).await {
            Ok(records) if records.is_empty() => {
                self.send(&**session, OutgoingMessage::text(messages::NOT_FOUND))
                    .await;
                return;
            }
            Ok(records) => records,
            Err(e) => {
                tracing::error!(keyword, error = %e, "Query failed");
                self.send(&**session, OutgoingMessage::text(messages::QUERY_FAILED))
                    .await;
                return;
            }
        };

        let list = self.quoted(&**session).with_text(messages::text_list(&records));
        self.selections.start(
            &user_id,
            records,
            Presentation::Text,
            timeout_notice(Arc::clone(session)),
        );
        self.send(&**session, list).await;
    }

    async fn batch_query(&self, session: &Arc<dyn ChatSession>) {
        let message = session.message();
        let user_id = message.user_id.clone();

        let records = match self.orchestrator.batch(&user_id, &message.channel_key()).await {
            Ok(BatchOutcome::NoSubscriptions) => {
                self.send(&**session, OutgoingMessage::text(messages::NO_SUBSCRIPTIONS))
                    .await;
                return;
            }
            Ok(BatchOutcome::Empty { .. }) => {
                self.send(&**session, OutgoingMessage::text(messages::NO_SUBSCRIBED_EVENTS))
                    .await;
                return;
            }
            Ok(BatchOutcome::Found { records, .. }) => records,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Loading subscriptions failed");
                self.send(&**session, OutgoingMessage::text(messages::STORE_FAILED))
                    .await;
                return;
            }
        };

        let list = OutgoingMessage::text(messages::batch_text_list(&records));
        self.send(&**session, list).await;
        self.selections.start(
            &user_id,
            records,
            Presentation::Text,
            timeout_notice(Arc::clone(session)),
        );
    }

    async fn image_query(&self, session: &Arc<dyn ChatSession>, keyword: Option<&str>) {
        let Some(keyword) = keyword else {
            self.send(&**session, OutgoingMessage::text(messages::IMAGE_QUERY_USAGE))
                .await;
            return;
        };
        let Some(renderer) = self.renderer_or_notice(&**session).await else {
            return;
        };

        self.selections.clear(&session.message().user_id);
        let notice = self.post_notice(&**session, messages::RENDERING_NOTICE).await;

        match self.orchestrator.search(keyword).await {
            Ok(records) if records.is_empty() => {
                self.send(&**session, OutgoingMessage::text(messages::NOT_FOUND))
                    .await;
            }
            Ok(records) => {
                let title = messages::image_list_title(keyword);
                self.present_image_list(session, &renderer, &title, records)
                    .await;
            }
            Err(e) => {
                tracing::error!(keyword, error = %e, "Image query failed");
                self.send(&**session, OutgoingMessage::text(messages::QUERY_FAILED))
                    .await;
            }
        }

        self.retract_notice(&**session, notice).await;
    }

    async fn image_batch_query(&self, session: &Arc<dyn ChatSession>) {
        let Some(renderer) = self.renderer_or_notice(&**session).await else {
            return;
        };

        let message = session.message();
        let subscriptions = match self
            .orchestrator
            .subscriptions(&message.user_id, &message.channel_key())
            .await
        {
            Ok(subs) if subs.is_empty() => {
                self.send(&**session, OutgoingMessage::text(messages::NO_SUBSCRIPTIONS))
                    .await;
                return;
            }
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(user_id = %message.user_id, error = %e, "Loading subscriptions failed");
                self.send(&**session, OutgoingMessage::text(messages::STORE_FAILED))
                    .await;
                return;
            }
        };

        self.selections.clear(&message.user_id);
        let notice = self
            .post_notice(
                &**session,
                &messages::batch_rendering_notice(subscriptions.len()),
            )
            .await;

        let records = self.orchestrator.fan_out(&subscriptions).await;
        if records.is_empty() {
            self.send(&**session, OutgoingMessage::text(messages::NO_SUBSCRIBED_EVENTS))
                .await;
        } else {
            self.present_image_list(session, &renderer, messages::BATCH_IMAGE_TITLE, records)
                .await;
        }

        self.retract_notice(&**session, notice).await;
    }

    /// Render `records`, arm the image selection and post the list
    async fn present_image_list(
        &self,
        session: &Arc<dyn ChatSession>,
        renderer: &EventRenderer,
        title: &str,
        records: Vec<EventRecord>,
    ) {
        let image = match renderer.render_list(title, &records).await {
            Ok(image) => image,
            Err(e) => {
                tracing::error!(title, error = %e, "Rendering result list failed");
                self.send(&**session, OutgoingMessage::text(messages::QUERY_FAILED))
                    .await;
                return;
            }
        };

        self.selections.start(
            &session.message().user_id,
            records,
            Presentation::Image,
            timeout_notice(Arc::clone(session)),
        );
        let reply = self
            .quoted(&**session)
            .with_image(image.data_uri())
            .with_text(messages::IMAGE_SELECT_PROMPT);
        self.send(&**session, reply).await;
    }

    async fn renderer_or_notice(&self, session: &dyn ChatSession) -> Option<Arc<EventRenderer>> {
        if self.renderer.is_none() {
            self.send(session, OutgoingMessage::text(messages::RENDERER_UNAVAILABLE))
                .await;
        }
        self.renderer.clone()
    }

    /// Post a "please wait" notice, returning its id if the platform gave one
    async fn post_notice(&self, session: &dyn ChatSession, text: &str) -> Option<String> {
        let notice = self.quoted(session).with_text(text);
        match session.send(notice).await {
            Ok(ids) => ids.into_iter().next(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to post wait notice");
                None
            }
        }
    }

    async fn retract_notice(&self, session: &dyn ChatSession, notice: Option<String>) {
        if let Some(id) = notice {
            fire_and_ignore("delete wait notice", session.delete_message(&id)).await;
        }
    }

    // ========================================================================
    // Details
    // ========================================================================

    async fn show_detail(
        &self,
        session: &dyn ChatSession,
        record: &EventRecord,
        presentation: Presentation,
    ) {
        if let (Presentation::Image, Some(renderer)) = (presentation, &self.renderer) {
            match renderer.render_detail(record).await {
                Ok(image) => {
                    let reply = self.quoted(session).with_image(image.data_uri());
                    self.send(session, reply).await;
                }
                Err(e) => {
                    tracing::error!(name = %record.name, error = %e, "Rendering detail failed, falling back to text");
                    self.send(session, OutgoingMessage::text(record.detail_text()))
                        .await;
                }
            }
            return;
        }

        let cover = match record.cover_url() {
            Some(url) => self.covers.fetch_cover(url).await,
            None => None,
        };
        let reply = match cover {
            Some(bytes) => self
                .quoted(session)
                .with_image(image_data_uri(&bytes))
                .with_text(format!("\n{}", record.detail_text())),
            None => {
                tracing::debug!(name = %record.name, "No cover, sending text detail only");
                OutgoingMessage::text(record.detail_text())
            }
        };
        self.send(session, reply).await;
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    async fn subscribe(&self, session: &dyn ChatSession, keyword: Option<&str>) {
        let Some(keyword) = keyword else {
            self.send(session, OutgoingMessage::text(messages::SUBSCRIBE_USAGE))
                .await;
            return;
        };

        let message = session.message();
        let subscription = Subscription::new(&message.user_id, message.channel_key(), keyword);
        let reply = match self.orchestrator.store().upsert(subscription).await {
            Ok(()) => messages::subscribed(keyword),
            Err(e) => {
                tracing::error!(keyword, error = %e, "Saving subscription failed");
                messages::STORE_FAILED.to_string()
            }
        };
        self.send(session, OutgoingMessage::text(reply)).await;
    }

    async fn unsubscribe(&self, session: &dyn ChatSession, keyword: Option<&str>) {
        let message = session.message();
        let (user_id, channel) = (message.user_id.as_str(), message.channel_key());
        let store = self.orchestrator.store();

        let Some(keyword) = keyword else {
            self.send(session, OutgoingMessage::text(messages::CONFIRM_UNSUBSCRIBE_ALL))
                .await;
            let confirmed = session
                .prompt(CONFIRM_TIMEOUT)
                .await
                .is_some_and(|answer| answer.trim().to_lowercase() == messages::CONFIRM_YES);
            if !confirmed {
                self.send(session, OutgoingMessage::text(messages::OPERATION_ABORTED))
                    .await;
                return;
            }

            let reply = match store.remove_all(user_id, &channel).await {
                Ok(removed) => {
                    tracing::info!(user_id, channel = %channel, removed, "Removed all subscriptions");
                    messages::UNSUBSCRIBED_ALL.to_string()
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "Removing subscriptions failed");
                    messages::STORE_FAILED.to_string()
                }
            };
            self.send(session, OutgoingMessage::text(reply)).await;
            return;
        };

        let reply = match store.remove(user_id, &channel, keyword).await {
            Ok(removed) => messages::unsubscribed(keyword, removed),
            Err(e) => {
                tracing::error!(keyword, error = %e, "Removing subscription failed");
                messages::STORE_FAILED.to_string()
            }
        };
        self.send(session, OutgoingMessage::text(reply)).await;
    }

    async fn list_subscriptions(&self, session: &dyn ChatSession) {
        let message = session.message();
        let reply = match self
            .orchestrator
            .subscriptions(&message.user_id, &message.channel_key())
            .await
        {
            Ok(subs) if subs.is_empty() => messages::NO_SUBSCRIPTIONS.to_string(),
            Ok(subs) => messages::subscription_list(&subs),
            Err(e) => {
                tracing::error!(user_id = %message.user_id, error = %e, "Loading subscriptions failed");
                messages::STORE_FAILED.to_string()
            }
        };
        self.send(session, OutgoingMessage::text(reply)).await;
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Empty message that quotes the trigger when quoting is enabled
    fn quoted(&self, session: &dyn ChatSession) -> OutgoingMessage {
        OutgoingMessage::quoting(
            self.options.add_quote,
            session.message().message_id.as_deref(),
        )
    }

    async fn send(&self, session: &dyn ChatSession, message: OutgoingMessage) {
        if let Err(e) = session.send(message).await {
            tracing::warn!(user_id = %session.message().user_id, error = %e, "Failed to send reply");
        }
    }
}

fn non_blank(keyword: &Option<String>) -> Option<&str> {
    keyword.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

/// Expiry hook that tells the user the window passed
fn timeout_notice(session: Arc<dyn ChatSession>) -> ExpiryHook {
    Box::new(move || -> BoxFuture<'static, ()> {
        Box::pin(async move {
            tracing::debug!(user_id = %session.message().user_id, "Selection timed out");
            fire_and_ignore(
                "send timeout notice",
                session.send(OutgoingMessage::text(messages::SELECTION_TIMEOUT)),
            )
            .await;
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{InboundMessage, Segment, TransportError};
    use crate::render::testing::{FakeBrowser, Script};
    use crate::render::{ImageFormat, Rasterizer, RenderSettings, ScreenshotOptions};
    use crate::search::{SearchBackend, SearchError, SearchResponse};
    use crate::subscription::MemorySubscriptionStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<OutgoingMessage>>,
        deleted: Mutex<Vec<String>>,
    }

    struct RecordingSession {
        message: InboundMessage,
        recorder: Arc<Recorder>,
        answer: Option<String>,
    }

    #[async_trait]
    impl ChatSession for RecordingSession {
        fn message(&self) -> &InboundMessage {
            &self.message
        }

        async fn send(&self, message: OutgoingMessage) -> Result<Vec<String>, TransportError> {
            let mut sent = self.recorder.sent.lock();
            sent.push(message);
            Ok(vec![format!("out-{}", sent.len())])
        }

        async fn delete_message(&self, message_id: &str) -> Result<(), TransportError> {
            self.recorder.deleted.lock().push(message_id.to_string());
            Ok(())
        }

        async fn prompt(&self, _timeout: Duration) -> Option<String> {
            self.answer.clone()
        }
    }

    struct Canned(HashMap<String, Vec<EventRecord>>);

    #[async_trait]
    impl SearchBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn search(&self, keyword: &str) -> Result<SearchResponse, SearchError> {
            match self.0.get(keyword) {
                Some(records) => Ok(SearchResponse::ok(records.clone())),
                None => Err(SearchError::Transport("unreachable".to_string())),
            }
        }
    }

    struct Covers;

    #[async_trait]
    impl CoverSource for Covers {
        async fn fetch_cover(&self, url: &str) -> Option<Vec<u8>> {
            url.ends_with(".jpg").then(|| b"\xff\xd8\xff".to_vec())
        }
    }

    fn event(name: &str, address: &str, cover: Option<&str>) -> EventRecord {
        EventRecord {
            name: name.to_string(),
            address: address.to_string(),
            app_logo_pic_url: cover.map(str::to_string),
            ..Default::default()
        }
    }

    struct Harness {
        bot: ConventionBot,
        recorder: Arc<Recorder>,
        store: Arc<MemorySubscriptionStore>,
    }

    impl Harness {
        fn new(options: BotOptions, browser: Option<Script>) -> Self {
            let mut answers = HashMap::new();
            answers.insert(
                "南京".to_string(),
                vec![
                    event("南京漫展A", "南京国际博览中心", Some("https://img/a.jpg")),
                    event("南京漫展B", "南京展览馆", None),
                ],
            );
            answers.insert(
                "上海".to_string(),
                vec![event("上海漫展", "国家会展中心", None)],
            );
            answers.insert("空".to_string(), Vec::new());

            let store = Arc::new(MemorySubscriptionStore::new());
            let orchestrator = QueryOrchestrator::new(
                Arc::new(Canned(answers)),
                Arc::clone(&store) as Arc<dyn crate::subscription::SubscriptionStore>,
            );
            let mut bot = ConventionBot::new(
                options,
                orchestrator,
                SelectionCache::default(),
                Arc::new(Covers),
            );
            if let Some(script) = browser {
                let rasterizer = Rasterizer::new(
                    Arc::new(FakeBrowser::new(script)),
                    ScreenshotOptions::new(ImageFormat::Png, 80),
                );
                bot = bot.with_renderer(Arc::new(EventRenderer::new(
                    rasterizer,
                    Arc::new(Covers),
                    RenderSettings::default(),
                )));
            }
            Self {
                bot,
                recorder: Arc::new(Recorder::default()),
                store,
            }
        }

        async fn say(&self, content: &str) -> Handled {
            self.say_with_answer(content, None).await
        }

        async fn say_with_answer(&self, content: &str, answer: Option<&str>) -> Handled {
            let session = RecordingSession {
                message: InboundMessage {
                    user_id: "u1".to_string(),
                    channel_id: "c1".to_string(),
                    guild_id: Some("g1".to_string()),
                    message_id: Some("m1".to_string()),
                    content: content.to_string(),
                },
                recorder: Arc::clone(&self.recorder),
                answer: answer.map(str::to_string),
            };
            self.bot.handle(Arc::new(session)).await
        }

        fn sent(&self) -> Vec<OutgoingMessage> {
            self.recorder.sent.lock().clone()
        }

        fn last_text(&self) -> String {
            self.sent().last().map(OutgoingMessage::plain_text).unwrap_or_default()
        }
    }

    fn image_options() -> BotOptions {
        BotOptions {
            add_quote: true,
            enable_image_query: true,
            enable_image_batch_query: true,
        }
    }

    // ------------------------------------------------------------------------
    // Text flow
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_text_query_then_select() {
        let h = Harness::new(BotOptions::default(), None);

        let handled = h.say("漫展 查询 南京").await;
        assert_eq!(
            handled,
            Handled::Command(Command::Query {
                keyword: Some("南京".to_string())
            })
        );
        let list = &h.sent()[0];
        assert!(list.is_quoted());
        assert!(list.plain_text().contains("[2]\t 南京漫展B - 南京展览馆"));

        assert_eq!(h.say("1").await, Handled::Selection);
        let detail = h.sent()[1].clone();
        assert_eq!(detail.image_count(), 1);
        assert!(detail.plain_text().starts_with("\n漫展名称: \t南京漫展A"));

        // entry consumed; "1" is now ordinary chatter
        assert_eq!(h.say("1").await, Handled::Ignored);
        assert_eq!(h.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_detail_without_cover_is_text_only() {
        let h = Harness::new(BotOptions::default(), None);
        h.say("漫展 查询 南京").await;
        h.say("2").await;

        let detail = h.sent()[1].clone();
        assert_eq!(detail.image_count(), 0);
        assert!(!detail.is_quoted());
        assert!(detail.plain_text().starts_with("漫展名称: \t南京漫展B"));
    }

    #[tokio::test]
    async fn test_cancel_and_invalid() {
        let h = Harness::new(BotOptions::default(), None);
        h.say("漫展 查询 南京").await;

        assert_eq!(h.say("3").await, Handled::Selection);
        assert_eq!(h.last_text(), messages::SELECTION_INVALID);

        // other commands run and leave the entry in place
        assert_eq!(h.say("漫展 订阅列表").await, Handled::Command(Command::ListSubscriptions));
        assert_eq!(h.last_text(), messages::NO_SUBSCRIPTIONS);
        assert!(h.bot.selections().is_pending("u1"));

        assert_eq!(h.say(" 0 ").await, Handled::Selection);
        assert_eq!(h.last_text(), messages::SELECTION_CANCELED);
        assert!(!h.bot.selections().is_pending("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_query_replaces_pending_selection() {
        let h = Harness::new(BotOptions::default(), None);
        h.say("漫展 查询 南京").await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let handled = h.say("漫展 查询 上海").await;
        assert_eq!(
            handled,
            Handled::Command(Command::Query {
                keyword: Some("上海".to_string())
            })
        );
        assert!(h.last_text().contains("[1]\t 上海漫展 - 国家会展中心"));

        // only the second list's indices resolve
        assert_eq!(h.say("2").await, Handled::Selection);
        assert_eq!(h.last_text(), messages::SELECTION_INVALID);

        // the first timer would have fired here
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(h.bot.selections().is_pending("u1"));
        assert!(h
            .sent()
            .iter()
            .all(|m| m.plain_text() != messages::SELECTION_TIMEOUT));

        assert_eq!(h.say("1").await, Handled::Selection);
        assert!(h.last_text().starts_with("漫展名称: \t上海漫展"));
    }

    #[tokio::test]
    async fn test_selection_accepts_leading_integer() {
        let h = Harness::new(BotOptions::default(), None);
        h.say("漫展 查询 南京").await;

        assert_eq!(h.say("2号").await, Handled::Selection);
        assert!(h.last_text().starts_with("漫展名称: \t南京漫展B"));
    }

    #[tokio::test]
    async fn test_query_messages() {
        let h = Harness::new(BotOptions::default(), None);

        h.say("漫展 查询").await;
        assert_eq!(h.last_text(), messages::QUERY_USAGE);

        h.say("漫展 查询 空").await;
        assert_eq!(h.last_text(), messages::NOT_FOUND);

        h.say("漫展 查询 北京").await;
        assert_eq!(h.last_text(), messages::QUERY_FAILED);
        assert!(!h.bot.selections().is_pending("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_timeout_notice() {
        let h = Harness::new(BotOptions::default(), None);
        h.say("漫展 查询 南京").await;

        tokio::time::sleep(Duration::from_secs(16)).await;

        assert_eq!(h.last_text(), messages::SELECTION_TIMEOUT);
        assert!(!h.bot.selections().is_pending("u1"));
    }

    #[tokio::test]
    async fn test_unknown_subcommand_and_help() {
        let h = Harness::new(BotOptions::default(), None);
        assert_eq!(h.say("漫展 排行").await, Handled::Command(Command::Help));
        assert!(h.last_text().contains("漫展 订阅列表"));
        assert_eq!(h.say("今天天气不错").await, Handled::Ignored);
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_subscription_commands() {
        let h = Harness::new(BotOptions::default(), None);

        h.say("漫展 订阅列表").await;
        assert_eq!(h.last_text(), messages::NO_SUBSCRIPTIONS);

        h.say("漫展 订阅 南京").await;
        assert_eq!(h.last_text(), "已订阅「南京」的漫展信息。");
        h.say("漫展 订阅 上海").await;
        assert_eq!(h.store.snapshot().len(), 2);
        assert_eq!(h.store.snapshot()[0].channel_id, "c1");

        h.say("漫展 订阅列表").await;
        assert_eq!(h.last_text(), "你订阅的漫展关键词：\n- 南京\n- 上海");

        h.say("漫展 取消订阅 广州").await;
        assert_eq!(h.last_text(), "未找到「广州」的订阅。");
        h.say("漫展 取消订阅 上海").await;
        assert_eq!(h.last_text(), "已取消订阅「上海」。");

        h.say("漫展 订阅").await;
        assert_eq!(h.last_text(), messages::SUBSCRIBE_USAGE);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_requires_confirmation() {
        let h = Harness::new(BotOptions::default(), None);
        h.say("漫展 订阅 南京").await;

        h.say_with_answer("漫展 取消订阅", Some("否")).await;
        assert_eq!(h.last_text(), messages::OPERATION_ABORTED);
        assert_eq!(h.store.snapshot().len(), 1);

        h.say_with_answer("漫展 取消订阅", None).await;
        assert_eq!(h.last_text(), messages::OPERATION_ABORTED);

        h.say_with_answer("漫展 取消订阅", Some("是")).await;
        assert_eq!(h.last_text(), messages::UNSUBSCRIBED_ALL);
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_batch_query() {
        let h = Harness::new(BotOptions::default(), None);
        h.say("漫展 一键查询").await;
        assert_eq!(h.last_text(), messages::NO_SUBSCRIPTIONS);

        h.say("漫展 订阅 南京").await;
        h.say("漫展 订阅 北京").await;
        h.say("漫展 一键查询").await;
        assert!(h.last_text().contains("2. [南京] 南京漫展B - 南京展览馆"));

        h.say("2").await;
        assert!(h.last_text().starts_with("漫展名称: \t南京漫展B"));
    }

    // ------------------------------------------------------------------------
    // Image flow
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_image_commands_disabled_are_ignored() {
        let h = Harness::new(BotOptions::default(), Some(Script::default()));
        assert_eq!(h.say("漫展 图片查询 南京").await, Handled::Ignored);
        assert_eq!(h.say("漫展 yjtpcx").await, Handled::Ignored);
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_image_query_without_browser() {
        let h = Harness::new(image_options(), None);
        h.say("漫展 查询 南京").await;
        h.say("0").await;
        h.say("漫展 查询 南京").await;

        h.say("漫展 tpcx 南京").await;
        assert_eq!(h.last_text(), messages::RENDERER_UNAVAILABLE);
        // no renderer, so the text entry is still there
        assert!(h.bot.selections().is_pending("u1"));

        h.say("漫展 tpcx").await;
        assert_eq!(h.last_text(), messages::IMAGE_QUERY_USAGE);
    }

    #[tokio::test]
    async fn test_image_query_flow() {
        let h = Harness::new(
            image_options(),
            Some(Script {
                height: 1500,
                ..Default::default()
            }),
        );

        h.say("漫展 图片查询 南京").await;

        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].plain_text(), messages::RENDERING_NOTICE);
        assert_eq!(
            sent[1].segments(),
            &[
                Segment::Quote("m1".to_string()),
                Segment::Image("data:image/png;base64,SU1H".to_string()),
                Segment::Text(messages::IMAGE_SELECT_PROMPT.to_string()),
            ]
        );
        assert_eq!(*h.recorder.deleted.lock(), vec!["out-1".to_string()]);

        h.say("1").await;
        let detail = h.sent()[2].clone();
        assert_eq!(detail.image_count(), 1);
        assert!(detail.plain_text().is_empty());
    }

    #[tokio::test]
    async fn test_image_render_failure() {
        let h = Harness::new(
            image_options(),
            Some(Script {
                fail_content: true,
                ..Default::default()
            }),
        );

        h.say("漫展 图片查询 南京").await;
        assert_eq!(h.last_text(), messages::QUERY_FAILED);
        assert!(!h.bot.selections().is_pending("u1"));
        // notice retracted on the failure path too
        assert_eq!(h.recorder.deleted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_image_batch_query() {
        let h = Harness::new(image_options(), Some(Script::default()));
        h.say("漫展 一键图片查询").await;
        assert_eq!(h.last_text(), messages::NO_SUBSCRIPTIONS);

        h.say("漫展 订阅 南京").await;
        h.say("漫展 订阅 北京").await;
        h.say("漫展 yjtpcx").await;

        let sent = h.sent();
        let notice = &sent[sent.len() - 2];
        assert_eq!(notice.plain_text(), messages::batch_rendering_notice(2));
        assert_eq!(sent[sent.len() - 1].image_count(), 1);
        assert!(h.bot.selections().is_pending("u1"));
    }
}
