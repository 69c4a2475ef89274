//! Query Orchestrator
//!
//! Single-keyword lookups and the fan-out over a user's saved keywords.
//!
//! A single lookup distinguishes "no results" (`Ok(vec![])`, also used for
//! a non-200 envelope) from a transport failure (`Err`). The fan-out does
//! not: every failing keyword degrades to an empty list, so a batch where
//! every call failed looks the same as one where nothing matched.

use std::sync::Arc;

use futures::future::join_all;

use crate::event::EventRecord;
use crate::search::{SearchBackend, SearchError};
use crate::subscription::{StoreError, Subscription, SubscriptionStore};

/// Result of a fan-out over saved keywords
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOutcome {
    /// The user has no saved keywords in this channel
    NoSubscriptions,
    /// Keywords exist but nothing was found
    Empty {
        keywords: usize,
    },
    /// Keyword-tagged records in registration order
    Found {
        keywords: usize,
        records: Vec<EventRecord>,
    },
}

/// Runs lookups against the search backend
#[derive(Clone)]
pub struct QueryOrchestrator {
    search: Arc<dyn SearchBackend>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl QueryOrchestrator {
    #[must_use]
    pub fn new(search: Arc<dyn SearchBackend>, subscriptions: Arc<dyn SubscriptionStore>) -> Self {
        Self {
            search,
            subscriptions,
        }
    }

    /// Subscription store in use
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.subscriptions
    }

    /// Look up one keyword
    pub async fn search(&self, keyword: &str) -> Result<Vec<EventRecord>, SearchError> {
        let response = self.search.search(keyword).await?;
        let code = response.code;
        let records = response.into_records();
        tracing::info!(keyword, code, results = records.len(), "Query finished");
        Ok(records)
    }

    /// A user's saved keywords, oldest first
    pub async fn subscriptions(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Vec<Subscription>, StoreError> {
        self.subscriptions.list(user_id, channel_id).await
    }

    /// Query every keyword concurrently. Results are tagged with their
    /// keyword and concatenated in the order of `subscriptions`.
    pub async fn fan_out(&self, subscriptions: &[Subscription]) -> Vec<EventRecord> {
        let lookups = subscriptions.iter().map(|sub| async move {
            match self.search.search(&sub.keyword).await {
                Ok(response) => response
                    .into_records()
                    .iter()
                    .map(|r| r.with_keyword(&sub.keyword))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    tracing::warn!(keyword = %sub.keyword, error = %e, "Keyword lookup failed, skipping");
                    Vec::new()
                }
            }
        });

        let records: Vec<EventRecord> = join_all(lookups).await.into_iter().flatten().collect();
        tracing::info!(
            keywords = subscriptions.len(),
            results = records.len(),
            "Fan-out finished"
        );
        records
    }

    /// Load a user's keywords and fan out over them
    pub async fn batch(&self, user_id: &str, channel_id: &str) -> Result<BatchOutcome, StoreError> {
        let subscriptions = self.subscriptions(user_id, channel_id).await?;
        if subscriptions.is_empty() {
            return Ok(BatchOutcome::NoSubscriptions);
        }
        Ok(Self::classify(subscriptions.len(), self.fan_out(&subscriptions).await))
    }

    fn classify(keywords: usize, records: Vec<EventRecord>) -> BatchOutcome {
        if records.is_empty() {
            BatchOutcome::Empty { keywords }
        } else {
            BatchOutcome::Found { keywords, records }
        }
    }
}
