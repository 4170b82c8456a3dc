//! Backlog reconciliation — replays historical events per conversation
//! from the stored watermark and feeds qualifying ones into the dispatch
//! queue, oldest first. A dry-run counting mode replays the identical
//! selection without enqueuing anything.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wamark_core::error::{Result, WamarkError};
use wamark_core::traits::Gateway;
use wamark_core::types::ConversationInfo;
use wamark_store::StateTracker;

use crate::queue::{DispatchTask, TaskKind};
use crate::scheduler::Scheduler;
use crate::state::EngineState;

/// Parameters for a reconciliation pass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BacklogQuery {
    /// Explicit low watermark override (ms). Defaults to each
    /// conversation's stored `lastChecked`.
    #[serde(default, rename = "startAtMs")]
    pub start_at_ms: Option<i64>,
    /// Cap on fetched events per conversation.
    #[serde(default, rename = "limitPerChat")]
    pub limit_per_chat: Option<usize>,
}

/// Dry-run result.
#[derive(Debug, Clone, Serialize)]
pub struct BacklogCount {
    pub total: usize,
    #[serde(rename = "byGroup")]
    pub per_conversation: Vec<ConversationCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationCount {
    pub id: String,
    pub name: String,
    pub count: usize,
}

pub struct Reconciler {
    gateway: Arc<dyn Gateway>,
    tracker: StateTracker,
    state: Arc<EngineState>,
    scheduler: Scheduler,
    page_size: usize,
    default_limit: usize,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        tracker: StateTracker,
        state: Arc<EngineState>,
        scheduler: Scheduler,
        page_size: usize,
        default_limit: usize,
    ) -> Self {
        Self { gateway, tracker, state, scheduler, page_size, default_limit }
    }

    /// Target conversations: all groups, or the configured subset.
    /// Also refreshes the display-name cache.
    async fn targets(&self) -> Result<Vec<ConversationInfo>> {
        if !self.gateway.is_ready() {
            return Err(WamarkError::NotReady);
        }
        let conversations = self.gateway.list_conversations().await?;
        self.state.remember_names(&conversations);
        Ok(conversations
            .into_iter()
            .filter(|c| self.state.is_selected(&c.id))
            .collect())
    }

    /// Replay the backlog into the dispatch queue. Returns how many tasks
    /// were enqueued.
    pub async fn process(&self, query: &BacklogQuery) -> Result<usize> {
        let limit = query.limit_per_chat.unwrap_or(self.default_limit);
        let mut enqueued = 0;

        for chat in self.targets().await? {
            let since = query.start_at_ms.unwrap_or_else(|| self.tracker.last_checked(&chat.id));
            tracing::info!("[backlog] {} since {}", chat.name, since);

            let mut fetched = 0;
            let mut cursor = None;

            while fetched < limit {
                let page_limit = self.page_size.min(limit - fetched);
                let page = self
                    .gateway
                    .fetch_history(&chat.id, page_limit, cursor.clone())
                    .await?;
                if page.is_empty() {
                    break;
                }

                // gateway returns newest-first; process oldest → newest
                for envelope in page.iter().rev() {
                    let ts_ms = envelope.timestamp_ms();
                    if ts_ms <= since || envelope.key.from_me {
                        continue;
                    }
                    if let Some(id) = envelope.key.dedup_id()
                        && self.tracker.is_done(&id)
                    {
                        // never fetch it again on the next pass
                        self.tracker.advance_last_checked(&chat.id, ts_ms);
                        continue;
                    }
                    self.scheduler.enqueue(DispatchTask {
                        kind: TaskKind::Backlog,
                        conversation_name: chat.name.clone(),
                        envelope: envelope.clone(),
                    });
                    enqueued += 1;
                }

                fetched += page.len();
                let short_page = page.len() < page_limit;
                cursor = page.last().map(|m| m.key.clone());
                if short_page {
                    break;
                }
            }
        }

        tracing::info!("📥 backlog pass enqueued {enqueued} tasks");
        Ok(enqueued)
    }

    /// Count would-be matches with the identical selection logic, without
    /// enqueuing or mutating any state.
    pub async fn count(&self, query: &BacklogQuery) -> Result<BacklogCount> {
        let limit = query.limit_per_chat.unwrap_or(self.default_limit);
        let mut total = 0;
        let mut per_conversation = Vec::new();

        for chat in self.targets().await? {
            let since = query.start_at_ms.unwrap_or_else(|| self.tracker.last_checked(&chat.id));

            let mut fetched = 0;
            let mut cursor = None;
            let mut count = 0;

            while fetched < limit {
                let page_limit = self.page_size.min(limit - fetched);
                let page = self
                    .gateway
                    .fetch_history(&chat.id, page_limit, cursor.clone())
                    .await?;
                if page.is_empty() {
                    break;
                }

                for envelope in page.iter().rev() {
                    let ts_ms = envelope.timestamp_ms();
                    if ts_ms <= since || envelope.key.from_me {
                        continue;
                    }
                    if let Some(id) = envelope.key.dedup_id()
                        && self.tracker.is_done(&id)
                    {
                        continue;
                    }
                    if self.state.match_body(envelope.body()).is_some() {
                        count += 1;
                    }
                }

                fetched += page.len();
                let short_page = page.len() < page_limit;
                cursor = page.last().map(|m| m.key.clone());
                if short_page {
                    break;
                }
            }

            total += count;
            per_conversation.push(ConversationCount { id: chat.id, name: chat.name, count });
        }

        Ok(BacklogCount { total, per_conversation })
    }
}
