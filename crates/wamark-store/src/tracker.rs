//! Dedup and watermark tracking over the key-value store.
//!
//! Key namespaces: `done.<messageId>` (permanent dedup markers),
//! `lastChecked.<conversationId>` (monotonic per-conversation watermark),
//! `cool.<conversationId>` (cooldown anchor of the last dispatched action).

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::kv::JsonStore;

/// Tracks which messages were already handled and how far each
/// conversation has been reconciled.
#[derive(Clone)]
pub struct StateTracker {
    store: Arc<JsonStore>,
}

impl StateTracker {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    /// Whether this message identifier already triggered its action.
    pub fn is_done(&self, dedup_id: &str) -> bool {
        self.store.contains(&format!("done.{dedup_id}"))
    }

    /// Permanently mark a message identifier as handled. A marker, once
    /// written, is never overwritten.
    pub fn mark_done(&self, dedup_id: &str, now_ms: i64) {
        let key = format!("done.{dedup_id}");
        if !self.store.contains(&key) {
            self.store.set(&key, json!(now_ms));
        }
    }

    /// The reconciliation watermark for a conversation (0 when unseen).
    pub fn last_checked(&self, conversation_id: &str) -> i64 {
        self.store.get_i64(&format!("lastChecked.{conversation_id}"), 0)
    }

    /// Advance the watermark. Never moves backwards.
    pub fn advance_last_checked(&self, conversation_id: &str, ts_ms: i64) {
        if ts_ms > self.last_checked(conversation_id) {
            self.store.set(&format!("lastChecked.{conversation_id}"), json!(ts_ms));
        }
    }

    /// All watermarks, keyed by conversation id.
    pub fn last_checked_map(&self) -> BTreeMap<String, i64> {
        self.store
            .entries_with_prefix("lastChecked.")
            .into_iter()
            .filter_map(|(id, v)| v.as_i64().map(|ts| (id, ts)))
            .collect()
    }

    /// When the last action in this conversation was dispatched (0 = never).
    pub fn cooldown_anchor(&self, conversation_id: &str) -> i64 {
        self.store.get_i64(&format!("cool.{conversation_id}"), 0)
    }

    /// Record a dispatched action as the new cooldown anchor.
    pub fn touch_cooldown(&self, conversation_id: &str, now_ms: i64) {
        self.store.set(&format!("cool.{conversation_id}"), json!(now_ms));
    }
}
