//! Shared test doubles for the engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use wamark_core::error::{Result, WamarkError};
use wamark_core::traits::Gateway;
use wamark_core::types::{ClientEntry, ConversationInfo, Envelope, MessageKey, ReactSettings};
use wamark_store::{JsonStore, StateTracker};

use crate::state::EngineState;

/// What the mock observed going out.
#[derive(Debug, Clone, PartialEq)]
pub enum SentRecord {
    Reaction { conversation_id: String, message_id: String, emoji: String },
    Text { conversation_id: String, text: String, quoted: Option<String> },
}

/// Scriptable in-memory gateway: fixed conversation list, newest-first
/// history per conversation, recorded sends, optional injected failures.
pub struct MockGateway {
    ready: AtomicBool,
    conversations: Mutex<Vec<ConversationInfo>>,
    history: Mutex<HashMap<String, Vec<Envelope>>>,
    sent: Mutex<Vec<SentRecord>>,
    fail_next: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            conversations: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn add_conversation(&self, id: &str, name: &str) {
        self.conversations.lock().unwrap().push(ConversationInfo {
            id: id.into(),
            name: name.into(),
            size: 10,
        });
    }

    /// Script the full history for a conversation, newest-first, exactly as
    /// the real gateway would page it out.
    pub fn set_history(&self, conversation_id: &str, newest_first: Vec<Envelope>) {
        self.history.lock().unwrap().insert(conversation_id.into(), newest_first);
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    /// Make the next `n` sends fail.
    pub fn fail_next_sends(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn try_send(&self) -> Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(WamarkError::Gateway("mock send failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationInfo>> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_history(
        &self,
        conversation_id: &str,
        limit: usize,
        cursor: Option<MessageKey>,
    ) -> Result<Vec<Envelope>> {
        let history = self.history.lock().unwrap();
        let Some(all) = history.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = match cursor {
            Some(key) => match all.iter().position(|e| e.key == key) {
                Some(pos) => pos + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(all.iter().skip(start).take(limit).cloned().collect())
    }

    async fn send_text(
        &self,
        conversation_id: &str,
        text: &str,
        quoted: Option<&MessageKey>,
    ) -> Result<()> {
        self.try_send()?;
        self.sent.lock().unwrap().push(SentRecord::Text {
            conversation_id: conversation_id.into(),
            text: text.into(),
            quoted: quoted.map(|k| k.id.clone()),
        });
        Ok(())
    }

    async fn send_reaction(
        &self,
        conversation_id: &str,
        key: &MessageKey,
        emoji: &str,
    ) -> Result<()> {
        self.try_send()?;
        self.sent.lock().unwrap().push(SentRecord::Reaction {
            conversation_id: conversation_id.into(),
            message_id: key.id.clone(),
            emoji: emoji.into(),
        });
        Ok(())
    }

    async fn listen(&self) -> Result<Box<dyn Stream<Item = Envelope> + Send + Unpin>> {
        Ok(Box::new(futures::stream::pending()))
    }
}

/// Build a group envelope with the given body.
pub fn envelope(conversation_id: &str, message_id: &str, ts_secs: i64, text: &str) -> Envelope {
    Envelope {
        key: MessageKey {
            id: message_id.into(),
            conversation_id: conversation_id.into(),
            sender_id: Some("sender".into()),
            from_me: false,
        },
        timestamp_secs: ts_secs,
        text: Some(text.into()),
        caption: None,
    }
}

/// Fresh tracker on a unique temp file.
pub fn temp_tracker(name: &str) -> StateTracker {
    let path = std::env::temp_dir().join(format!("wamark-engine-test-{name}.json"));
    std::fs::remove_file(&path).ok();
    StateTracker::new(Arc::new(JsonStore::open(&path)))
}

/// Fresh bulk store on a unique temp file.
pub fn temp_store(name: &str) -> Arc<JsonStore> {
    let path = std::env::temp_dir().join(format!("wamark-bulk-test-{name}.json"));
    std::fs::remove_file(&path).ok();
    Arc::new(JsonStore::open(&path))
}

/// Default engine state: one-client roster, cooldown 0, generous budget.
pub fn fast_state(roster_names: &[&str]) -> Arc<EngineState> {
    let roster = roster_names
        .iter()
        .map(|n| ClientEntry { name: (*n).into(), emoji: "✅".into() })
        .collect();
    let settings = ReactSettings { cooldown_secs: 0, rate_per_minute: 1000, ..Default::default() };
    Arc::new(EngineState::new(settings, roster, vec![]))
}

/// Poll until the condition holds. Tests run under a paused tokio clock,
/// so the sleeps auto-advance and this finishes in microseconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..20_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
