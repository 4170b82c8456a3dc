//! Bulk campaign runner — a paced sender over a fixed ordered message list
//! to one conversation, with crash-safe checkpointing.
//!
//! The index is checkpointed after every confirmed send, so a crash loses
//! at most the in-flight message. On restart a persisted `running`
//! campaign is loaded paused; it never auto-resumes.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use wamark_core::error::{Result, WamarkError};
use wamark_core::traits::Gateway;
use wamark_store::JsonStore;

use crate::now_ms;
use crate::pacing::RateWindow;

/// Give up on a message after this many failed attempts and pause the
/// campaign instead of retrying forever.
const MAX_SEND_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(1500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Poll interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(500);

/// Campaign lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkPhase {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
}

/// Persisted progress marker. `index` is the sole resume point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCheckpoint {
    #[serde(rename = "groupId")]
    pub conversation_id: String,
    pub index: usize,
    pub total: usize,
    pub messages: Vec<String>,
    #[serde(rename = "delaySec")]
    pub delay_secs: u64,
    #[serde(rename = "rpm")]
    pub rate_per_minute: u32,
}

/// Snapshot for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct BulkStatus {
    pub phase: BulkPhase,
    pub running: bool,
    pub paused: bool,
    pub index: usize,
    pub total: usize,
}

struct BulkState {
    phase: BulkPhase,
    checkpoint: Option<BulkCheckpoint>,
    rate: RateWindow,
}

/// Handle to the bulk campaign runner. Cheap to clone.
#[derive(Clone)]
pub struct BulkRunner {
    inner: Arc<BulkInner>,
}

struct BulkInner {
    gateway: Arc<dyn Gateway>,
    store: Arc<JsonStore>,
    state: Mutex<BulkState>,
    loop_active: AtomicBool,
    /// Failed attempts on the current message (exposed for diagnostics).
    failed_attempts: AtomicU64,
}

impl BulkRunner {
    pub fn new(gateway: Arc<dyn Gateway>, store: Arc<JsonStore>) -> Self {
        Self {
            inner: Arc::new(BulkInner {
                gateway,
                store,
                state: Mutex::new(BulkState {
                    phase: BulkPhase::Idle,
                    checkpoint: None,
                    rate: RateWindow::new(),
                }),
                loop_active: AtomicBool::new(false),
                failed_attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Load a checkpoint persisted by a previous process. A campaign that
    /// was running when the process died comes back paused and must be
    /// resumed explicitly.
    pub fn load_checkpoint(&self) {
        let was_running = self.inner.store.get_bool("running", false);
        let checkpoint = self
            .inner
            .store
            .get("checkpoint")
            .and_then(|v| serde_json::from_value::<BulkCheckpoint>(v).ok());
        if let Some(cp) = checkpoint
            && was_running
        {
            tracing::info!(
                "📦 bulk checkpoint restored: {}/{} to {} (paused, resume to continue)",
                cp.index,
                cp.total,
                cp.conversation_id
            );
            let mut state = self.inner.state.lock().expect("bulk lock poisoned");
            state.phase = BulkPhase::Paused;
            state.checkpoint = Some(cp);
        }
    }

    /// Start a fresh campaign at index 0, overwriting any previous
    /// checkpoint, and launch the paced send loop.
    pub fn start(
        &self,
        conversation_id: &str,
        messages: Vec<String>,
        delay_secs: u64,
        rate_per_minute: u32,
    ) -> Result<()> {
        if !self.inner.gateway.is_ready() {
            return Err(WamarkError::NotReady);
        }
        if conversation_id.is_empty() {
            return Err(WamarkError::Campaign("groupId required".into()));
        }
        if messages.is_empty() {
            return Err(WamarkError::Campaign("messages required".into()));
        }

        let checkpoint = BulkCheckpoint {
            conversation_id: conversation_id.to_string(),
            index: 0,
            total: messages.len(),
            messages,
            delay_secs,
            rate_per_minute: rate_per_minute.max(1),
        };

        {
            let mut state = self.inner.state.lock().expect("bulk lock poisoned");
            state.phase = BulkPhase::Running;
            state.rate = RateWindow::new();
            state.checkpoint = Some(checkpoint.clone());
        }
        self.inner.store.set("checkpoint", json!(checkpoint));
        self.inner.store.set("running", json!(true));
        self.inner.failed_attempts.store(0, Ordering::SeqCst);

        tracing::info!(
            "📤 bulk campaign started: {} messages to {}",
            checkpoint.total,
            checkpoint.conversation_id
        );
        self.spawn_loop();
        Ok(())
    }

    /// Pause at the next loop iteration; never preempts an in-flight send.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock().expect("bulk lock poisoned");
        if state.phase == BulkPhase::Running {
            state.phase = BulkPhase::Paused;
            tracing::info!("⏸️ bulk campaign paused");
        }
    }

    /// Resume from the persisted index, restarting the loop if needed.
    pub fn resume(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().expect("bulk lock poisoned");
            if state.checkpoint.is_none() {
                return Err(WamarkError::Campaign("no campaign to resume".into()));
            }
            state.phase = BulkPhase::Running;
        }
        self.inner.store.set("running", json!(true));
        self.inner.failed_attempts.store(0, Ordering::SeqCst);
        tracing::info!("▶️ bulk campaign resumed");
        self.spawn_loop();
        Ok(())
    }

    /// Stop the loop and mark the campaign not-running. The checkpoint is
    /// left in place for inspection; a later start overwrites it.
    pub fn cancel(&self) {
        {
            let mut state = self.inner.state.lock().expect("bulk lock poisoned");
            state.phase = BulkPhase::Cancelled;
        }
        self.inner.store.set("running", json!(false));
        tracing::info!("🛑 bulk campaign cancelled");
    }

    pub fn status(&self) -> BulkStatus {
        let state = self.inner.state.lock().expect("bulk lock poisoned");
        let (index, total) = state
            .checkpoint
            .as_ref()
            .map(|cp| (cp.index, cp.total))
            .unwrap_or((0, 0));
        BulkStatus {
            phase: state.phase,
            running: state.phase == BulkPhase::Running,
            paused: state.phase == BulkPhase::Paused,
            index,
            total,
        }
    }

    /// Loop finished and parked (used by tests).
    pub fn is_idle(&self) -> bool {
        !self.inner.loop_active.load(Ordering::SeqCst)
    }

    pub fn failed_attempts(&self) -> u64 {
        self.inner.failed_attempts.load(Ordering::SeqCst)
    }

    fn spawn_loop(&self) {
        if self.inner.loop_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.run_loop().await;
            inner.loop_active.store(false, Ordering::SeqCst);
        });
    }
}

impl BulkInner {
    async fn run_loop(self: &Arc<Self>) {
        let mut attempts = 0u32;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            // snapshot under the lock, never hold it across awaits
            let (phase, next) = {
                let mut state = self.state.lock().expect("bulk lock poisoned");
                match state.phase {
                    BulkPhase::Paused => (BulkPhase::Paused, None),
                    BulkPhase::Running => {
                        let Some(cp) = state.checkpoint.as_ref() else {
                            state.phase = BulkPhase::Idle;
                            return;
                        };
                        if cp.index >= cp.total {
                            state.phase = BulkPhase::Completed;
                            (BulkPhase::Completed, None)
                        } else {
                            let rpm = cp.rate_per_minute;
                            let item = (
                                cp.conversation_id.clone(),
                                cp.messages[cp.index].clone(),
                                cp.delay_secs,
                            );
                            match state.rate.wait_hint(now_ms(), rpm) {
                                Some(wait) => (BulkPhase::Running, Some(Err(wait))),
                                None => (BulkPhase::Running, Some(Ok(item))),
                            }
                        }
                    }
                    other => (other, None),
                }
            };

            match phase {
                BulkPhase::Paused => {
                    tokio::time::sleep(PAUSE_POLL).await;
                    continue;
                }
                BulkPhase::Completed => {
                    self.store.set("running", json!(false));
                    tracing::info!("✅ bulk finished");
                    return;
                }
                BulkPhase::Running => {}
                _ => return,
            }

            match next {
                Some(Err(wait)) => {
                    tokio::time::sleep(wait).await;
                }
                Some(Ok((conversation_id, text, delay_secs))) => {
                    match self.gateway.send_text(&conversation_id, &text, None).await {
                        Ok(()) => {
                            attempts = 0;
                            backoff = INITIAL_BACKOFF;
                            let checkpoint = {
                                let mut state = self.state.lock().expect("bulk lock poisoned");
                                state.rate.record(now_ms());
                                let cp = state.checkpoint.as_mut().expect("checkpoint vanished");
                                cp.index += 1;
                                cp.clone()
                            };
                            // checkpoint before the pacing delay: a crash
                            // loses at most the in-flight send
                            self.store.set("checkpoint", json!(checkpoint));
                            if delay_secs > 0 {
                                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                            }
                        }
                        Err(e) => {
                            attempts += 1;
                            self.failed_attempts.fetch_add(1, Ordering::SeqCst);
                            tracing::warn!("⚠️ bulk send error (attempt {attempts}): {e}");
                            if attempts >= MAX_SEND_ATTEMPTS {
                                tracing::warn!(
                                    "⏸️ bulk paused after {MAX_SEND_ATTEMPTS} failed attempts — resume to retry"
                                );
                                let mut state = self.state.lock().expect("bulk lock poisoned");
                                state.phase = BulkPhase::Paused;
                                attempts = 0;
                                backoff = INITIAL_BACKOFF;
                            } else {
                                tokio::time::sleep(backoff).await;
                                backoff = (backoff * 2).min(MAX_BACKOFF);
                            }
                        }
                    }
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn sent_texts(gateway: &MockGateway) -> Vec<String> {
        gateway
            .sent()
            .into_iter()
            .filter_map(|r| match r {
                SentRecord::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn stored_checkpoint(store: &JsonStore) -> BulkCheckpoint {
        serde_json::from_value(store.get("checkpoint").expect("no checkpoint stored"))
            .expect("bad checkpoint shape")
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_bad_input_without_touching_state() {
        let gateway = Arc::new(MockGateway::new());
        let runner = BulkRunner::new(gateway.clone(), temp_store("bulk-reject"));

        gateway.set_ready(false);
        assert!(matches!(
            runner.start("g1@g.us", vec!["hi".into()], 0, 20),
            Err(WamarkError::NotReady)
        ));
        gateway.set_ready(true);
        assert!(matches!(
            runner.start("", vec!["hi".into()], 0, 20),
            Err(WamarkError::Campaign(_))
        ));
        assert!(matches!(
            runner.start("g1@g.us", vec![], 0, 20),
            Err(WamarkError::Campaign(_))
        ));

        assert_eq!(runner.status().phase, BulkPhase::Idle);
        assert!(runner.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_campaign_runs_to_completion_in_order() {
        let gateway = Arc::new(MockGateway::new());
        let store = temp_store("bulk-complete");
        let runner = BulkRunner::new(gateway.clone(), store.clone());

        runner
            .start("g1@g.us", vec!["a".into(), "b".into(), "c".into()], 1, 100)
            .unwrap();
        wait_until(|| runner.status().phase == BulkPhase::Completed).await;
        wait_until(|| runner.is_idle()).await;

        assert_eq!(sent_texts(&gateway), vec!["a", "b", "c"]);
        assert_eq!(stored_checkpoint(&store).index, 3);
        assert!(!store.get_bool("running", true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_loads_paused_and_resumes_from_index() {
        let gateway = Arc::new(MockGateway::new());
        let store = temp_store("bulk-resume");
        // checkpoint left behind by a process that died mid-campaign
        store.set(
            "checkpoint",
            json!({
                "groupId": "g1@g.us",
                "index": 2,
                "total": 5,
                "messages": ["m1", "m2", "m3", "m4", "m5"],
                "delaySec": 0,
                "rpm": 100
            }),
        );
        store.set("running", json!(true));

        let runner = BulkRunner::new(gateway.clone(), store.clone());
        runner.load_checkpoint();

        // restored paused, never auto-resumed
        let status = runner.status();
        assert_eq!(status.phase, BulkPhase::Paused);
        assert_eq!(status.index, 2);
        assert_eq!(status.total, 5);
        assert!(gateway.sent().is_empty());

        runner.resume().unwrap();
        wait_until(|| runner.status().phase == BulkPhase::Completed).await;
        wait_until(|| runner.is_idle()).await;
        assert_eq!(sent_texts(&gateway), vec!["m3", "m4", "m5"]);
        assert!(!store.get_bool("running", true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_pauses_after_bounded_retries() {
        let gateway = Arc::new(MockGateway::new());
        let store = temp_store("bulk-retry");
        let runner = BulkRunner::new(gateway.clone(), store.clone());
        gateway.fail_next_sends(MAX_SEND_ATTEMPTS as usize);

        runner.start("g1@g.us", vec!["a".into(), "b".into()], 0, 100).unwrap();
        wait_until(|| runner.status().phase == BulkPhase::Paused).await;

        assert_eq!(runner.failed_attempts(), u64::from(MAX_SEND_ATTEMPTS));
        assert!(gateway.sent().is_empty());
        assert_eq!(runner.status().index, 0);

        runner.resume().unwrap();
        wait_until(|| runner.status().phase == BulkPhase::Completed).await;
        assert_eq!(sent_texts(&gateway), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loop_but_keeps_checkpoint() {
        let gateway = Arc::new(MockGateway::new());
        let store = temp_store("bulk-cancel");
        let runner = BulkRunner::new(gateway.clone(), store.clone());
        gateway.fail_next_sends(1_000);

        runner.start("g1@g.us", vec!["a".into()], 0, 100).unwrap();
        wait_until(|| runner.failed_attempts() >= 1).await;
        runner.cancel();
        wait_until(|| runner.is_idle()).await;

        assert_eq!(runner.status().phase, BulkPhase::Cancelled);
        assert!(!store.get_bool("running", true));
        assert_eq!(stored_checkpoint(&store).index, 0);
        assert!(gateway.sent().is_empty());
    }
}
