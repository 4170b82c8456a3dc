//! Dispatch scheduler — single shared FIFO queue drained by one worker.
//!
//! Tasks are processed one at a time in exact enqueue order, regardless of
//! source or event timestamp. Pacing waits happen inside task processing
//! and therefore block the whole queue; that is what guarantees neither a
//! conversation cooldown nor the global minute budget is ever exceeded.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use wamark_core::error::{Result, WamarkError};
use wamark_core::traits::Gateway;
use wamark_core::types::{Envelope, ReactionMode};
use wamark_store::StateTracker;

use crate::now_ms;
use crate::pacing::{RateWindow, cooldown_wait};
use crate::queue::{DispatchTask, TaskKind};
use crate::state::EngineState;

/// Handle to the dispatch scheduler. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    gateway: Arc<dyn Gateway>,
    tracker: StateTracker,
    state: Arc<EngineState>,
    queue: Mutex<VecDeque<DispatchTask>>,
    rate: Mutex<RateWindow>,
    running: AtomicBool,
    worker_active: AtomicBool,
}

/// Snapshot for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub ready: bool,
    pub running: bool,
    pub queue_size: usize,
}

impl Scheduler {
    pub fn new(gateway: Arc<dyn Gateway>, tracker: StateTracker, state: Arc<EngineState>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                gateway,
                tracker,
                state,
                queue: Mutex::new(VecDeque::new()),
                rate: Mutex::new(RateWindow::new()),
                running: AtomicBool::new(false),
                worker_active: AtomicBool::new(false),
            }),
        }
    }

    /// Begin draining the queue. Fails when the gateway session is not
    /// connected; re-entrant calls while running are no-ops.
    pub fn start(&self) -> Result<()> {
        if !self.inner.gateway.is_ready() {
            return Err(WamarkError::NotReady);
        }
        self.inner.running.store(true, Ordering::SeqCst);
        tracing::info!("🚀 dispatch worker started");
        self.kick();
        Ok(())
    }

    /// Stop after the in-flight task. Enqueues keep accumulating and are
    /// drained in FIFO order on the next start.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        tracing::info!("🛑 dispatch worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().expect("queue lock poisoned").len()
    }

    /// Worker fully drained and parked (used by tests).
    pub fn is_idle(&self) -> bool {
        !self.inner.worker_active.load(Ordering::SeqCst) && self.queue_len() == 0
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            ready: self.inner.gateway.is_ready(),
            running: self.is_running(),
            queue_size: self.queue_len(),
        }
    }

    /// Append a task to the shared FIFO queue. Always accepted, even while
    /// stopped; the worker is only kicked when running.
    pub fn enqueue(&self, task: DispatchTask) {
        self.inner
            .queue
            .lock()
            .expect("queue lock poisoned")
            .push_back(task);
        if self.is_running() {
            self.kick();
        }
    }

    /// Filter and enqueue a live push envelope: group traffic only, own
    /// messages and unselected conversations dropped, already-done
    /// messages only advance the watermark. Dropped entirely while the
    /// bot is stopped, like the source event handler.
    pub fn offer_live(&self, envelope: Envelope) {
        if !self.is_running() {
            return;
        }
        let conversation_id = envelope.key.conversation_id.clone();
        if !conversation_id.ends_with("@g.us") || envelope.key.from_me {
            return;
        }
        if !self.inner.state.is_selected(&conversation_id) {
            return;
        }
        if let Some(id) = envelope.key.dedup_id()
            && self.inner.tracker.is_done(&id)
        {
            self.inner
                .tracker
                .advance_last_checked(&conversation_id, envelope.timestamp_ms());
            return;
        }
        let conversation_name = self.inner.state.name_for(&conversation_id);
        self.enqueue(DispatchTask { kind: TaskKind::Live, conversation_name, envelope });
    }

    /// Consume the gateway's live stream until it ends.
    pub async fn run_live_adapter(&self) -> Result<()> {
        let mut stream = self.inner.gateway.listen().await?;
        while let Some(envelope) = stream.next().await {
            self.offer_live(envelope);
        }
        tracing::warn!("⚠️ live event stream ended");
        Ok(())
    }

    /// Spawn the single worker if none is active. The single-flight flag is
    /// what gives the strict FIFO guarantee: at most one drain loop exists.
    fn kick(&self) {
        if self.inner.worker_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            loop {
                while inner.running.load(Ordering::SeqCst) {
                    let task = inner.queue.lock().expect("queue lock poisoned").pop_front();
                    let Some(task) = task else { break };
                    inner.process(task).await;
                }
                inner.worker_active.store(false, Ordering::SeqCst);
                // a producer may have enqueued between the final pop and the
                // flag store; reclaim the worker role or leave it to them
                let more = inner.running.load(Ordering::SeqCst)
                    && !inner.queue.lock().expect("queue lock poisoned").is_empty();
                if !more || inner.worker_active.swap(true, Ordering::SeqCst) {
                    break;
                }
            }
        });
    }
}

impl SchedulerInner {
    /// Process one task: dedup short-circuit, pacing gate, match, send,
    /// record, and always advance the conversation watermark.
    async fn process(&self, task: DispatchTask) {
        let envelope = &task.envelope;
        let conversation_id = envelope.key.conversation_id.clone();
        let ts_ms = envelope.timestamp_ms();
        let dedup_id = envelope.key.dedup_id();

        if let Some(id) = &dedup_id
            && self.tracker.is_done(id)
        {
            self.tracker.advance_last_checked(&conversation_id, ts_ms);
            return;
        }

        let settings = self.state.settings();

        // per-conversation cooldown, checked before matching
        let anchor = self.tracker.cooldown_anchor(&conversation_id);
        if let Some(wait) = cooldown_wait(anchor, now_ms(), settings.cooldown_secs) {
            tokio::time::sleep(wait).await;
        }

        // global minute budget
        loop {
            let hint = self
                .rate
                .lock()
                .expect("rate lock poisoned")
                .wait_hint(now_ms(), settings.rate_per_minute);
            match hint {
                None => break,
                Some(wait) => {
                    tracing::info!("⏳ minute budget spent — waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let Some(matched) = self.state.match_body(envelope.body()) else {
            self.tracker.advance_last_checked(&conversation_id, ts_ms);
            return;
        };

        let send = match settings.mode {
            ReactionMode::Text if !settings.reply_text.is_empty() => {
                self.gateway
                    .send_text(&conversation_id, &settings.reply_text, Some(&envelope.key))
                    .await
            }
            _ => {
                let emoji = if matched.emoji.is_empty() { &settings.emoji } else { &matched.emoji };
                self.gateway
                    .send_reaction(&conversation_id, &envelope.key, emoji)
                    .await
            }
        };

        match send {
            Ok(()) => {
                let now = now_ms();
                self.rate.lock().expect("rate lock poisoned").record(now);
                self.tracker.touch_cooldown(&conversation_id, now);
                if let Some(id) = &dedup_id {
                    self.tracker.mark_done(id, now);
                }
                tracing::info!(
                    "↩️ {} → {} ({:?})",
                    task.conversation_name,
                    matched.name,
                    task.kind
                );
            }
            Err(e) => {
                // no retry: forward progress beats redelivery here
                tracing::warn!("⚠️ send failed in {}: {e}", task.conversation_name);
            }
        }

        self.tracker.advance_last_checked(&conversation_id, ts_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use wamark_core::types::{ClientEntry, ReactSettings};

    fn setup(
        name: &str,
        roster: &[&str],
    ) -> (Arc<MockGateway>, StateTracker, Arc<EngineState>, Scheduler) {
        let gateway = Arc::new(MockGateway::new());
        let tracker = temp_tracker(name);
        let state = fast_state(roster);
        let scheduler = Scheduler::new(gateway.clone(), tracker.clone(), state.clone());
        (gateway, tracker, state, scheduler)
    }

    fn task(kind: TaskKind, cid: &str, mid: &str, ts_secs: i64, text: &str) -> DispatchTask {
        DispatchTask {
            kind,
            conversation_name: cid.to_string(),
            envelope: envelope(cid, mid, ts_secs, text),
        }
    }

    fn sent_message_ids(gateway: &MockGateway) -> Vec<String> {
        gateway
            .sent()
            .into_iter()
            .map(|r| match r {
                SentRecord::Reaction { message_id, .. } => message_id,
                SentRecord::Text { quoted, .. } => quoted.unwrap_or_default(),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_regardless_of_source_or_timestamp() {
        let (gateway, _tracker, _state, scheduler) = setup("sched-fifo", &["Sara"]);
        scheduler.start().unwrap();

        scheduler.enqueue(task(TaskKind::Live, "g1@g.us", "m1", 300, "sara one"));
        scheduler.enqueue(task(TaskKind::Backlog, "g2@g.us", "m2", 100, "sara two"));
        scheduler.enqueue(task(TaskKind::Live, "g3@g.us", "m3", 200, "sara three"));

        wait_until(|| scheduler.is_idle()).await;
        assert_eq!(sent_message_ids(&gateway), vec!["m1", "m2", "m3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_never_sends_twice() {
        let (gateway, tracker, _state, scheduler) = setup("sched-dedup", &["Sara"]);
        scheduler.start().unwrap();

        scheduler.enqueue(task(TaskKind::Live, "g1@g.us", "m1", 100, "sara here"));
        wait_until(|| scheduler.is_idle()).await;
        assert_eq!(gateway.sent().len(), 1);
        assert!(tracker.is_done("m1::g1@g.us::sender"));
        assert!(tracker.cooldown_anchor("g1@g.us") > 0);

        // the same identifier again: watermark bookkeeping only
        scheduler.enqueue(task(TaskKind::Backlog, "g1@g.us", "m1", 100, "sara here"));
        wait_until(|| scheduler.is_idle()).await;
        assert_eq!(gateway.sent().len(), 1);
        assert_eq!(tracker.last_checked("g1@g.us"), 100_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watermark_is_max_timestamp_even_without_match() {
        let (gateway, tracker, _state, scheduler) = setup("sched-watermark", &["Sara"]);
        scheduler.start().unwrap();

        scheduler.enqueue(task(TaskKind::Backlog, "g1@g.us", "m1", 300, "no client here"));
        scheduler.enqueue(task(TaskKind::Backlog, "g1@g.us", "m2", 100, "nothing either"));

        wait_until(|| scheduler.is_idle()).await;
        assert!(gateway.sent().is_empty());
        assert_eq!(tracker.last_checked("g1@g.us"), 300_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueues_accumulate_while_stopped() {
        let (gateway, _tracker, _state, scheduler) = setup("sched-stopped", &["Sara"]);

        scheduler.enqueue(task(TaskKind::Live, "g1@g.us", "m1", 100, "sara a"));
        scheduler.enqueue(task(TaskKind::Live, "g2@g.us", "m2", 200, "sara b"));
        assert_eq!(scheduler.queue_len(), 2);
        assert!(gateway.sent().is_empty());

        scheduler.start().unwrap();
        wait_until(|| scheduler.is_idle()).await;
        assert_eq!(sent_message_ids(&gateway), vec!["m1", "m2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_skips_task_and_advances() {
        let (gateway, tracker, _state, scheduler) = setup("sched-fail", &["Sara"]);
        gateway.fail_next_sends(1);
        scheduler.start().unwrap();

        scheduler.enqueue(task(TaskKind::Live, "g1@g.us", "m1", 100, "sara a"));
        scheduler.enqueue(task(TaskKind::Live, "g1@g.us", "m2", 200, "sara b"));

        wait_until(|| scheduler.is_idle()).await;
        // first send failed: not retried, not marked done, queue moved on
        assert_eq!(sent_message_ids(&gateway), vec!["m2"]);
        assert!(!tracker.is_done("m1::g1@g.us::sender"));
        assert!(tracker.is_done("m2::g1@g.us::sender"));
        assert_eq!(tracker.last_checked("g1@g.us"), 200_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_requires_ready_gateway() {
        let (gateway, _tracker, _state, scheduler) = setup("sched-notready", &["Sara"]);
        gateway.set_ready(false);
        assert!(matches!(scheduler.start(), Err(WamarkError::NotReady)));
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offer_live_filters() {
        let (gateway, tracker, state, scheduler) = setup("sched-offer", &["Sara"]);
        scheduler.start().unwrap();

        // own message
        let mut own = envelope("g1@g.us", "m1", 100, "sara");
        own.key.from_me = true;
        scheduler.offer_live(own);

        // not a group conversation
        scheduler.offer_live(envelope("u1@s.whatsapp.net", "m2", 100, "sara"));

        // unselected conversation
        state.set_selected(vec!["a@g.us".into()]);
        scheduler.offer_live(envelope("b@g.us", "m3", 100, "sara"));

        // already done: watermark only
        tracker.mark_done("m4::a@g.us::sender", 1);
        scheduler.offer_live(envelope("a@g.us", "m4", 150, "sara"));

        wait_until(|| scheduler.is_idle()).await;
        assert!(gateway.sent().is_empty());
        assert_eq!(tracker.last_checked("a@g.us"), 150_000);

        scheduler.offer_live(envelope("a@g.us", "m5", 160, "sara"));
        wait_until(|| scheduler.is_idle()).await;
        assert_eq!(sent_message_ids(&gateway), vec!["m5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_mode_sends_quoted_reply() {
        let gateway = Arc::new(MockGateway::new());
        let tracker = temp_tracker("sched-textmode");
        let settings = ReactSettings {
            mode: ReactionMode::Text,
            cooldown_secs: 0,
            rate_per_minute: 1000,
            ..Default::default()
        };
        let roster = vec![ClientEntry { name: "Sara".into(), emoji: "✅".into() }];
        let state = Arc::new(EngineState::new(settings.clone(), roster, vec![]));
        let scheduler = Scheduler::new(gateway.clone(), tracker, state);
        scheduler.start().unwrap();

        scheduler.enqueue(task(TaskKind::Live, "g1@g.us", "m1", 100, "from sara"));
        wait_until(|| scheduler.is_idle()).await;

        assert_eq!(
            gateway.sent(),
            vec![SentRecord::Text {
                conversation_id: "g1@g.us".into(),
                text: settings.reply_text,
                quoted: Some("m1".into()),
            }]
        );
    }
}
