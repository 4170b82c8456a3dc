//! # Wamark Engine
//!
//! The dispatch core of the bot: an ordered task queue with a single
//! worker, dedup/cooldown/rate-limit policies, backlog reconciliation
//! against per-conversation watermarks, and a checkpointed bulk campaign
//! runner.
//!
//! ## Architecture
//! ```text
//! gateway push stream ──► live adapter ──┐
//!                                        ├──► FIFO queue ──► worker
//! gateway history ──► backlog reconciler ┘        │
//!                                                 ├─ dedup check (done.*)
//!                                                 ├─ cooldown + rate gate
//!                                                 ├─ name match
//!                                                 ├─ send reaction/reply
//!                                                 └─ advance watermark
//!
//! bulk runner: own loop, own rate window, checkpoint after every send
//! ```

pub mod backlog;
pub mod bulk;
pub mod matcher;
pub mod pacing;
pub mod queue;
pub mod scheduler;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use backlog::{BacklogCount, BacklogQuery, Reconciler};
pub use bulk::{BulkPhase, BulkRunner, BulkStatus};
pub use matcher::{MatchPattern, PatternSet, normalize};
pub use pacing::{RateWindow, cooldown_wait};
pub use queue::{DispatchTask, TaskKind};
pub use scheduler::{Scheduler, SchedulerStatus};
pub use state::EngineState;

/// Milliseconds since epoch, the engine's common time base.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
