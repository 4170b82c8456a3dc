//! Dispatch tasks — plain data queued for the worker.
//!
//! Tasks carry no callables; the worker dispatches on the `kind` tag, which
//! keeps the queue serializable and inspectable. Ordering is insertion
//! order, not event-timestamp order.

use serde::{Deserialize, Serialize};
use wamark_core::types::Envelope;

/// Which producer enqueued the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// From the gateway's live push stream.
    Live,
    /// From a backlog reconciliation pass.
    Backlog,
}

/// One unit of work for the dispatch worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTask {
    pub kind: TaskKind,
    pub conversation_name: String,
    pub envelope: Envelope,
}

impl DispatchTask {
    pub fn conversation_id(&self) -> &str {
        &self.envelope.key.conversation_id
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.envelope.timestamp_ms()
    }
}
