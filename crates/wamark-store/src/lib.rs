//! # Wamark Store
//! Durable state for the bot: a synchronous whole-file JSON key-value store
//! (human-readable, survives restarts) and the dedup/watermark/cooldown
//! tracker layered on top of it.
//!
//! Single active process per store file — there is no cross-process locking.

pub mod kv;
pub mod tracker;

pub use kv::JsonStore;
pub use tracker::StateTracker;
