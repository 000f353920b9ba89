//! Offline mutation queue and its replay engine
//!
//! # Features
//! - Durable FIFO of pending mutations, persisted as one list
//! - Best-effort replay: failed items stay queued, the rest are dropped
//! - At most one drain at a time
//! - Automatic drain when connectivity returns

pub mod engine;
pub mod queue;

pub use engine::{DrainReport, SyncEngine, SyncState};
pub use queue::{Method, QueueItem, SyncQueue};
