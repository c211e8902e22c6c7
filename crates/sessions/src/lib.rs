//! Session and history management for the agent runtime core.
//!
//! Owns the append-only transcript, the History Store (C2) built on
//! top of it, and embedded checkpoint storage (C3's storage location).

pub mod checkpoint_store;
pub mod history;
pub mod transcript;

pub use checkpoint_store::CheckpointStore;
pub use history::{HistoryStore, Summarizer};
pub use transcript::TranscriptWriter;
