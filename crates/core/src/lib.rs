//! Folio core data models.
//!
//! Plain data shared by the reading-progress engine, the storage adapters
//! and the command line front end. Nothing in here computes progress.

#![warn(missing_docs)]

// Identities
mod id;

// Book structure
mod chapter;

// Per-reader state
mod progress;
mod stats;

// Re-exports
pub use id::*;
pub use chapter::Chapter;
pub use progress::{ReadingProgress, SessionState};
pub use stats::ReadingProgressStats;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
