//! Reading progress tracking.
//!
//! CFI parsing, position estimation, chapter completion and reading sessions,
//! combined by [`ReadingProgressEngine`]. Everything here is synchronous and
//! works on values passed in by the caller.

#![warn(missing_docs)]

pub mod cfi;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod reconciler;
pub mod session;

pub use cfi::{CfiAddress, CfiParseError, CfiRange, CfiStep};
pub use completion::{CompletedIds, CompletionTracker};
pub use config::ProgressConfig;
pub use engine::{ChapterOutcome, ReadingProgressEngine, UpdateOutcome};
pub use error::{ProgressError, ProgressWarning, Result};
pub use estimator::{Estimate, PositionEstimator};
pub use reconciler::{ProgressReconciler, Reconciled};
pub use session::SessionTracker;
