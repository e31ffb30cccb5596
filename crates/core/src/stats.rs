//! Derived reading statistics.

use serde::{Deserialize, Serialize};
use crate::id::ChapterId;
use crate::progress::SessionState;
use crate::Time;

/// A snapshot of reading progress, recomputed on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgressStats {
    /// Blended progress (0-100)
    pub overall_progress_percent: f64,

    /// Position-based progress (0-100)
    pub cfi_progress_percent: f64,

    /// Completion-based progress (0-100)
    pub chapter_progress_percent: f64,

    /// Completed chapters that are still part of the book
    pub completed_chapters: usize,

    /// Chapters in the book
    pub total_chapters: usize,

    /// Chapter of the current position
    pub current_chapter_id: Option<ChapterId>,

    /// Title of the current chapter, empty when unresolved
    pub current_chapter_title: String,

    /// Accumulated reading time
    pub total_reading_time_minutes: u64,

    /// Estimated minutes left to finish the book
    pub estimated_time_to_complete_minutes: u64,

    /// Session state at snapshot time
    pub session_state: SessionState,

    /// Last reading activity
    pub last_read_at: Time,

    /// When the snapshot was taken
    pub computed_at: Time,
}
