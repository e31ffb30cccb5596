//! Reading progress model - one record per reader per book.

use serde::{Deserialize, Serialize};
use crate::id::{BookId, ChapterId, ProgressId, UserId};
use crate::Time;

/// Where a reader is in a book and how long they have spent there.
///
/// Created by whoever owns persistence on first open; the progress engine only
/// mutates it. `overall_progress_percent` is always the blend of the other two
/// percentages at the time of the last update and is never set on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgress {
    /// Unique identifier
    pub id: ProgressId,

    /// Reader
    pub user_id: UserId,

    /// Book being read
    pub book_id: BookId,

    /// Last accepted reading position (CFI string)
    pub current_cfi: String,

    /// Chapter the current position belongs to
    pub current_chapter_id: Option<ChapterId>,

    /// Completed chapter identifiers, in their persisted string form
    pub completed_chapter_ids: String,

    /// Blended progress (0-100)
    pub overall_progress_percent: f64,

    /// Progress derived from the reading position (0-100)
    pub cfi_progress_percent: f64,

    /// Progress derived from completed chapters (0-100)
    pub chapter_progress_percent: f64,

    /// Accumulated reading time
    pub total_reading_time_minutes: u64,

    /// Set exactly while a reading session is open
    pub session_started_at: Option<Time>,

    /// Last time the reader did anything with this book
    pub last_read_at: Time,

    /// When created
    pub created_at: Time,
}

/// Session state of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session open
    Idle,
    /// A session is open
    InSession,
}

impl ReadingProgress {
    /// Create a fresh record for a reader opening a book for the first time.
    pub fn new(user_id: UserId, book_id: BookId) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: ProgressId::new(),
            user_id,
            book_id,
            current_cfi: String::new(),
            current_chapter_id: None,
            completed_chapter_ids: String::new(),
            overall_progress_percent: 0.0,
            cfi_progress_percent: 0.0,
            chapter_progress_percent: 0.0,
            total_reading_time_minutes: 0,
            session_started_at: None,
            last_read_at: now,
            created_at: now,
        }
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        if self.session_started_at.is_some() {
            SessionState::InSession
        } else {
            SessionState::Idle
        }
    }
}
