//! Reading session time tracking.
//!
//! A record is either idle or in a session; `session_started_at` is set
//! exactly while a session is open.
//!
//! ```text
//! Idle ──start──▶ InSession ──end──▶ Idle
//!  └─end (no-op)     └─start (no-op)
//! ```

use chrono::Utc;
use folio_core::{ReadingProgress, SessionState, Time};
use tracing::{info, warn};

/// Opens and closes reading sessions on a progress record.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionTracker;

impl SessionTracker {
    /// Open a session now.
    pub fn start_session(&self, progress: &mut ReadingProgress) -> SessionState {
        self.start_session_at(progress, Utc::now())
    }

    /// Open a session at `now`.
    ///
    /// Starting while a session is open keeps the original start time.
    pub fn start_session_at(&self, progress: &mut ReadingProgress, now: Time) -> SessionState {
        if progress.session_started_at.is_none() {
            progress.session_started_at = Some(now);
            info!(
                "Reading session started for {} on book {}",
                progress.user_id, progress.book_id
            );
        }
        progress.session_state()
    }

    /// Close the session now, returning the minutes added.
    pub fn end_session(&self, progress: &mut ReadingProgress) -> u64 {
        self.end_session_at(progress, Utc::now())
    }

    /// Close the session at `now`, returning the minutes added.
    ///
    /// Ending an idle record adds nothing. A start time in the future counts
    /// as zero elapsed time.
    pub fn end_session_at(&self, progress: &mut ReadingProgress, now: Time) -> u64 {
        let Some(started_at) = progress.session_started_at.take() else {
            return 0;
        };

        let elapsed = now - started_at;
        let minutes = if elapsed < chrono::Duration::zero() {
            warn!(
                "Session start {} is after end {}, counting no time",
                started_at, now
            );
            0
        } else {
            (elapsed.num_seconds() as f64 / 60.0).round() as u64
        };

        progress.total_reading_time_minutes = progress.total_reading_time_minutes.saturating_add(minutes);
        progress.last_read_at = now;
        info!(
            "Reading session ended for {} on book {}: {} min",
            progress.user_id, progress.book_id, minutes
        );
        minutes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use folio_core::{BookId, UserId};

    fn record() -> ReadingProgress {
        ReadingProgress::new(UserId::new("reader"), BookId::new())
    }

    #[test]
    fn test_start_then_end_accumulates_minutes() {
        let tracker = SessionTracker;
        let mut progress = record();
        let start = Utc::now();

        assert_eq!(tracker.start_session_at(&mut progress, start), SessionState::InSession);
        let added = tracker.end_session_at(&mut progress, start + Duration::minutes(25));

        assert_eq!(added, 25);
        assert_eq!(progress.total_reading_time_minutes, 25);
        assert_eq!(progress.session_state(), SessionState::Idle);
        assert_eq!(progress.last_read_at, start + Duration::minutes(25));
    }

    #[test]
    fn test_minutes_are_rounded() {
        let tracker = SessionTracker;
        let mut progress = record();
        let start = Utc::now();

        tracker.start_session_at(&mut progress, start);
        assert_eq!(tracker.end_session_at(&mut progress, start + Duration::seconds(89)), 1);
        tracker.start_session_at(&mut progress, start);
        assert_eq!(tracker.end_session_at(&mut progress, start + Duration::seconds(90)), 2);
        assert_eq!(progress.total_reading_time_minutes, 3);
    }

    #[test]
    fn test_total_minutes_saturate() {
        let tracker = SessionTracker;
        let mut progress = record();
        progress.total_reading_time_minutes = u64::MAX - 1;
        let start = Utc::now();

        tracker.start_session_at(&mut progress, start);
        let added = tracker.end_session_at(&mut progress, start + Duration::minutes(30));

        assert_eq!(added, 30);
        assert_eq!(progress.total_reading_time_minutes, u64::MAX);
        assert_eq!(progress.session_state(), SessionState::Idle);
    }

    #[test]
    fn test_double_start_keeps_first_clock() {
        let tracker = SessionTracker;
        let mut progress = record();
        let first = Utc::now();

        tracker.start_session_at(&mut progress, first);
        tracker.start_session_at(&mut progress, first + Duration::minutes(10));

        assert_eq!(progress.session_started_at, Some(first));
    }

    #[test]
    fn test_end_without_start_changes_nothing() {
        let tracker = SessionTracker;
        let mut progress = record();
        progress.total_reading_time_minutes = 42;
        let before = progress.clone();

        assert_eq!(tracker.end_session(&mut progress), 0);
        assert_eq!(progress, before);
    }

    #[test]
    fn test_double_end_is_safe() {
        let tracker = SessionTracker;
        let mut progress = record();
        let start = Utc::now();

        tracker.start_session_at(&mut progress, start);
        tracker.end_session_at(&mut progress, start + Duration::minutes(5));
        tracker.end_session_at(&mut progress, start + Duration::minutes(50));

        assert_eq!(progress.total_reading_time_minutes, 5);
    }

    #[test]
    fn test_clock_skew_counts_as_zero() {
        let tracker = SessionTracker;
        let mut progress = record();
        let start = Utc::now();

        tracker.start_session_at(&mut progress, start);
        let added = tracker.end_session_at(&mut progress, start - Duration::minutes(3));

        assert_eq!(added, 0);
        assert_eq!(progress.total_reading_time_minutes, 0);
        assert_eq!(progress.session_state(), SessionState::Idle);
    }
}
