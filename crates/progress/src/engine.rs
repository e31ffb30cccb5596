//! Reading progress engine - the entry point for callers.
//!
//! Every operation works on a record the caller owns:
//! ```text
//! CFI ─parse─▶ CfiAddress ─estimate─▶ fraction ─┐
//!                                                ├─reconcile─▶ record percentages
//! completed ids ─parse─▶ set ─percent──────────┘
//! ```
//! Failed operations leave the record as it was.

use chrono::Utc;
use folio_core::{Chapter, ChapterId, ReadingProgress, ReadingProgressStats, SessionState, Time};
use tracing::{debug, warn};
use crate::cfi::CfiAddress;
use crate::completion::{CompletedIds, CompletionTracker};
use crate::config::ProgressConfig;
use crate::error::{ProgressError, ProgressWarning, Result};
use crate::estimator::PositionEstimator;
use crate::reconciler::{ProgressReconciler, Reconciled};
use crate::session::SessionTracker;

/// Outcome of a position update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Chapter now recorded as current
    pub chapter_id: Option<ChapterId>,
    /// Estimated book fraction of the new position
    pub cfi_fraction: f64,
    /// Percentages written to the record
    pub percentages: Reconciled,
    /// Recovered data-quality problems
    pub warnings: Vec<ProgressWarning>,
}

/// Outcome of completing or reopening a chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterOutcome {
    /// Whether the completed set changed
    pub changed: bool,
    /// Percentages written to the record
    pub percentages: Reconciled,
    /// Recovered data-quality problems
    pub warnings: Vec<ProgressWarning>,
}

/// Orchestrates position, completion and session tracking on a record.
///
/// Holds configuration only; it keeps no per-book or per-reader state, so one
/// engine can serve any number of callers.
#[derive(Debug, Clone)]
pub struct ReadingProgressEngine {
    config: ProgressConfig,
    estimator: PositionEstimator,
    completion: CompletionTracker,
    reconciler: ProgressReconciler,
    sessions: SessionTracker,
}

impl ReadingProgressEngine {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self::build(ProgressConfig::default())
    }

    /// Replace the configuration after validating it.
    pub fn with_config(self, config: ProgressConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ProgressConfig) -> Self {
        Self {
            estimator: PositionEstimator::new(&config),
            completion: CompletionTracker,
            reconciler: ProgressReconciler::new(&config),
            sessions: SessionTracker,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Move the reader to `new_cfi`.
    ///
    /// `new_chapter_id` overrides the chapter derived from the CFI.
    /// `session_time_minutes` is added to the reading time as-is, separately
    /// from session start/stop.
    pub fn update_position(
        &self,
        progress: &mut ReadingProgress,
        new_cfi: &str,
        new_chapter_id: Option<ChapterId>,
        session_time_minutes: Option<u64>,
        chapters: &[Chapter],
    ) -> Result<UpdateOutcome> {
        let addr = CfiAddress::parse(new_cfi).map_err(|source| {
            warn!("Rejected position update with invalid CFI {:?}: {}", new_cfi, source);
            ProgressError::InvalidCfi {
                raw: new_cfi.to_string(),
                source,
            }
        })?;

        let estimate = self.estimator.estimate(&addr, chapters)?;
        let mut warnings: Vec<ProgressWarning> = estimate.warning.into_iter().collect();

        let (completed, ids_warning) = self.read_completed(progress);
        warnings.extend(ids_warning);
        let completion_percent = self.completion.completion_percent(&completed, chapters);

        let percentages = self.reconciler.reconcile(estimate.fraction, completion_percent);
        let chapter_id = new_chapter_id
            .or_else(|| self.reconciler.extract_chapter_id_from_cfi(&addr, chapters));

        progress.current_cfi = new_cfi.trim().to_string();
        progress.current_chapter_id = chapter_id.clone();
        apply(progress, &percentages);
        if let Some(minutes) = session_time_minutes {
            progress.total_reading_time_minutes = progress.total_reading_time_minutes.saturating_add(minutes);
        }
        progress.last_read_at = Utc::now();

        debug!(
            "Position updated for {} on book {}: {:.2}% overall",
            progress.user_id, progress.book_id, percentages.overall
        );

        Ok(UpdateOutcome {
            chapter_id,
            cfi_fraction: estimate.fraction,
            percentages,
            warnings,
        })
    }

    /// Mark a chapter as completed.
    pub fn complete_chapter(
        &self,
        progress: &mut ReadingProgress,
        chapter_id: &ChapterId,
        chapters: &[Chapter],
    ) -> Result<ChapterOutcome> {
        self.change_completion(progress, chapter_id, chapters, |completed| {
            self.completion.mark_complete(completed, chapter_id)
        })
    }

    /// Take a chapter back out of the completed set.
    pub fn reopen_chapter(
        &self,
        progress: &mut ReadingProgress,
        chapter_id: &ChapterId,
        chapters: &[Chapter],
    ) -> Result<ChapterOutcome> {
        self.change_completion(progress, chapter_id, chapters, |completed| {
            self.completion.unmark_complete(completed, chapter_id)
        })
    }

    fn change_completion(
        &self,
        progress: &mut ReadingProgress,
        chapter_id: &ChapterId,
        chapters: &[Chapter],
        change: impl FnOnce(&CompletedIds) -> CompletedIds,
    ) -> Result<ChapterOutcome> {
        if chapters.is_empty() {
            return Err(ProgressError::EmptyChapterList);
        }
        if !chapters.iter().any(|c| &c.id == chapter_id) {
            return Err(ProgressError::ChapterNotFound(chapter_id.clone()));
        }

        let (completed, ids_warning) = self.read_completed(progress);
        let updated = change(&completed);
        let changed = updated != completed;

        let completion_percent = self.completion.completion_percent(&updated, chapters);
        // The position does not move, so blend with the stored position figure.
        let percentages = self
            .reconciler
            .reconcile(progress.cfi_progress_percent / 100.0, completion_percent);

        progress.completed_chapter_ids = self.completion.serialize_completed_ids(&updated);
        apply(progress, &percentages);
        progress.last_read_at = Utc::now();

        Ok(ChapterOutcome {
            changed,
            percentages,
            warnings: ids_warning.into_iter().collect(),
        })
    }

    /// Open a reading session now; a no-op while one is open.
    pub fn start_session(&self, progress: &mut ReadingProgress) -> SessionState {
        self.sessions.start_session(progress)
    }

    /// Open a reading session at `now`.
    pub fn start_session_at(&self, progress: &mut ReadingProgress, now: Time) -> SessionState {
        self.sessions.start_session_at(progress, now)
    }

    /// Close the reading session now, returning the minutes added.
    pub fn end_session(&self, progress: &mut ReadingProgress) -> u64 {
        self.sessions.end_session(progress)
    }

    /// Close the reading session at `now`, returning the minutes added.
    pub fn end_session_at(&self, progress: &mut ReadingProgress, now: Time) -> u64 {
        self.sessions.end_session_at(progress, now)
    }

    /// Snapshot of the record for display.
    pub fn get_stats(&self, progress: &ReadingProgress, chapters: &[Chapter]) -> ReadingProgressStats {
        let (completed, _) = self.read_completed(progress);
        let completed_chapters = self.completion.completed_count(&completed, chapters);
        let total_chapters = chapters.len();

        let current_chapter_title = progress
            .current_chapter_id
            .as_ref()
            .and_then(|id| chapters.iter().find(|c| &c.id == id))
            .map(|c| c.title.clone())
            .unwrap_or_default();

        let average_minutes_per_chapter =
            progress.total_reading_time_minutes as f64 / completed_chapters.max(1) as f64;
        let remaining_share = (100.0 - progress.overall_progress_percent).clamp(0.0, 100.0) / 100.0;
        let estimated_time_to_complete_minutes =
            (remaining_share * average_minutes_per_chapter * total_chapters as f64).round() as u64;

        ReadingProgressStats {
            overall_progress_percent: progress.overall_progress_percent,
            cfi_progress_percent: progress.cfi_progress_percent,
            chapter_progress_percent: progress.chapter_progress_percent,
            completed_chapters,
            total_chapters,
            current_chapter_id: progress.current_chapter_id.clone(),
            current_chapter_title,
            total_reading_time_minutes: progress.total_reading_time_minutes,
            estimated_time_to_complete_minutes,
            session_state: progress.session_state(),
            last_read_at: progress.last_read_at,
            computed_at: Utc::now(),
        }
    }

    fn read_completed(&self, progress: &ReadingProgress) -> (CompletedIds, Option<ProgressWarning>) {
        self.completion
            .parse_completed_ids(Some(progress.completed_chapter_ids.as_str()))
    }
}

impl Default for ReadingProgressEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(progress: &mut ReadingProgress, percentages: &Reconciled) {
    progress.overall_progress_percent = percentages.overall;
    progress.cfi_progress_percent = percentages.cfi_percent;
    progress.chapter_progress_percent = percentages.chapter_percent;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use folio_core::{BookId, UserId};
    use crate::cfi::CfiParseError;

    fn book() -> Vec<Chapter> {
        vec![
            Chapter::new("A", 0, "The Beginning", "a.xhtml"),
            Chapter::new("B", 1, "The Middle", "b.xhtml"),
            Chapter::new("C", 2, "The End", "c.xhtml"),
        ]
    }

    fn record() -> ReadingProgress {
        ReadingProgress::new(UserId::new("reader"), BookId::new())
    }

    #[test]
    fn test_update_position_sets_fields() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();

        let outcome = engine
            .update_position(&mut progress, "epubcfi(/6/4!/4/10/1:0)", None, Some(7), &book())
            .unwrap();

        assert_eq!(progress.current_cfi, "epubcfi(/6/4!/4/10/1:0)");
        assert_eq!(progress.current_chapter_id, Some(ChapterId::new("B")));
        assert_eq!(outcome.chapter_id, Some(ChapterId::new("B")));
        assert!(progress.cfi_progress_percent > 33.0 && progress.cfi_progress_percent < 67.0);
        assert_eq!(progress.chapter_progress_percent, 0.0);
        assert_eq!(progress.overall_progress_percent, outcome.percentages.overall);
        assert_eq!(progress.total_reading_time_minutes, 7);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_update_position_chapter_override() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();

        engine
            .update_position(&mut progress, "epubcfi(/6/4!/4/2)", Some(ChapterId::new("C")), None, &book())
            .unwrap();

        assert_eq!(progress.current_chapter_id, Some(ChapterId::new("C")));
        assert_eq!(progress.total_reading_time_minutes, 0);
    }

    #[test]
    fn test_reading_time_saturates() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        progress.total_reading_time_minutes = 5;

        let outcome = engine.update_position(&mut progress, "epubcfi(/6/4!/4/2)", None, Some(u64::MAX), &book());

        assert!(outcome.is_ok());
        assert_eq!(progress.total_reading_time_minutes, u64::MAX);
        assert_eq!(progress.current_cfi, "epubcfi(/6/4!/4/2)");
    }

    #[test]
    fn test_invalid_cfi_leaves_record_unchanged() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        engine
            .update_position(&mut progress, "epubcfi(/6/2!/4/2)", None, None, &book())
            .unwrap();
        let before = progress.clone();

        let result = engine.update_position(&mut progress, "/6/4!/4/2", None, Some(10), &book());

        assert!(matches!(
            result,
            Err(ProgressError::InvalidCfi { source: CfiParseError::MissingEnvelope, .. })
        ));
        assert_eq!(progress, before);
        assert_eq!(progress.current_cfi, "epubcfi(/6/2!/4/2)");
    }

    #[test]
    fn test_empty_chapter_list_is_rejected() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let before = progress.clone();

        let result = engine.update_position(&mut progress, "epubcfi(/6/2!/4/2)", None, None, &[]);

        assert_eq!(result, Err(ProgressError::EmptyChapterList));
        assert_eq!(progress, before);
    }

    #[test]
    fn test_out_of_range_position_is_clamped_with_warning() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();

        let outcome = engine
            .update_position(&mut progress, "epubcfi(/6/14!/4/2)", None, None, &book())
            .unwrap();

        assert_eq!(outcome.chapter_id, None);
        assert!(outcome.cfi_fraction >= 2.0 / 3.0 && outcome.cfi_fraction < 1.0);
        assert!(matches!(
            outcome.warnings.as_slice(),
            [ProgressWarning::OutOfRangeSpineIndex { spine_index: 6, chapter_count: 3 }]
        ));
    }

    #[test]
    fn test_malformed_completed_ids_do_not_block_reading() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        progress.completed_chapter_ids = "{broken".to_string();

        let outcome = engine
            .update_position(&mut progress, "epubcfi(/6/2!/4/2)", None, None, &book())
            .unwrap();

        assert_eq!(progress.chapter_progress_percent, 0.0);
        assert!(matches!(
            outcome.warnings.as_slice(),
            [ProgressWarning::MalformedCompletedIdsData { .. }]
        ));
    }

    #[test]
    fn test_complete_chapter() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let chapters = book();

        let first = engine.complete_chapter(&mut progress, &ChapterId::new("A"), &chapters).unwrap();
        let second = engine.complete_chapter(&mut progress, &ChapterId::new("B"), &chapters).unwrap();

        assert!(first.changed && second.changed);
        assert_eq!(progress.completed_chapter_ids, r#"["A","B"]"#);
        assert_eq!(progress.chapter_progress_percent, 66.67);
        assert_eq!(progress.overall_progress_percent, 46.67);
    }

    #[test]
    fn test_complete_chapter_twice_is_idempotent() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let chapters = book();

        engine.complete_chapter(&mut progress, &ChapterId::new("A"), &chapters).unwrap();
        let snapshot = progress.completed_chapter_ids.clone();
        let again = engine.complete_chapter(&mut progress, &ChapterId::new("A"), &chapters).unwrap();

        assert!(!again.changed);
        assert_eq!(progress.completed_chapter_ids, snapshot);
    }

    #[test]
    fn test_complete_unknown_chapter() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let before = progress.clone();

        let result = engine.complete_chapter(&mut progress, &ChapterId::new("Z"), &book());

        assert_eq!(result, Err(ProgressError::ChapterNotFound(ChapterId::new("Z"))));
        assert_eq!(progress, before);
    }

    #[test]
    fn test_completion_keeps_position_share() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let chapters = book();

        engine
            .update_position(&mut progress, "epubcfi(/6/6!/4/2)", None, None, &chapters)
            .unwrap();
        let cfi_percent = progress.cfi_progress_percent;
        engine.complete_chapter(&mut progress, &ChapterId::new("C"), &chapters).unwrap();

        assert_eq!(progress.cfi_progress_percent, cfi_percent);
        let expected = ((0.3 * cfi_percent + 0.7 * 100.0 / 3.0) * 100.0).round() / 100.0;
        assert!((progress.overall_progress_percent - expected).abs() < 0.02);
    }

    #[test]
    fn test_reopen_chapter() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let chapters = book();

        engine.complete_chapter(&mut progress, &ChapterId::new("A"), &chapters).unwrap();
        let outcome = engine.reopen_chapter(&mut progress, &ChapterId::new("A"), &chapters).unwrap();

        assert!(outcome.changed);
        assert_eq!(progress.completed_chapter_ids, "[]");
        assert_eq!(progress.chapter_progress_percent, 0.0);
    }

    #[test]
    fn test_session_round_trip_through_engine() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let start = Utc::now();

        engine.start_session_at(&mut progress, start);
        engine.start_session_at(&mut progress, start + Duration::minutes(3));
        assert_eq!(progress.session_started_at, Some(start));

        assert_eq!(engine.end_session_at(&mut progress, start + Duration::minutes(30)), 30);
        assert_eq!(engine.end_session(&mut progress), 0);
        assert_eq!(progress.total_reading_time_minutes, 30);
    }

    #[test]
    fn test_stats_snapshot() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        let chapters = book();

        engine
            .update_position(&mut progress, "epubcfi(/6/4!/4/2)", None, Some(60), &chapters)
            .unwrap();
        engine.complete_chapter(&mut progress, &ChapterId::new("A"), &chapters).unwrap();
        let stats = engine.get_stats(&progress, &chapters);

        assert_eq!(stats.completed_chapters, 1);
        assert_eq!(stats.total_chapters, 3);
        assert_eq!(stats.current_chapter_title, "The Middle");
        assert_eq!(stats.total_reading_time_minutes, 60);
        assert_eq!(stats.overall_progress_percent, progress.overall_progress_percent);
        let expected = ((100.0 - progress.overall_progress_percent) / 100.0 * 60.0 * 3.0).round() as u64;
        assert_eq!(stats.estimated_time_to_complete_minutes, expected);
        assert_eq!(stats.session_state, SessionState::Idle);
    }

    #[test]
    fn test_stats_without_completed_chapters() {
        let engine = ReadingProgressEngine::new();
        let mut progress = record();
        progress.total_reading_time_minutes = 20;
        progress.current_chapter_id = Some(ChapterId::new("gone"));

        let stats = engine.get_stats(&progress, &book());

        assert_eq!(stats.completed_chapters, 0);
        assert_eq!(stats.current_chapter_title, "");
        assert_eq!(stats.estimated_time_to_complete_minutes, 60);
    }

    #[test]
    fn test_with_config_validates() {
        let bad = ProgressConfig {
            cfi_weight: 0.9,
            completion_weight: 0.9,
            ..Default::default()
        };
        assert!(ReadingProgressEngine::new().with_config(bad).is_err());

        let engine = ReadingProgressEngine::new()
            .with_config(ProgressConfig {
                cfi_weight: 1.0,
                completion_weight: 0.0,
                ..Default::default()
            })
            .unwrap();
        let mut progress = record();
        engine.complete_chapter(&mut progress, &ChapterId::new("A"), &book()).unwrap();
        assert_eq!(progress.overall_progress_percent, 0.0);
    }
}
