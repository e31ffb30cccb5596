//! Completed-chapter bookkeeping.
//!
//! The completed set crosses into storage as a string. The canonical form is a
//! JSON array of chapter ids in ascending order without duplicates, so
//! `serialize(parse(x))` is stable. Comma-separated lists written by older
//! clients are still read.

use std::collections::BTreeSet;
use folio_core::{Chapter, ChapterId};
use tracing::warn;
use crate::error::ProgressWarning;
use crate::reconciler::round_percent;

/// Set of completed chapters, ordered by id.
pub type CompletedIds = BTreeSet<ChapterId>;

/// Parses, serializes and measures completed-chapter sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionTracker;

impl CompletionTracker {
    /// Read a persisted completed set.
    ///
    /// Missing, empty and unreadable input all give an empty set; unreadable
    /// input is also reported as a warning.
    pub fn parse_completed_ids(
        &self,
        serialized: Option<&str>,
    ) -> (CompletedIds, Option<ProgressWarning>) {
        let Some(raw) = serialized.map(str::trim).filter(|s| !s.is_empty()) else {
            return (CompletedIds::new(), None);
        };

        let parsed = if raw.starts_with('[') {
            serde_json::from_str::<Vec<String>>(raw).ok()
        } else {
            parse_legacy_list(raw)
        };

        match parsed {
            Some(ids) => (
                ids.into_iter()
                    .map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
                    .map(ChapterId::from)
                    .collect(),
                None,
            ),
            None => {
                warn!("Unreadable completed chapter data {:?}, treating as empty", raw);
                (
                    CompletedIds::new(),
                    Some(ProgressWarning::MalformedCompletedIdsData {
                        raw: raw.to_string(),
                    }),
                )
            }
        }
    }

    /// Canonical string form of a completed set.
    pub fn serialize_completed_ids(&self, ids: &CompletedIds) -> String {
        let ids: Vec<&str> = ids.iter().map(ChapterId::as_str).collect();
        // A list of strings always serializes.
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }

    /// Completed chapters that are still part of `chapters`.
    pub fn completed_count(&self, ids: &CompletedIds, chapters: &[Chapter]) -> usize {
        chapters.iter().filter(|c| ids.contains(&c.id)).count()
    }

    /// Percentage of `chapters` that are completed, in `[0, 100]`.
    ///
    /// Ids not in `chapters` are ignored; an empty chapter list gives 0.
    pub fn completion_percent(&self, ids: &CompletedIds, chapters: &[Chapter]) -> f64 {
        if chapters.is_empty() {
            return 0.0;
        }
        let completed = self.completed_count(ids, chapters);
        round_percent(100.0 * completed as f64 / chapters.len() as f64)
    }

    /// Add a chapter to the set. Adding twice is a no-op.
    pub fn mark_complete(&self, ids: &CompletedIds, chapter_id: &ChapterId) -> CompletedIds {
        let mut ids = ids.clone();
        ids.insert(chapter_id.clone());
        ids
    }

    /// Remove a chapter from the set. Removing an absent id is a no-op.
    pub fn unmark_complete(&self, ids: &CompletedIds, chapter_id: &ChapterId) -> CompletedIds {
        let mut ids = ids.clone();
        ids.remove(chapter_id);
        ids
    }
}

fn parse_legacy_list(raw: &str) -> Option<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .map(|id| {
            let valid = !id.is_empty()
                && !id.chars().any(|c| matches!(c, '"' | '[' | ']' | '{' | '}'));
            valid.then(|| id.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> CompletedIds {
        ids.iter().map(|id| ChapterId::new(*id)).collect()
    }

    fn book(ids: &[&str]) -> Vec<Chapter> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Chapter::new(*id, i as u32, id.to_uppercase(), format!("{}.xhtml", id)))
            .collect()
    }

    #[test]
    fn test_parse_empty_and_missing() {
        let tracker = CompletionTracker;
        assert_eq!(tracker.parse_completed_ids(None), (CompletedIds::new(), None));
        assert_eq!(tracker.parse_completed_ids(Some("  ")), (CompletedIds::new(), None));
        assert_eq!(tracker.parse_completed_ids(Some("[]")), (CompletedIds::new(), None));
    }

    #[test]
    fn test_parse_json_array_dedups_and_sorts() {
        let tracker = CompletionTracker;
        let (ids, warning) = tracker.parse_completed_ids(Some(r#"["c","a","c","b"]"#));
        assert!(warning.is_none());
        assert_eq!(tracker.serialize_completed_ids(&ids), r#"["a","b","c"]"#);
    }

    #[test]
    fn test_parse_legacy_comma_list() {
        let tracker = CompletionTracker;
        let (ids, warning) = tracker.parse_completed_ids(Some("ch2, ch1"));
        assert!(warning.is_none());
        assert_eq!(ids, set(&["ch1", "ch2"]));
    }

    #[test]
    fn test_parse_malformed_gives_empty_with_warning() {
        let tracker = CompletionTracker;
        for raw in [r#"["a","#, r#"{"a":1}"#, "a,,b", r#"[1,2]"#] {
            let (ids, warning) = tracker.parse_completed_ids(Some(raw));
            assert!(ids.is_empty(), "{}", raw);
            assert!(
                matches!(warning, Some(ProgressWarning::MalformedCompletedIdsData { .. })),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_serialize_parse_round_trip() {
        let tracker = CompletionTracker;
        let original = set(&["intro", "ch-10", "ch-2", "epilogue"]);
        let serialized = tracker.serialize_completed_ids(&original);
        let (parsed, _) = tracker.parse_completed_ids(Some(&serialized));
        assert_eq!(parsed, original);
        assert_eq!(tracker.serialize_completed_ids(&parsed), serialized);
    }

    #[test]
    fn test_completion_percent_two_of_three() {
        let tracker = CompletionTracker;
        let percent = tracker.completion_percent(&set(&["A", "B"]), &book(&["A", "B", "C"]));
        assert!((percent - 66.67).abs() < 0.005);
    }

    #[test]
    fn test_completion_percent_ignores_stale_ids() {
        let tracker = CompletionTracker;
        let percent = tracker.completion_percent(&set(&["A", "gone"]), &book(&["A", "B"]));
        assert_eq!(percent, 50.0);
    }

    #[test]
    fn test_completion_percent_bounds() {
        let tracker = CompletionTracker;
        assert_eq!(tracker.completion_percent(&set(&["A"]), &[]), 0.0);
        assert_eq!(tracker.completion_percent(&set(&["A", "B"]), &book(&["A", "B"])), 100.0);
    }

    #[test]
    fn test_mark_complete_is_idempotent() {
        let tracker = CompletionTracker;
        let id = ChapterId::new("A");
        let once = tracker.mark_complete(&CompletedIds::new(), &id);
        let twice = tracker.mark_complete(&once, &id);
        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_unmark_complete() {
        let tracker = CompletionTracker;
        let ids = tracker.unmark_complete(&set(&["A", "B"]), &ChapterId::new("A"));
        assert_eq!(ids, set(&["B"]));
        assert_eq!(tracker.unmark_complete(&ids, &ChapterId::new("A")), ids);
    }
}
