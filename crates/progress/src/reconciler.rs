//! Blending position and completion into one progress figure.

use folio_core::{Chapter, ChapterId};
use crate::cfi::CfiAddress;
use crate::config::ProgressConfig;

/// The three percentages stored on a progress record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciled {
    /// Blended progress
    pub overall: f64,
    /// Position-based progress
    pub cfi_percent: f64,
    /// Completion-based progress
    pub chapter_percent: f64,
}

/// Combines the position estimate with chapter completion.
///
/// Completion weighs more by default: finishing a chapter is a deliberate
/// action, while the position can move backwards when a reader re-reads.
#[derive(Debug, Clone)]
pub struct ProgressReconciler {
    cfi_weight: f64,
    completion_weight: f64,
}

impl ProgressReconciler {
    /// Create a reconciler from configuration.
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            cfi_weight: config.cfi_weight,
            completion_weight: config.completion_weight,
        }
    }

    /// Blend a position fraction in `[0, 1)` with a completion percentage.
    ///
    /// All outputs are clamped to `[0, 100]` and rounded to two decimals.
    pub fn reconcile(&self, cfi_fraction: f64, completion_percent: f64) -> Reconciled {
        let cfi_percent = clamp_percent(cfi_fraction * 100.0);
        let chapter_percent = clamp_percent(completion_percent);
        let overall = self.cfi_weight * cfi_percent + self.completion_weight * chapter_percent;

        Reconciled {
            overall: round_percent(overall),
            cfi_percent: round_percent(cfi_percent),
            chapter_percent: round_percent(chapter_percent),
        }
    }

    /// Chapter a position belongs to, by spine index.
    pub fn extract_chapter_id_from_cfi(
        &self,
        addr: &CfiAddress,
        chapters: &[Chapter],
    ) -> Option<ChapterId> {
        chapters.get(addr.spine_index()).map(|c| c.id.clone())
    }
}

impl Default for ProgressReconciler {
    fn default() -> Self {
        Self::new(&ProgressConfig::default())
    }
}

/// Clamp to `[0, 100]` and round to two decimals.
pub(crate) fn round_percent(value: f64) -> f64 {
    (clamp_percent(value) * 100.0).round() / 100.0
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Vec<Chapter> {
        vec![
            Chapter::new("A", 0, "Alpha", "a.xhtml"),
            Chapter::new("B", 1, "Beta", "b.xhtml"),
            Chapter::new("C", 2, "Gamma", "c.xhtml"),
        ]
    }

    #[test]
    fn test_position_only() {
        let result = ProgressReconciler::default().reconcile(0.9, 0.0);
        assert_eq!(result.overall, 27.0);
        assert_eq!(result.cfi_percent, 90.0);
        assert_eq!(result.chapter_percent, 0.0);
    }

    #[test]
    fn test_completion_dominates() {
        let result = ProgressReconciler::default().reconcile(0.1, 100.0);
        assert_eq!(result.overall, 73.0);
    }

    #[test]
    fn test_outputs_are_clamped() {
        let reconciler = ProgressReconciler::default();
        let high = reconciler.reconcile(3.0, 250.0);
        assert_eq!(high.overall, 100.0);
        assert_eq!(high.cfi_percent, 100.0);
        let low = reconciler.reconcile(-1.0, f64::NAN);
        assert_eq!(low.overall, 0.0);
        assert_eq!(low.chapter_percent, 0.0);
    }

    #[test]
    fn test_custom_weights() {
        let reconciler = ProgressReconciler::new(&ProgressConfig {
            cfi_weight: 0.5,
            completion_weight: 0.5,
            ..Default::default()
        });
        assert_eq!(reconciler.reconcile(0.5, 50.0).overall, 50.0);
    }

    #[test]
    fn test_extract_chapter_id_mid_path() {
        let reconciler = ProgressReconciler::default();
        let addr = CfiAddress::parse("epubcfi(/6/4[b-ref]!/4/16/1:42)").unwrap();
        assert_eq!(reconciler.extract_chapter_id_from_cfi(&addr, &book()), Some(ChapterId::new("B")));
    }

    #[test]
    fn test_extract_chapter_id_out_of_range() {
        let reconciler = ProgressReconciler::default();
        let addr = CfiAddress::parse("epubcfi(/6/8!/4/2)").unwrap();
        assert_eq!(reconciler.extract_chapter_id_from_cfi(&addr, &book()), None);
    }

    #[test]
    fn test_round_percent() {
        assert_eq!(round_percent(200.0 / 3.0), 66.67);
        assert_eq!(round_percent(-3.0), 0.0);
    }
}
