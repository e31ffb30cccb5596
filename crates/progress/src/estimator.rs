//! Reading position estimation from a CFI.

use folio_core::Chapter;
use tracing::{debug, warn};
use crate::cfi::CfiAddress;
use crate::config::ProgressConfig;
use crate::error::{ProgressError, ProgressWarning, Result};

/// Largest fraction the estimator reports; positions never reach 1.0.
pub const MAX_FRACTION: f64 = 1.0 - f64::EPSILON;

/// Result of a position estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// Position in the book, in `[0, 1)`
    pub fraction: f64,
    /// Spine index after clamping to the chapter list
    pub spine_index: usize,
    /// Set when the CFI pointed past the known chapters
    pub warning: Option<ProgressWarning>,
}

/// Converts a CFI into a fraction of the whole book.
///
/// The content documents are not available here, so the fraction inside a
/// chapter is approximated from the step path alone. Each step is a digit in
/// base `step_ceiling + 2`, shifted up by one so that even a `/0` child step
/// outranks any offset on its parent. Deeper steps weigh less and the
/// character offset is a final fractional digit below the last step.
/// Positions that compare lower therefore never estimate higher.
#[derive(Debug, Clone)]
pub struct PositionEstimator {
    step_ceiling: u32,
    offset_ceiling: u32,
}

impl PositionEstimator {
    /// Create an estimator from configuration.
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            step_ceiling: config.step_ceiling,
            offset_ceiling: config.offset_ceiling,
        }
    }

    /// Estimate the book fraction of `addr`.
    pub fn estimate(&self, addr: &CfiAddress, chapters: &[Chapter]) -> Result<Estimate> {
        if chapters.is_empty() {
            return Err(ProgressError::EmptyChapterList);
        }

        let chapter_count = chapters.len();
        let raw_index = addr.spine_index();
        let (spine_index, warning) = if raw_index >= chapter_count {
            warn!(
                "CFI spine index {} is outside {} chapters, clamping",
                raw_index, chapter_count
            );
            (
                chapter_count - 1,
                Some(ProgressWarning::OutOfRangeSpineIndex {
                    spine_index: raw_index,
                    chapter_count,
                }),
            )
        } else {
            (raw_index, None)
        };

        let intra = self.intra_chapter_fraction(addr);
        let fraction = ((spine_index as f64 + intra) / chapter_count as f64).clamp(0.0, MAX_FRACTION);

        debug!(
            "Estimated position {:.4} (chapter {} of {}, intra {:.4})",
            fraction,
            spine_index + 1,
            chapter_count,
            intra
        );

        Ok(Estimate {
            fraction,
            spine_index,
            warning,
        })
    }

    /// Approximate position inside the chapter, in `[0, 1)`.
    pub fn intra_chapter_fraction(&self, addr: &CfiAddress) -> f64 {
        let radix = self.step_ceiling as f64 + 2.0;
        let mut weight = 1.0;
        let mut fraction = 0.0;

        for step in addr.path() {
            weight /= radix;
            fraction += (step.index.min(self.step_ceiling) as f64 + 1.0) * weight;
        }

        if let Some(offset) = addr.offset() {
            let digit = offset.min(self.offset_ceiling) as f64 / (self.offset_ceiling as f64 + 1.0);
            fraction += digit * weight / radix;
        }

        fraction.clamp(0.0, MAX_FRACTION)
    }
}

impl Default for PositionEstimator {
    fn default() -> Self {
        Self::new(&ProgressConfig::default())
    }
}
