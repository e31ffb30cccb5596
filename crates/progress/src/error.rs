//! Error and warning types for progress computation.

use folio_core::ChapterId;
use crate::cfi::CfiParseError;

/// Result alias for progress operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Failures that skip an operation and leave the record untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProgressError {
    /// The supplied position is not a usable CFI
    #[error("invalid CFI {raw:?}: {source}")]
    InvalidCfi {
        /// The rejected input
        raw: String,
        /// Why it was rejected
        #[source]
        source: CfiParseError,
    },

    /// Chapter is not part of the supplied chapter list
    #[error("chapter not found: {0}")]
    ChapterNotFound(ChapterId),

    /// The operation needs at least one chapter
    #[error("chapter list is empty")]
    EmptyChapterList,

    /// Engine configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Data-quality problems that were recovered from.
///
/// These never abort an operation. They are returned next to the result so
/// callers can surface or record them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressWarning {
    /// The CFI points past the known chapters and was clamped
    OutOfRangeSpineIndex {
        /// Spine index derived from the CFI
        spine_index: usize,
        /// Chapters known to the engine
        chapter_count: usize,
    },

    /// The persisted completed-chapter data could not be read; treated as empty
    MalformedCompletedIdsData {
        /// The unreadable value
        raw: String,
    },
}

impl std::fmt::Display for ProgressWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressWarning::OutOfRangeSpineIndex { spine_index, chapter_count } => write!(
                f,
                "spine index {} is outside {} known chapters",
                spine_index, chapter_count
            ),
            ProgressWarning::MalformedCompletedIdsData { raw } => {
                write!(f, "unreadable completed chapter data {:?}", raw)
            }
        }
    }
}
