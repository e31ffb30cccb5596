//! Chapter model - one spine entry of a book.

use serde::{Deserialize, Serialize};
use crate::id::ChapterId;

/// A chapter as produced by spine extraction.
///
/// Read-only to the progress engine. Lists of chapters handed to the engine
/// are sorted by `order`, with unique `id` and unique `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Unique identifier
    pub id: ChapterId,

    /// Position in the spine (0-based)
    pub order: u32,

    /// Chapter title
    #[serde(default)]
    pub title: String,

    /// Path of the content document inside the package
    pub href: String,

    /// Start and end CFI of the chapter, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfi_range: Option<(String, String)>,
}

impl Chapter {
    /// Create a chapter without a CFI range.
    pub fn new(
        id: impl Into<ChapterId>,
        order: u32,
        title: impl Into<String>,
        href: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            order,
            title: title.into(),
            href: href.into(),
            cfi_range: None,
        }
    }

    /// Set the CFI range.
    pub fn with_cfi_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.cfi_range = Some((start.into(), end.into()));
        self
    }
}
