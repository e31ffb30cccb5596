//! Storage trait abstraction.

use async_trait::async_trait;
use folio_core::{BookId, Chapter, ReadingProgress, UserId};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage abstraction for reading progress and book structure.
///
/// One progress record exists per (user, book) pair. Writers are expected to
/// serialize access to a record; backends do not lock.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Progress operations ===

    /// Save a progress record (create or update).
    async fn save_progress(&mut self, progress: &ReadingProgress) -> Result<()>;

    /// Load the record for a reader and book.
    async fn load_progress(&self, user: &UserId, book: BookId) -> Result<Option<ReadingProgress>>;

    /// List all records of a reader.
    async fn list_progress(&self, user: &UserId) -> Result<Vec<ReadingProgress>>;

    /// Delete the record for a reader and book.
    async fn delete_progress(&mut self, user: &UserId, book: BookId) -> Result<()>;

    // === Chapter operations ===

    /// Save the chapter list of a book.
    async fn save_chapters(&mut self, book: BookId, chapters: &[Chapter]) -> Result<()>;

    /// Load the chapter list of a book, sorted by order.
    async fn load_chapters(&self, book: BookId) -> Result<Option<Vec<Chapter>>>;

    // === Transaction support ===

    /// Commit pending changes with a message.
    async fn commit(&mut self, message: &str) -> Result<()>;
}
