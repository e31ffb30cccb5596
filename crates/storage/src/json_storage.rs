//! JSON file storage implementation.
//!
//! Stores data as JSON files under a root directory and keeps small per-object
//! meta markers (version + updated_at):
//!
//! ```text
//! <root>/progress/<user>/<book>.json
//! <root>/chapters/<book>.json
//! <root>/meta/progress/<user>/<book>.meta.json
//! ```

use std::path::{Path, PathBuf};
use folio_core::{BookId, Chapter, ReadingProgress, UserId};
use super::{Storage, Result};
use tokio::fs;
use tracing::{debug, warn};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    pending: bool,
}

impl JsonStorage {
    /// Create storage, creating the directories it needs under `root`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("progress")).await?;
        fs::create_dir_all(root.join("chapters")).await?;
        fs::create_dir_all(root.join("meta").join("progress")).await?;
        fs::create_dir_all(root.join("meta").join("chapters")).await?;

        Ok(Self {
            root,
            pending: false,
        })
    }

    fn user_dir(&self, user: &UserId) -> PathBuf {
        self.root.join("progress").join(path_component(user.as_str()))
    }
    fn progress_path(&self, user: &UserId, book: BookId) -> PathBuf {
        self.user_dir(user).join(format!("{}.json", book))
    }
    fn chapters_path(&self, book: BookId) -> PathBuf {
        self.root.join("chapters").join(format!("{}.json", book))
    }

    fn meta_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join("meta").join(kind).join(format!("{}.meta.json", id))
    }

    /// Whether anything was written since the last commit.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Read and increment per-object version, return new version.
    async fn bump_version(&self, kind: &str, id: &str) -> Result<u64> {
        let path = self.meta_path(kind, id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_progress(&mut self, progress: &ReadingProgress) -> Result<()> {
        let path = self.progress_path(&progress.user_id, progress.book_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(progress)?;
        fs::write(&path, json.as_bytes()).await?;

        let id = format!("{}/{}", path_component(progress.user_id.as_str()), progress.book_id);
        let version = self.bump_version("progress", &id).await?;
        debug!("Saved progress {} (version {})", id, version);

        self.pending = true;
        Ok(())
    }

    async fn load_progress(&self, user: &UserId, book: BookId) -> Result<Option<ReadingProgress>> {
        read_json(&self.progress_path(user, book)).await
    }

    async fn list_progress(&self, user: &UserId) -> Result<Vec<ReadingProgress>> {
        let dir = self.user_dir(user);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let mut records: Vec<ReadingProgress> = list_dir(&dir).await?;
        records.sort_by(|a, b| b.last_read_at.cmp(&a.last_read_at));
        Ok(records)
    }

    async fn delete_progress(&mut self, user: &UserId, book: BookId) -> Result<()> {
        fs::remove_file(self.progress_path(user, book)).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) }
        })?;
        self.pending = true;
        Ok(())
    }

    async fn save_chapters(&mut self, book: BookId, chapters: &[Chapter]) -> Result<()> {
        let mut sorted = chapters.to_vec();
        sorted.sort_by_key(|c| c.order);
        let json = serde_json::to_string_pretty(&sorted)?;
        fs::write(self.chapters_path(book), json.as_bytes()).await?;

        let version = self.bump_version("chapters", &book.to_string()).await?;
        debug!("Saved {} chapters for book {} (version {})", sorted.len(), book, version);

        self.pending = true;
        Ok(())
    }

    async fn load_chapters(&self, book: BookId) -> Result<Option<Vec<Chapter>>> {
        let chapters: Option<Vec<Chapter>> = read_json(&self.chapters_path(book)).await?;
        Ok(chapters.map(|mut chapters| {
            chapters.sort_by_key(|c| c.order);
            chapters
        }))
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        // No versioning backend; commit only clears pending state.
        debug!("Committed: {}", message);
        self.pending = false;
        Ok(())
    }
}

/// Make an identifier safe to use as a single path component.
fn path_component(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable {}: {}", entry.path().display(), e),
        }
    }
    Ok(items)
}
