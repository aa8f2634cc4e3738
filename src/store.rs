//! Cross-run deduplication state.
//!
//! The SeenSet is every link ever validated, one per line, sorted. It is read
//! once when a run starts and rewritten once when it ends with the union of
//! what was already there and what the run validated; it never shrinks.

use crate::error::StoreError;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument, warn};

pub const DEFAULT_STATE_FILE: &str = "processed-urls.txt";

/// All previously validated links.
pub type SeenSet = BTreeSet<String>;

/// Links in `candidates` that are not in `seen`.
pub fn diff(candidates: &BTreeSet<String>, seen: &SeenSet) -> BTreeSet<String> {
    candidates.difference(seen).cloned().collect()
}

/// File-backed SeenSet.
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the SeenSet. A missing file is a first run and yields an empty set.
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<SeenSet, StoreError> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Seen set not found; starting empty");
                return Ok(SeenSet::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let seen: SeenSet = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        info!(count = seen.len(), "Loaded seen set");
        Ok(seen)
    }

    /// Replace the stored SeenSet with `links`.
    ///
    /// Writes to a sibling temp file and renames it over the old one, so a
    /// crash mid-write leaves the previous state intact.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = links.len()))]
    pub async fn save(&self, links: &SeenSet) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp = self.path.with_extension("tmp");
        let body = links.iter().join("\n");
        fs::write(&tmp, body).await.map_err(write_err)?;
        fs::rename(&tmp, &self.path).await.map_err(write_err)?;

        info!("Saved seen set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_is_set_subtraction() {
        let seen = set(&["A", "B"]);
        let candidates = set(&["A", "C"]);
        assert_eq!(diff(&candidates, &seen), set(&["C"]));
        assert_eq!(diff(&candidates, &seen), set(&["C"]));
        assert_eq!(seen, set(&["A", "B"]));
        assert_eq!(candidates, set(&["A", "C"]));
    }

    #[test]
    fn test_diff_edge_cases() {
        assert!(diff(&set(&[]), &set(&["A"])).is_empty());
        assert_eq!(diff(&set(&["A"]), &set(&[])), set(&["A"]));
        assert!(diff(&set(&["A"]), &set(&["A"])).is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStore::new(dir.path().join("nope.txt"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_ignores_blank_lines_and_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.txt");
        std::fs::write(&path, "https://b.com/x\n\n  https://a.com/y  \r\nhttps://b.com/x\n").unwrap();
        let seen = SeenStore::new(&path).load().await.unwrap();
        assert_eq!(seen, set(&["https://a.com/y", "https://b.com/x"]));
    }

    #[tokio::test]
    async fn test_save_writes_sorted_lines_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("seen.txt");
        let store = SeenStore::new(&path);
        let links = set(&["https://z.com/1", "https://a.com/2", "https://m.com/3"]);

        store.save(&links).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "https://a.com/2\nhttps://m.com/3\nhttps://z.com/1");
        assert_eq!(store.load().await.unwrap(), links);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = SeenStore::new(dir.path().join("seen.txt"));
        store.save(&set(&["A", "B"])).await.unwrap();
        store.save(&set(&["A", "B", "C"])).await.unwrap();
        assert_eq!(store.load().await.unwrap(), set(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_load_unreadable_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let store = SeenStore::new(dir.path());
        assert!(matches!(store.load().await, Err(StoreError::Read { .. })));
    }
}
