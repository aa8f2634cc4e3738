//! Newline-delimited sources file, for runs without a registry.

use super::SourceRegistry;
use crate::error::QueueError;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

/// One URL per line; blank lines and `#` comments are ignored.
#[derive(Debug, Clone)]
pub struct SourcesFile {
    path: PathBuf,
}

impl SourcesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceRegistry for SourcesFile {
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    async fn list_sources(&self) -> Result<Vec<String>, QueueError> {
        let text = fs::read_to_string(&self.path).await?;
        let sources: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();
        info!(count = sources.len(), "Read sources file");
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_urls_skipping_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.txt");
        std::fs::write(
            &path,
            "# entry pages\nhttps://www.motorsport.com/f1/news/\n\n  https://www.planetf1.com/news  \n",
        )
        .unwrap();

        let sources = SourcesFile::new(&path).list_sources().await.unwrap();
        assert_eq!(
            sources,
            vec![
                "https://www.motorsport.com/f1/news/",
                "https://www.planetf1.com/news"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let err = SourcesFile::new("/no/such/sources.txt")
            .list_sources()
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Io(_)));
    }
}
