//! JSON batch files as a stand-in queue.
//!
//! Used for offline runs and for inspecting what a run would have sent. Each
//! batch becomes one file, grouped by UTC date:
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── 090000.json
//!     └── 150000.json
//! ```
//!
//! If two batches land in the same second the later one gets a `-N` suffix
//! rather than overwriting the earlier file.

use super::RecordQueue;
use crate::error::QueueError;
use crate::models::ScheduledRecord;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};

#[derive(Debug, Clone)]
pub struct JsonDirQueue {
    dir: PathBuf,
}

impl JsonDirQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create `<stem>.json`, or the first free `<stem>-N.json`.
    async fn create_free(dir: &Path, stem: &str) -> std::io::Result<(PathBuf, File)> {
        let mut n = 0;
        loop {
            let path = match n {
                0 => dir.join(format!("{stem}.json")),
                n => dir.join(format!("{stem}-{n}.json")),
            };
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

impl RecordQueue for JsonDirQueue {
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display(), count = records.len()))]
    async fn insert_batch(&self, records: &[ScheduledRecord]) -> Result<usize, QueueError> {
        let json = serde_json::to_string_pretty(records)?;

        let now = Utc::now();
        let day_dir = self.dir.join(now.date_naive().to_string());
        if let Err(e) = fs::create_dir_all(&day_dir).await {
            error!(dir = %day_dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }

        let (path, mut file) = Self::create_free(&day_dir, &now.format("%H%M%S").to_string()).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), "Wrote JSON batch");

        Ok(records.len())
    }
}
