//! Write-only transcript of answered queries.
//!
//! Each query produces one `chat_<timestamp>_<id>.txt` file under the
//! configured directory. Files are created with `create_new`, so a record is
//! never overwritten, and they are never read back.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::models::QueryResult;

#[derive(Debug, Clone)]
pub struct TranscriptLog {
    dir: PathBuf,
}

impl TranscriptLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one transcript file and return its path.
    pub fn record(&self, query: &str, result: &QueryResult) -> std::io::Result<PathBuf> {
        self.record_at(Local::now(), query, result)
    }

    fn record_at(
        &self,
        now: DateTime<Local>,
        query: &str,
        result: &QueryResult,
    ) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let stamp = now.format("%Y%m%d_%H%M%S_%3f").to_string();
        let sources = if result.sources.is_empty() {
            "none".to_string()
        } else {
            result.sources.join(", ")
        };
        let body = format!(
            "Timestamp: {}\nQuery: {}\nAnswer: {}\nSources: {}\n",
            now.to_rfc3339(),
            query,
            result.answer,
            sources
        );

        loop {
            let id = uuid::Uuid::new_v4().simple().to_string();
            let path = self.dir.join(format!("chat_{}_{}.txt", stamp, &id[..8]));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
