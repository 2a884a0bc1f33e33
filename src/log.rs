use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use std::fs::{OpenOptions, File};
use std::io::{BufReader, BufWriter, Write, BufRead};
use anyhow::{Result, Context};
use chrono::Utc;

use crate::error::ScpError;
use crate::session::{Direction, TransferRequest, TransferStats};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub transfer_id: String,
    pub direction: Direction,
    pub host: String,
    pub local: PathBuf,
    pub remote: String,
    pub status: TransferStatus,
    pub files: u64,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

impl TransferLogEntry {
    pub fn new(host: &str, request: &TransferRequest, outcome: &Result<TransferStats, ScpError>) -> Self {
        let (status, stats, error) = match outcome {
            Ok(stats) => (TransferStatus::Completed, stats.clone(), None),
            Err(e) => (TransferStatus::Failed, TransferStats::default(), Some(e.to_string())),
        };
        TransferLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            transfer_id: uuid::Uuid::new_v4().to_string(),
            direction: request.direction,
            host: host.to_string(),
            local: request.local.clone(),
            remote: request.remote.clone(),
            status,
            files: stats.files,
            bytes_transferred: stats.bytes,
            error,
        }
    }
}

/// Append-only JSONL journal with one entry per transfer.
pub struct TransferLog {
    log_file_path: PathBuf,
}

impl TransferLog {
    pub fn new(path: &Path) -> Self {
        TransferLog { log_file_path: path.to_path_buf() }
    }

    pub fn add_entry(&self, entry: &TransferLogEntry) -> Result<()> {
        if let Some(parent) = self.log_file_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)
            .context("Failed to open transfer log file")?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_log(&self) -> Result<Vec<TransferLogEntry>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open transfer log file for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransferLogEntry = serde_json::from_str(&line)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransferLog::new(&dir.path().join("journal.jsonl"));
        assert!(log.read_log().unwrap().is_empty());

        let up = TransferRequest::upload("a.txt", "/srv/a.txt");
        let ok = Ok(TransferStats { files: 1, dirs: 0, bytes: 42 });
        log.add_entry(&TransferLogEntry::new("example.org", &up, &ok)).unwrap();

        let down = TransferRequest::download("/srv/missing", "out");
        let failed = Err(ScpError::RemoteRejection {
            message: "scp: /srv/missing: No such file or directory".into(),
            fatal: false,
        });
        log.add_entry(&TransferLogEntry::new("example.org", &down, &failed)).unwrap();

        let entries = log.read_log().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, TransferStatus::Completed);
        assert_eq!(entries[0].direction, Direction::Upload);
        assert_eq!(entries[0].bytes_transferred, 42);
        assert!(entries[0].error.is_none());
        assert_eq!(entries[1].status, TransferStatus::Failed);
        assert_eq!(entries[1].direction, Direction::Download);
        assert!(entries[1].error.as_deref().unwrap().contains("No such file"));
        assert_ne!(entries[0].transfer_id, entries[1].transfer_id);
    }
}
