use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::session::Direction;

pub trait Logger: Send + Sync {
    fn start(&self, _direction: Direction, _local: &Path, _remote: &str) {}
    fn dir_enter(&self, _local: &Path, _remote: &str) {}
    fn file_done(&self, _local: &Path, _remote: &str, _bytes: u64) {}
    fn error(&self, _context: &str, _path: &Path, _msg: &str) {}
    fn done(&self, _files: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Human-readable progress on stderr (`--verbose`).
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn start(&self, direction: Direction, local: &Path, remote: &str) {
        match direction {
            Direction::Upload => eprintln!("upload {} -> {}", local.display(), remote),
            Direction::Download => eprintln!("download {} -> {}", remote, local.display()),
        }
    }
    fn dir_enter(&self, local: &Path, _remote: &str) {
        eprintln!("  dir  {}", local.display());
    }
    fn file_done(&self, local: &Path, _remote: &str, bytes: u64) {
        eprintln!("  file {} ({} bytes)", local.display(), bytes);
    }
    fn error(&self, context: &str, path: &Path, msg: &str) {
        eprintln!("  error [{}] {}: {}", context, path.display(), msg);
    }
    fn done(&self, files: u64, bytes: u64, seconds: f64) {
        eprintln!("done: {files} files, {bytes} bytes in {seconds:.3}s");
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn start(&self, direction: Direction, local: &Path, remote: &str) {
        self.line(&format!(
            "START dir={} local={} remote={}",
            direction,
            local.display(),
            remote
        ));
    }
    fn dir_enter(&self, local: &Path, remote: &str) {
        self.line(&format!("DIR local={} remote={}", local.display(), remote));
    }
    fn file_done(&self, local: &Path, remote: &str, bytes: u64) {
        self.line(&format!(
            "FILE local={} remote={} bytes={}",
            local.display(),
            remote,
            bytes
        ));
    }
    fn error(&self, context: &str, path: &Path, msg: &str) {
        self.line(&format!("ERROR ctx={} path={} msg={}", context, path.display(), msg));
    }
    fn done(&self, files: u64, bytes: u64, seconds: f64) {
        self.line(&format!("DONE files={files} bytes={bytes} seconds={seconds:.3}"));
    }
}
