//! Flush destinations
//!
//! 내보내기 대상은 lease 단위로 획득한다. commit 전에 lease가 drop되면
//! (직렬화 도중 실패 포함) 그때까지 쓴 내용은 버려지고 대상은 원래 상태로 남는다.

use serde::{Deserialize, Serialize};
use std::fs::{remove_file, rename, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::RecorderError;

/// Export encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// MessagePack + LZ4 + SHA-256 trailer
    Compact,
}

/// Scoped write access to a destination
pub trait DestinationLease: Write {
    /// Make everything written so far visible. Dropping without commit discards it.
    fn commit(self: Box<Self>) -> Result<(), RecorderError>;
}

pub trait RecordDestination {
    fn acquire(&mut self) -> Result<Box<dyn DestinationLease + '_>, RecorderError>;

    fn describe(&self) -> String;
}

// ============================================================================
// File
// ============================================================================

/// Atomic file destination: temp file, fsync, rename
#[derive(Debug, Clone)]
pub struct FileDestination {
    path: PathBuf,
}

impl FileDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct FileLease {
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: usize,
}

impl Write for FileLease {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self.file.as_mut().ok_or_else(|| io::Error::new(io::ErrorKind::Other, "lease closed"))?;
        let n = file.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl DestinationLease for FileLease {
    fn commit(mut self: Box<Self>) -> Result<(), RecorderError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        rename(&self.temp_path, &self.final_path)?;
        log::info!("Assessment record written to {:?} ({} bytes)", self.final_path, self.written);
        // renamed away; nothing left for Drop to clean up
        self.temp_path = PathBuf::new();
        Ok(())
    }
}

impl Drop for FileLease {
    fn drop(&mut self) {
        self.file.take();
        if !self.temp_path.as_os_str().is_empty() && self.temp_path.exists() {
            if let Err(err) = remove_file(&self.temp_path) {
                log::warn!("Failed to discard partial record {:?}: {}", self.temp_path, err);
            } else {
                log::debug!("Discarded partial record {:?}", self.temp_path);
            }
        }
    }
}

impl RecordDestination for FileDestination {
    fn acquire(&mut self) -> Result<Box<dyn DestinationLease + '_>, RecorderError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let temp_path = self.path.with_extension("tmp");
        let file = File::create(&temp_path)?;
        Ok(Box::new(FileLease { file: Some(file), temp_path, final_path: self.path.clone(), written: 0 }))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory destination; keeps the last committed payload
#[derive(Debug, Default)]
pub struct MemoryDestination {
    committed: Option<Vec<u8>>,
    /// Writes beyond this many bytes fail (simulated full disk)
    fail_after: Option<usize>,
    acquired: usize,
    released: usize,
    commits: usize,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(bytes: usize) -> Self {
        Self { fail_after: Some(bytes), ..Self::default() }
    }

    pub fn committed(&self) -> Option<&[u8]> {
        self.committed.as_deref()
    }

    /// Leases currently held
    pub fn open_leases(&self) -> usize {
        self.acquired - self.released
    }

    pub fn commits(&self) -> usize {
        self.commits
    }
}

struct MemoryLease<'a> {
    dest: &'a mut MemoryDestination,
    buf: Vec<u8>,
}

impl Write for MemoryLease<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(limit) = self.dest.fail_after {
            if self.buf.len() + data.len() > limit {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "destination full"));
            }
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DestinationLease for MemoryLease<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), RecorderError> {
        let data = std::mem::take(&mut self.buf);
        self.dest.committed = Some(data);
        self.dest.commits += 1;
        Ok(())
    }
}

impl Drop for MemoryLease<'_> {
    fn drop(&mut self) {
        self.dest.released += 1;
    }
}

impl RecordDestination for MemoryDestination {
    fn acquire(&mut self) -> Result<Box<dyn DestinationLease + '_>, RecorderError> {
        self.acquired += 1;
        Ok(Box::new(MemoryLease { dest: self, buf: Vec::new() }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
