//! Audit logger for writing audit entries to file.
//!
//! Writes structured audit entries as JSON lines (one JSON object per
//! line) for easy parsing by log analysis tools.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::DaemonError;

use super::entry::AuditEntry;

/// Logger for audit entries.
///
/// Thread-safe via internal mutex; entries are flushed to disk as they
/// are written.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Create a new audit logger that appends to the specified path,
    /// creating the parent directory if needed.
    pub fn new(path: &Path) -> Result<Self, DaemonError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit logger initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Log an audit entry as a single JSON line.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), DaemonError> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", json)?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        debug!(
            request_id = %entry.request_id,
            action = %entry.action,
            "Audit entry logged"
        );

        Ok(())
    }

    /// Log an entry, downgrading failures to a warning.
    ///
    /// Audit writes must never fail the request they describe.
    pub fn log_best_effort(&self, entry: &AuditEntry) {
        if let Err(e) = self.log(entry) {
            warn!(error = %e, action = %entry.action, "Failed to write audit log entry");
        }
    }

    /// Get the path to the audit log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
