//! Append-only audit trail
//!
//! One JSON object per line: `{file, user, action, timestamp}`.

use chrono::Utc;
use openpermit_core::effects::{AuditEntry, AuditSink, WorkflowError};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// JSON-lines audit log on disk
#[derive(Debug)]
pub struct AuditTrail {
    log_file: PathBuf,
    append: Mutex<()>,
}

impl AuditTrail {
    /// Audit trail writing to `log_file`; the file is created on first record
    pub fn new(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            append: Mutex::new(()),
        }
    }

    /// Path of the log file
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Record `action` by `user` on `file`, stamped now
    pub fn record_action(
        &self,
        file: impl AsRef<Path>,
        user: &str,
        action: &str,
    ) -> Result<(), WorkflowError> {
        self.record(AuditEntry {
            file: file.as_ref().display().to_string(),
            user: user.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Every entry in the log; a missing log reads as empty
    pub fn read(&self) -> Result<Vec<AuditEntry>, WorkflowError> {
        let file = match std::fs::File::open(&self.log_file) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkflowError::io(&self.log_file, e)),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| WorkflowError::io(&self.log_file, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line)
                .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl AuditSink for AuditTrail {
    fn record(&self, entry: AuditEntry) -> Result<(), WorkflowError> {
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| WorkflowError::Serialization(e.to_string()))?;
        line.push('\n');

        let _guard = self.append.lock();
        if let Some(parent) = self.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| WorkflowError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(|e| WorkflowError::io(&self.log_file, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| WorkflowError::io(&self.log_file, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::new(dir.path().join("audit.log"));
        assert!(trail.read().unwrap().is_empty());
    }

    #[test]
    fn records_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::new(dir.path().join("nested/audit.log"));

        trail.record_action("submissions/P-1.json", "alice", "create").unwrap();
        trail.record_action("submissions/P-1.json", "bob", "update").unwrap();

        let entries = trail.read().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].user, "alice");
        assert_eq!(entries[0].action, "create");
        assert_eq!(entries[1].action, "update");
        assert_eq!(entries[1].file, "submissions/P-1.json");
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }
}
