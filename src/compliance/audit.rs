/// Append-only audit trail
///
/// One self-contained JSON object per line. The core only ever appends;
/// reading the trail back is an external collaborator's job.

use crate::compliance::ComplianceEvent;
use crate::error::{ProbeError, ProbeResult};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Single-writer audit log handle
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<File>,
}

impl AuditLog {
    /// Open (or create) the audit trail at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> ProbeResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("audit trail opened at {}", path.display());

        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Append one event as a single line
    pub fn append(&self, event: &ComplianceEvent) -> ProbeResult<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| ProbeError::fatal(format!("audit event serialization failed: {}", e)))?;

        let mut file = self
            .writer
            .lock()
            .map_err(|_| ProbeError::fatal("audit log writer poisoned"))?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        Ok(())
    }

    /// Location of the trail, for operator-facing messages
    pub fn path(&self) -> &Path {
        &self.path
    }
}
