/// Per-session structured log
///
/// Each template execution writes its own JSON-lines log so a session can
/// be audited independently of the process log. Entries are
/// `{timestamp, level, component, message, data}`; DEBUG entries are only
/// written when the session is verbose.

use crate::error::{ProbeError, ProbeResult};
use chrono::Utc;
use serde_json::{json, Value};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Structured session log handle
pub struct SessionLog {
    path: PathBuf,
    verbose: bool,
    writer: Mutex<File>,
}

impl SessionLog {
    /// Create the log file for a session
    pub fn create<P: AsRef<Path>>(dir: P, session_id: &str, verbose: bool) -> ProbeResult<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        let path = dir.join(format!("{}.jsonl", session_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            verbose,
            writer: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// INFO entry
    pub fn info(&self, component: &str, message: &str, data: Value) {
        self.write("info", component, message, data);
    }

    /// DEBUG entry, dropped unless the session is verbose
    pub fn debug(&self, component: &str, message: &str, data: Value) {
        if self.verbose {
            self.write("debug", component, message, data);
        }
    }

    /// ERROR entry
    pub fn error(&self, component: &str, message: &str, data: Value) {
        self.write("error", component, message, data);
    }

    fn write(&self, level: &str, component: &str, message: &str, data: Value) {
        let entry = json!({
            "timestamp": Utc::now(),
            "level": level,
            "component": component,
            "message": message,
            "data": data,
        });

        if let Ok(mut file) = self.writer.lock() {
            let _ = writeln!(file, "{}", entry);
            let _ = file.flush();
        }
    }

    /// Fallible variant used where a lost entry matters
    pub fn try_info(&self, component: &str, message: &str, data: Value) -> ProbeResult<()> {
        let entry = json!({
            "timestamp": Utc::now(),
            "level": "info",
            "component": component,
            "message": message,
            "data": data,
        });
        let mut file = self
            .writer
            .lock()
            .map_err(|_| ProbeError::fatal("session log writer poisoned"))?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}
