use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const LOG_FILE_NAME: &str = "log.jsonl";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("log serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("corrupt log at line {line}: {detail}")]
    Corrupt { line: usize, detail: String },
}

/// Where a log entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOrigin {
    Voice,
    Text,
}

/// One line of the session log.
///
/// Lines are committed in transcription-arrival order, which can differ
/// from capture order under inference latency; `start_ts` preserves
/// capture order for consumers that need it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub user_id: String,
    pub display_name: String,
    pub start_ts: f64,
    pub end_ts: f64,
    pub origin: LogOrigin,
    pub text: String,
}

/// Append-only JSON-lines session log. One writer per session; every
/// record is flushed before `append` returns. The log is the session's
/// consistency boundary: callers treat a write error as fatal.
pub struct SessionLog {
    path: PathBuf,
    file: File,
}

impl SessionLog {
    /// Opens (creating if needed) `<dir>/log.jsonl` for appending.
    pub fn open(dir: &Path) -> Result<Self, LogError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn append(&mut self, entry: &LogEntry) -> Result<(), LogError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads a session log back, tolerating a single malformed trailing
/// line (a write the process died in the middle of). Any other parse
/// failure reports the offending line number.
pub fn read_log(path: &Path) -> Result<Vec<LogEntry>, LogError> {
    let content = std::fs::read_to_string(path)?;

    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let mut entries = Vec::with_capacity(lines.len());
    for (pos, (line_no, line)) in lines.iter().enumerate() {
        match serde_json::from_str::<LogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) if pos + 1 == lines.len() => {
                warn!(
                    line = line_no,
                    error = %e,
                    "dropping malformed trailing log line (interrupted write)"
                );
            }
            Err(e) => {
                return Err(LogError::Corrupt {
                    line: *line_no,
                    detail: e.to_string(),
                });
            }
        }
    }
    Ok(entries)
}
