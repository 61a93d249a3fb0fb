//! Append-only signal history as JSON lines

use crate::signal::HistoryRecord;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_FILE: &str = "signals.jsonl";

#[derive(Debug, Clone)]
pub struct JsonlHistory {
    path: PathBuf,
}

impl JsonlHistory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file {}", self.path.display()))?;

        let line = serde_json::to_string(record).context("Failed to serialize history record")?;
        writeln!(file, "{}", line).context("Failed to write history record")?;

        debug!("Appended {} {} to {}", record.symbol, record.decision, self.path.display());
        Ok(())
    }

    /// Most recent `limit` records, newest first. A missing file is an empty history.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open history file {}", self.path.display()))
            }
        };

        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read history file")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping history line {}: {}", n + 1, e),
            }
        }

        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}
