use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::record::PromotionRecord;
use super::DatasetError;

const HISTORY_FILE: &str = "promotion_history.jsonl";

/// Append-only JSONL log of promotion decisions
pub struct HistoryWriter {
    file: Mutex<Option<File>>,
    path: PathBuf,
}

impl HistoryWriter {
    pub fn new(base_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(base_dir)?;
        Ok(Self {
            file: Mutex::new(None),
            path: base_dir.join(HISTORY_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &PromotionRecord) -> Result<(), DatasetError> {
        let mut guard = self.file.lock();

        if guard.is_none() {
            *guard = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }

        if let Some(file) = guard.as_mut() {
            let json = serde_json::to_string(record)?;
            writeln!(file, "{}", json)?;
            file.flush()?;
        }

        Ok(())
    }

    /// All records, oldest first. Unparsable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<PromotionRecord>, DatasetError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping corrupt history line: {}", e),
            }
        }
        Ok(records)
    }
}
