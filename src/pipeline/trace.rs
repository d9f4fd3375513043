// Pipeline progress tracing
// Append-only JSONL trace per analysis: one line per stage, with the decode strategy
// and any fallbacks recorded as structured data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Analysis stage a trace entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Decode,
    Condition,
    Extract,
    Predict,
}

impl Stage {
    /// Overall progress once this stage completes
    pub fn progress(&self) -> f32 {
        match self {
            Stage::Decode => 0.25,
            Stage::Condition => 0.5,
            Stage::Extract => 0.75,
            Stage::Predict => 1.0,
        }
    }
}

/// A single line in the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,

    /// Analysis this entry belongs to
    pub request_id: Uuid,

    pub stage: Stage,

    /// Progress [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// True when the stage substituted fallback data
    #[serde(default)]
    pub degraded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Entry marking `stage` complete
    pub fn completed(request_id: Uuid, stage: Stage, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now(),
            request_id,
            stage,
            progress: stage.progress(),
            message: message.into(),
            degraded: false,
            data: None,
        }
    }

    pub fn degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Append-only JSONL trace file
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Writer for `trace_<request_id>.jsonl` inside `dir`, creating the directory
    pub fn for_request(dir: &Path, request_id: Uuid) -> Result<Self, TraceError> {
        fs::create_dir_all(dir)?;
        Ok(TraceWriter::new(dir.join(format!("trace_{}.jsonl", request_id))))
    }

    /// Append an entry, creating the file if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        file.write_all(entry.to_json_line()?.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_progress_follows_stage() {
        let id = Uuid::new_v4();
        assert_eq!(TraceEntry::completed(id, Stage::Decode, "ok").progress, 0.25);
        assert_eq!(TraceEntry::completed(id, Stage::Predict, "ok").progress, 1.0);
    }

    #[test]
    fn test_entry_with_data() {
        let entry = TraceEntry::completed(Uuid::new_v4(), Stage::Decode, "Decoded")
            .degraded(true)
            .with_data(serde_json::json!({ "source": "synthetic" }));

        assert!(entry.degraded);
        assert_eq!(entry.data.unwrap()["source"], "synthetic");
    }

    #[test]
    fn test_writer_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let id = Uuid::new_v4();
        let writer = TraceWriter::for_request(&temp_dir.path().join("traces"), id).unwrap();

        writer
            .write(&TraceEntry::completed(id, Stage::Decode, "Decoded"))
            .unwrap();
        writer
            .write(&TraceEntry::completed(id, Stage::Predict, "Predicted").degraded(true))
            .unwrap();

        assert!(writer.path().ends_with(format!("trace_{}.jsonl", id)));

        let entries = read_trace_file(writer.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, Stage::Decode);
        assert_eq!(entries[0].request_id, id);
        assert!(!entries[0].degraded);
        assert!(entries[1].degraded);
    }

    #[test]
    fn test_json_line_format() {
        let entry = TraceEntry::completed(Uuid::new_v4(), Stage::Extract, "Extracted");
        let json_line = entry.to_json_line().unwrap();

        assert!(json_line.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(json_line.trim()).unwrap();
        assert_eq!(parsed["stage"], "extract");
        assert!(parsed.get("data").is_none());
    }
}
