// Data models for recordings and their analyses
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::emotion::Emotion;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub file_path: String,
    pub source: RecordingSource,
    pub sha256: String,
    pub bytes: i64,

    /// Dataset id for samples taken from a known corpus
    pub dataset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingSource {
    Upload,
    Record,
    Sample,
}

impl RecordingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingSource::Upload => "upload",
            RecordingSource::Record => "record",
            RecordingSource::Sample => "sample",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "record" => RecordingSource::Record,
            "sample" => RecordingSource::Sample,
            _ => RecordingSource::Upload,
        }
    }
}

impl FromStr for RecordingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upload" => Ok(RecordingSource::Upload),
            "record" => Ok(RecordingSource::Record),
            "sample" => Ok(RecordingSource::Sample),
            other => Err(format!("unknown recording source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub emotion: Emotion,
    pub confidence: f32,
    pub distribution: BTreeMap<Emotion, f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionCount {
    pub emotion: Emotion,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parsing() {
        assert_eq!("Sample".parse::<RecordingSource>(), Ok(RecordingSource::Sample));
        assert_eq!("record".parse::<RecordingSource>(), Ok(RecordingSource::Record));
        assert!("microphone".parse::<RecordingSource>().is_err());

        // Stored values never fail to load
        assert_eq!(RecordingSource::from_string("legacy"), RecordingSource::Upload);
    }
}
