// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{AnalysisRecord, EmotionCount, Recording, RecordingSource};
use crate::emotion::{Emotion, PredictionResult};

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&row.get::<_, String>(idx)?).map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    row.get::<_, String>(idx)?
        .parse::<DateTime<Utc>>()
        .map_err(|e| conversion_error(idx, e))
}

fn get_emotion(row: &Row<'_>, idx: usize) -> rusqlite::Result<Emotion> {
    row.get::<_, String>(idx)?
        .parse::<Emotion>()
        .map_err(|e| conversion_error(idx, e))
}

// ==================== RECORDING QUERIES ====================

/// Register a stored recording
pub fn create_recording(
    db: &DbConnection,
    file_path: String,
    source: RecordingSource,
    sha256: String,
    bytes: i64,
    dataset: Option<String>,
) -> DbResult<Recording> {
    let recording = Recording {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        file_path,
        source,
        sha256,
        bytes,
        dataset,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO recordings (id, created_at, file_path, source, sha256, bytes, dataset)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            recording.id.to_string(),
            recording.created_at.to_rfc3339(),
            recording.file_path,
            recording.source.as_str(),
            recording.sha256,
            recording.bytes,
            recording.dataset,
        ],
    )?;

    Ok(recording)
}

/// Get a recording by ID
pub fn get_recording(db: &DbConnection, id: &Uuid) -> DbResult<Option<Recording>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, created_at, file_path, source, sha256, bytes, dataset
         FROM recordings WHERE id = ?1",
    )?;

    let result = stmt.query_row([id.to_string()], |row| {
        Ok(Recording {
            id: get_uuid(row, 0)?,
            created_at: get_timestamp(row, 1)?,
            file_path: row.get(2)?,
            source: RecordingSource::from_string(&row.get::<_, String>(3)?),
            sha256: row.get(4)?,
            bytes: row.get(5)?,
            dataset: row.get(6)?,
        })
    });

    match result {
        Ok(recording) => Ok(Some(recording)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==================== ANALYSIS QUERIES ====================

/// Store the prediction made for a recording
pub fn create_analysis(
    db: &DbConnection,
    recording_id: Uuid,
    prediction: &PredictionResult,
) -> DbResult<AnalysisRecord> {
    let record = AnalysisRecord {
        id: Uuid::new_v4(),
        recording_id,
        created_at: Utc::now(),
        emotion: prediction.label,
        confidence: prediction.confidence,
        distribution: prediction.distribution.clone(),
    };
    let distribution = serde_json::to_string(&record.distribution)?;

    let conn = db.lock();
    conn.execute(
        "INSERT INTO analyses (id, recording_id, created_at, emotion, confidence, distribution)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id.to_string(),
            record.recording_id.to_string(),
            record.created_at.to_rfc3339(),
            record.emotion.as_str(),
            record.confidence as f64,
            distribution,
        ],
    )?;

    Ok(record)
}

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let distribution: String = row.get(5)?;
    Ok(AnalysisRecord {
        id: get_uuid(row, 0)?,
        recording_id: get_uuid(row, 1)?,
        created_at: get_timestamp(row, 2)?,
        emotion: get_emotion(row, 3)?,
        confidence: row.get::<_, f64>(4)? as f32,
        distribution: serde_json::from_str(&distribution).map_err(|e| conversion_error(5, e))?,
    })
}

/// Get an analysis by ID
pub fn get_analysis(db: &DbConnection, id: &Uuid) -> DbResult<Option<AnalysisRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, recording_id, created_at, emotion, confidence, distribution
         FROM analyses WHERE id = ?1",
    )?;

    match stmt.query_row([id.to_string()], analysis_from_row) {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Most recent analyses, newest first
pub fn list_recent_analyses(db: &DbConnection, limit: usize) -> DbResult<Vec<AnalysisRecord>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, recording_id, created_at, emotion, confidence, distribution
         FROM analyses
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?1",
    )?;

    let records = stmt
        .query_map([limit as i64], analysis_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Number of analyses per predicted emotion, most frequent first
pub fn emotion_counts(db: &DbConnection) -> DbResult<Vec<EmotionCount>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT emotion, COUNT(*) AS n
         FROM analyses
         GROUP BY emotion
         ORDER BY n DESC, emotion ASC",
    )?;

    let counts = stmt
        .query_map([], |row| {
            Ok(EmotionCount {
                emotion: get_emotion(row, 0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(counts)
}
