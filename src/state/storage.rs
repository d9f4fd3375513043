// File system operations for stored recordings
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the app data directory for Vocalis
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join("com.vocalis.app");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Dated upload directory under `root`: audio_uploads/YYYY/MM/DD
pub fn get_upload_dir(root: &Path, at: DateTime<Utc>) -> StorageResult<PathBuf> {
    let dir = root
        .join("audio_uploads")
        .join(at.format("%Y").to_string())
        .join(at.format("%m").to_string())
        .join(at.format("%d").to_string());
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Store recording bytes under `root` and return the path and SHA256 hash
pub fn store_recording(root: &Path, data: &[u8]) -> StorageResult<(PathBuf, String)> {
    let dir = get_upload_dir(root, Utc::now())?;
    let file_path = dir.join(format!("recording_{}.wav", Uuid::new_v4()));

    let mut file = fs::File::create(&file_path)?;
    file.write_all(data)?;

    Ok((file_path, calculate_sha256(data)))
}

/// Read a file from disk
pub fn read_file(path: &Path) -> StorageResult<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
