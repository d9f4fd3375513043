// State management module
// Handles SQLite persistence of recordings and analyses, and file storage

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, open_in_memory, DbConnection, DbError};
pub use models::{AnalysisRecord, EmotionCount, Recording, RecordingSource};
pub use queries::{
    create_analysis, create_recording, emotion_counts, get_analysis, get_recording,
    list_recent_analyses,
};
pub use storage::{
    calculate_sha256, get_app_data_dir, read_file, store_recording, StorageError,
};
