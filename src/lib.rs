// Vocalis - Speech emotion recognition
// Module declarations

pub mod audio;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod emotion;
pub mod pipeline;
pub mod state;

pub use audio::{decode_file, extract, AudioError};
pub use config::AppConfig;
pub use emotion::{predict, Emotion, FeatureVector, ModelStore, PredictionResult};
pub use pipeline::{analyze_file, Analysis};
