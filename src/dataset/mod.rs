// Dataset module
// Labeled sample discovery for known emotional speech corpora, and evaluation against them

pub mod catalog;
pub mod evaluate;

pub use catalog::{
    collect_dataset, collect_samples, count_by_emotion, label_from_path, list_datasets,
    samples_for, DatasetInfo, DatasetKind, Sample,
};
pub use evaluate::{evaluate, EmotionScore, EvaluationReport, SampleResult};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataset directory not found: {0}")]
    NotFound(PathBuf),
}
