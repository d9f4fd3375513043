// Audio processing module
// Decoding, conditioning and acoustic feature extraction

pub mod condition;
pub mod features;
pub mod ingest;
pub mod signal;
pub mod spectral;

pub use condition::{condition, ConditionReport};
pub use features::{
    extract, extract_detailed, random_features, try_extract, Extraction, FeatureError,
    FeatureGroup, GroupOutcome, FEATURE_GROUPS,
};
pub use ingest::{decode_file, decode_file_at, ingest_wav, AudioData, AudioError, DecodeSource, Decoded};
pub use signal::{Signal, SignalStats, ANALYSIS_SAMPLE_RATE};
