// Analysis pipeline
// Decode -> condition -> extract -> predict, with an optional per-request trace

pub mod trace;

pub use trace::{read_trace_file, Stage, TraceEntry, TraceError, TraceWriter};

use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::audio::{
    condition, decode_file_at, extract_detailed, AudioError, ConditionReport, DecodeSource,
    Extraction, SignalStats, ANALYSIS_SAMPLE_RATE,
};
use crate::emotion::{predict_outcome, FeatureVector, ModelStore, PredictionResult};

/// Everything known about one analyzed recording
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub request_id: Uuid,
    pub path: PathBuf,
    pub decode_source: DecodeSource,

    /// Signal statistics after conditioning
    pub stats: SignalStats,
    pub conditioning: ConditionReport,
    pub extraction: Extraction,
    pub prediction: PredictionResult,

    /// Why prediction fell back, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_fallback: Option<String>,
}

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Rate used when the general decoder has to resample
    pub target_sample_rate: u32,

    /// Write a JSONL trace per analysis into this directory
    pub trace_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            target_sample_rate: ANALYSIS_SAMPLE_RATE,
            trace_dir: None,
        }
    }
}

/// Analyze a recording with default options
///
/// Only a missing or empty file is an error. Undecodable audio, failed feature
/// groups and a missing model all degrade to fallback values.
pub fn analyze_file(path: &Path, store: &ModelStore) -> Result<Analysis, AudioError> {
    analyze_file_with(path, store, &PipelineOptions::default())
}

pub fn analyze_file_with(
    path: &Path,
    store: &ModelStore,
    options: &PipelineOptions,
) -> Result<Analysis, AudioError> {
    let request_id = Uuid::new_v4();
    let trace = options
        .trace_dir
        .as_deref()
        .and_then(|dir| match TraceWriter::for_request(dir, request_id) {
            Ok(writer) => Some(writer),
            Err(e) => {
                log::warn!("Could not open trace in {}: {}", dir.display(), e);
                None
            }
        });
    let record = |entry: TraceEntry| {
        if let Some(writer) = &trace {
            if let Err(e) = writer.write(&entry) {
                log::warn!("Failed to write trace entry: {}", e);
            }
        }
    };

    let decoded = decode_file_at(path, options.target_sample_rate)?;
    record(
        TraceEntry::completed(request_id, Stage::Decode, "Decoded audio")
            .degraded(decoded.source == DecodeSource::Synthetic)
            .with_data(serde_json::json!({
                "source": decoded.source,
                "sample_rate": decoded.signal.sample_rate,
                "samples": decoded.signal.len(),
                "fallback_reasons": decoded.fallback_reasons,
            })),
    );

    let mut signal = decoded.signal;
    let conditioning = condition(&mut signal);
    record(
        TraceEntry::completed(request_id, Stage::Condition, "Conditioned signal")
            .with_data(serde_json::json!(conditioning)),
    );

    let extraction = extract_detailed(&signal);
    record(
        TraceEntry::completed(
            request_id,
            Stage::Extract,
            format!("Extracted {} features", extraction.features.as_slice().len()),
        )
        .degraded(extraction.is_degraded())
        .with_data(serde_json::json!({
            "fallback_groups": extraction.fallback_groups(),
            "catastrophic": extraction.catastrophic,
        })),
    );

    let outcome = predict_outcome(store, &extraction.features);
    record(
        TraceEntry::completed(
            request_id,
            Stage::Predict,
            format!(
                "Predicted {} ({})",
                outcome.result.label,
                outcome.result.confidence_percent()
            ),
        )
        .degraded(outcome.is_fallback())
        .with_data(serde_json::json!({
            "prediction": outcome.result,
            "fallback_cause": outcome.fallback_cause,
            "model_origin": store.get().origin,
        })),
    );

    Ok(Analysis {
        request_id,
        path: path.to_path_buf(),
        decode_source: decoded.source,
        stats: signal.stats(),
        conditioning,
        extraction,
        prediction: outcome.result,
        prediction_fallback: outcome.fallback_cause,
    })
}

/// Decode, condition and extract features without predicting
/// General decodes are resampled to `target_rate`
pub fn extract_file_at(path: &Path, target_rate: u32) -> Result<FeatureVector, AudioError> {
    let mut signal = decode_file_at(path, target_rate)?.signal;
    condition(&mut signal);
    Ok(extract_detailed(&signal).features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{Emotion, LoadedModels};
    use std::fs;
    use tempfile::tempdir;

    fn write_silence(path: &Path, sample_rate: u32, n: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..n {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_analyze_silence_with_trace() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("silence.wav");
        write_silence(&wav, 16000, 32000);

        let store = ModelStore::with_models(dir.path(), LoadedModels::placeholder());
        let options = PipelineOptions {
            trace_dir: Some(dir.path().join("traces")),
            ..PipelineOptions::default()
        };

        let analysis = analyze_file_with(&wav, &store, &options).unwrap();
        assert_eq!(analysis.decode_source, DecodeSource::Wav);
        assert_eq!(analysis.conditioning.padded_samples, 0);
        assert_eq!(analysis.prediction.label, Emotion::Neutral);
        assert!(analysis.prediction_fallback.is_some());

        let trace_path = dir
            .path()
            .join("traces")
            .join(format!("trace_{}.jsonl", analysis.request_id));
        let entries = read_trace_file(&trace_path).unwrap();
        let stages: Vec<Stage> = entries.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Decode, Stage::Condition, Stage::Extract, Stage::Predict]
        );
        assert!(entries[3].degraded);
    }

    #[test]
    fn test_short_recording_is_padded() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("short.wav");
        write_silence(&wav, 8000, 2000);

        let store = ModelStore::with_models(dir.path(), LoadedModels::placeholder());
        let analysis = analyze_file(&wav, &store).unwrap();

        assert_eq!(analysis.conditioning.padded_samples, 6000);
        assert_eq!(analysis.stats.duration_secs, 1.0);
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("empty.wav");
        fs::write(&wav, b"").unwrap();

        let store = ModelStore::with_models(dir.path(), LoadedModels::placeholder());
        assert!(matches!(
            analyze_file(&wav, &store),
            Err(AudioError::EmptyInput(_))
        ));
        assert!(matches!(
            extract_file_at(&wav, ANALYSIS_SAMPLE_RATE),
            Err(AudioError::EmptyInput(_))
        ));
    }
}
