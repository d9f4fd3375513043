// Command handlers
// One function per CLI subcommand; main.rs only parses arguments and prints
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::dataset::{self, DatasetInfo, DatasetKind, EvaluationReport, Sample};
use crate::emotion::{
    self, bootstrap, Classifier, Emotion, FeatureScaler, FeatureVector, ModelInfo, ModelStore,
    TrainingOptions, TrainingReport, FEATURE_COUNT,
};
use crate::pipeline::{self, Analysis, PipelineOptions};
use crate::state::{
    self, AnalysisRecord, DbConnection, EmotionCount, Recording, RecordingSource,
};

/// Resolved configuration plus the lazily loaded model store
pub struct AppContext {
    pub config: AppConfig,
    pub store: ModelStore,
    model_dir: PathBuf,
}

impl AppContext {
    /// `model_dir` overrides the configured model directory
    pub fn new(config: AppConfig, model_dir: Option<PathBuf>) -> Result<Self> {
        let model_dir = match model_dir {
            Some(dir) => dir,
            None => config
                .resolved_model_dir()
                .context("Failed to resolve model directory")?,
        };
        let store = ModelStore::new(&model_dir, config.bootstrap_if_missing);

        Ok(AppContext {
            config,
            store,
            model_dir,
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            target_sample_rate: self.config.target_sample_rate,
            trace_dir: self.config.trace_dir.clone(),
        }
    }

    pub fn open_db(&self) -> Result<DbConnection> {
        let path = self
            .config
            .resolved_database_path()
            .context("Failed to resolve database path")?;
        state::init_db(&path).with_context(|| format!("Failed to open database {}", path.display()))
    }
}

// ==================== ANALYSIS ====================

#[derive(Debug, Serialize)]
pub struct AnalyzeOutput {
    pub analysis: Analysis,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<Recording>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AnalysisRecord>,
}

/// How a recorded analysis is filed
#[derive(Debug, Clone, Copy)]
pub struct RecordOptions {
    pub source: RecordingSource,

    /// Corpus the file was taken from, for `RecordingSource::Sample`
    pub dataset: Option<DatasetKind>,
}

impl Default for RecordOptions {
    fn default() -> Self {
        RecordOptions {
            source: RecordingSource::Upload,
            dataset: None,
        }
    }
}

/// Analyze a file; with `record`, the file is copied into storage and both
/// the recording and the prediction are saved
///
/// The file is analyzed before anything is written, so a missing or empty file
/// leaves storage and the database untouched.
pub fn analyze(
    ctx: &AppContext,
    path: &Path,
    record: Option<RecordOptions>,
) -> Result<AnalyzeOutput> {
    let analysis = pipeline::analyze_file_with(path, &ctx.store, &ctx.pipeline_options())?;

    let Some(options) = record else {
        return Ok(AnalyzeOutput {
            analysis,
            recording: None,
            record: None,
        });
    };

    let data =
        state::read_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let storage_dir = ctx
        .config
        .resolved_storage_dir()
        .context("Failed to resolve storage directory")?;
    let (stored_path, sha256) = state::store_recording(&storage_dir, &data)?;
    log::info!("Stored recording at {}", stored_path.display());

    let db = ctx.open_db()?;
    let recording = state::create_recording(
        &db,
        stored_path.to_string_lossy().to_string(),
        options.source,
        sha256,
        data.len() as i64,
        options.dataset.map(|kind| kind.id().to_string()),
    )?;
    let analysis_record = state::create_analysis(&db, recording.id, &analysis.prediction)?;

    Ok(AnalyzeOutput {
        analysis,
        recording: Some(recording),
        record: Some(analysis_record),
    })
}

/// Named feature values for a file, decoded at the configured rate
pub fn features(ctx: &AppContext, path: &Path) -> Result<Vec<(String, f32)>> {
    let features: FeatureVector = pipeline::extract_file_at(path, ctx.config.target_sample_rate)?;
    Ok(features.named())
}

// ==================== DATASETS ====================

#[derive(Debug, Serialize)]
pub struct DatasetOverview {
    pub datasets: Vec<DatasetInfo>,

    /// Labeled samples per emotion across all corpora
    pub by_emotion: BTreeMap<Emotion, usize>,
}

pub fn datasets(datasets_root: &Path) -> Result<DatasetOverview> {
    if !datasets_root.is_dir() {
        bail!("Dataset directory not found: {}", datasets_root.display());
    }
    Ok(DatasetOverview {
        datasets: dataset::list_datasets(datasets_root)?,
        by_emotion: dataset::count_by_emotion(datasets_root)?,
    })
}

/// A random selection of labeled samples from one corpus
pub fn samples(
    datasets_root: &Path,
    kind: DatasetKind,
    emotion: Option<Emotion>,
    limit: usize,
) -> Result<Vec<Sample>> {
    Ok(dataset::samples_for(
        datasets_root,
        kind,
        emotion,
        limit,
        &mut rand::thread_rng(),
    )?)
}

// ==================== CONFIG ====================

/// Write the effective configuration to `path`; an existing file is kept unless `force`
pub fn init_config(ctx: &AppContext, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    ctx.config
        .save(path)
        .with_context(|| format!("Failed to write config {}", path.display()))?;
    log::info!("Wrote config to {}", path.display());
    Ok(())
}

// ==================== MODEL ====================

pub fn evaluate(ctx: &AppContext, datasets_root: &Path) -> Result<EvaluationReport> {
    let samples = dataset::collect_samples(datasets_root)?;
    Ok(dataset::evaluate(&samples, &ctx.store))
}

/// Train on every labeled sample under `datasets_root` and save to the model dir
pub fn train(ctx: &AppContext, datasets_root: &Path) -> Result<TrainingReport> {
    let samples = dataset::collect_samples(datasets_root)?;
    let options = TrainingOptions {
        target_sample_rate: ctx.config.target_sample_rate,
        ..TrainingOptions::default()
    };
    let trained = emotion::train(&samples, &options)?;

    ModelStore::save_artifacts(ctx.model_dir(), &trained.classifier, &trained.scaler)?;
    log::info!(
        "Saved trained model to {} (held-out accuracy {:.1}%)",
        ctx.model_dir().display(),
        trained.report.test_accuracy * 100.0
    );

    Ok(trained.report)
}

/// Write a synthetic placeholder model, replacing any existing artifacts
pub fn bootstrap_model(ctx: &AppContext) -> Result<PathBuf> {
    let forest = bootstrap::train_placeholder()?;
    let classifier = Classifier::from_forest(forest)?;
    ModelStore::save_artifacts(
        ctx.model_dir(),
        &classifier,
        &FeatureScaler::identity(FEATURE_COUNT),
    )?;
    Ok(ctx.store.model_path())
}

pub fn model_info(ctx: &AppContext) -> ModelInfo {
    ctx.store.info()
}

// ==================== HISTORY ====================

#[derive(Debug, Serialize)]
pub struct History {
    pub recent: Vec<AnalysisRecord>,
    pub counts: Vec<EmotionCount>,
}

pub fn history(ctx: &AppContext, limit: usize) -> Result<History> {
    let db = ctx.open_db()?;
    Ok(History {
        recent: state::list_recent_analyses(&db, limit)?,
        counts: state::emotion_counts(&db)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::emotion::ModelOrigin;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn context(dir: &TempDir) -> AppContext {
        let config = AppConfig {
            model_dir: Some(dir.path().join("model")),
            bootstrap_if_missing: false,
            database_path: Some(dir.path().join("vocalis.db")),
            storage_dir: Some(dir.path().join("storage")),
            ..AppConfig::default()
        };
        AppContext::new(config, None).unwrap()
    }

    fn write_silence(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..16000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_model_dir_override() {
        let dir = tempdir().unwrap();
        let ctx = AppContext::new(AppConfig::default(), Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(ctx.model_dir(), dir.path());
        assert_eq!(ctx.store.model_dir(), dir.path());
    }

    #[test]
    fn test_analyze_and_record() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let wav = dir.path().join("input.wav");
        write_silence(&wav);

        let output = analyze(&ctx, &wav, Some(RecordOptions::default())).unwrap();
        let recording = output.recording.unwrap();
        assert!(Path::new(&recording.file_path).starts_with(dir.path().join("storage")));
        assert_eq!(recording.source, RecordingSource::Upload);
        assert_eq!(recording.dataset, None);
        assert_eq!(recording.sha256, state::calculate_sha256(&fs::read(&wav).unwrap()));

        // No artifacts and no bootstrap: the fallback result is stored
        let record = output.record.unwrap();
        assert_eq!(record.emotion, Emotion::Neutral);
        assert_eq!(record.recording_id, recording.id);

        let history = history(&ctx, 10).unwrap();
        assert_eq!(history.recent.len(), 1);
        assert_eq!(history.counts[0].emotion, Emotion::Neutral);
    }

    #[test]
    fn test_analyze_without_record_leaves_no_database() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let wav = dir.path().join("input.wav");
        write_silence(&wav);

        let output = analyze(&ctx, &wav, None).unwrap();
        assert!(output.recording.is_none());
        assert!(!dir.path().join("vocalis.db").exists());
    }

    #[test]
    fn test_record_sample_source_and_dataset() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let wav = dir.path().join("03-01-04-01-01-01-01.wav");
        write_silence(&wav);

        let options = RecordOptions {
            source: RecordingSource::Sample,
            dataset: Some(DatasetKind::Ravdess),
        };
        let recording = analyze(&ctx, &wav, Some(options)).unwrap().recording.unwrap();
        assert_eq!(recording.source, RecordingSource::Sample);
        assert_eq!(recording.dataset.as_deref(), Some("ravdess"));

        let db = ctx.open_db().unwrap();
        let stored = state::get_recording(&db, &recording.id).unwrap().unwrap();
        assert_eq!(stored.source, RecordingSource::Sample);
    }

    #[test]
    fn test_empty_upload_is_not_stored() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let wav = dir.path().join("empty.wav");
        fs::write(&wav, b"").unwrap();

        let err = analyze(&ctx, &wav, Some(RecordOptions::default())).unwrap_err();
        assert!(matches!(err.downcast_ref::<AudioError>(), Some(AudioError::EmptyInput(_))));
        assert!(!dir.path().join("storage").exists());
        assert!(!dir.path().join("vocalis.db").exists());
    }

    #[test]
    fn test_missing_upload_reports_not_found() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);

        let err = analyze(&ctx, &dir.path().join("absent.wav"), Some(RecordOptions::default()))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<AudioError>(), Some(AudioError::NotFound(_))));
        assert!(!dir.path().join("storage").exists());
    }

    #[test]
    fn test_features_are_named() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let wav = dir.path().join("input.wav");
        write_silence(&wav);

        let named = features(&ctx, &wav).unwrap();
        assert_eq!(named.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_features_follow_configured_rate() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("not-a-wav.bin");
        fs::write(&wav, b"definitely not audio").unwrap();

        // Undecodable input still yields a full vector through the configured decoder
        let ctx = AppContext::new(
            AppConfig {
                target_sample_rate: 16000,
                ..AppConfig::default()
            },
            Some(dir.path().join("model")),
        )
        .unwrap();
        assert_eq!(features(&ctx, &wav).unwrap().len(), FEATURE_COUNT);
    }

    #[test]
    fn test_datasets_overview() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("datasets");
        fs::create_dir_all(root.join("tess")).unwrap();
        fs::write(root.join("tess/OAF_back_angry.wav"), b"RIFF").unwrap();
        fs::write(root.join("tess/OAF_dog_angry.wav"), b"RIFF").unwrap();

        let overview = datasets(&root).unwrap();
        assert_eq!(overview.datasets.len(), DatasetKind::ALL.len());
        assert_eq!(overview.by_emotion.get(&Emotion::Angry), Some(&2));

        let picked = samples(&root, DatasetKind::Tess, Some(Emotion::Angry), 1).unwrap();
        assert_eq!(picked.len(), 1);

        assert!(datasets(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_init_config_round_trip() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let path = dir.path().join("conf/config.json");

        init_config(&ctx, &path, false).unwrap();
        let loaded = AppConfig::try_load(&path).unwrap();
        assert_eq!(loaded.storage_dir, ctx.config.storage_dir);
        assert!(!loaded.bootstrap_if_missing);

        assert!(init_config(&ctx, &path, false).is_err());
        init_config(&ctx, &path, true).unwrap();
    }

    #[test]
    fn test_bootstrap_then_info() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);

        let path = bootstrap_model(&ctx).unwrap();
        assert!(path.exists());

        let info = model_info(&ctx);
        assert_eq!(info.origin, ModelOrigin::Loaded);
        assert_eq!(info.n_classes, 7);
    }
}
