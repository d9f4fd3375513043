// Model store
// Lazily loads the classifier and scaler pair once, bootstrapping or degrading when
// the artifacts are missing or unreadable

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::emotion::backend::{Classifier, ClassifierError};
use crate::emotion::bootstrap;
use crate::emotion::forest::RandomForest;
use crate::emotion::scaler::FeatureScaler;
use crate::emotion::types::{Emotion, FEATURE_COUNT};

/// Classifier artifact file name inside the model directory
pub const MODEL_FILE_NAME: &str = "emotion_model.json";

/// Scaler artifact file name inside the model directory
pub const SCALER_FILE_NAME: &str = "scaler.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Model artifact not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("Model label order {found:?} does not match {expected:?}")]
    LabelMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{artifact} expects {found} features, expected {expected}")]
    FeatureMismatch {
        artifact: &'static str,
        expected: usize,
        found: usize,
    },
}

/// On-disk classifier artifact
/// The label order travels with the forest so a reordering of `Emotion` is caught on load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub labels: Vec<String>,
    pub classifier: RandomForest,
}

/// Where the active model pair came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelOrigin {
    /// Read from artifacts on disk
    Loaded,

    /// Trained on synthetic data because no artifacts existed
    Bootstrapped,

    /// Untrained classifier and identity scaler (degraded mode)
    Placeholder,
}

/// Classifier and scaler pair shared read-only by all predictions
#[derive(Debug, Clone)]
pub struct LoadedModels {
    pub classifier: Classifier,
    pub scaler: FeatureScaler,
    pub origin: ModelOrigin,
}

impl LoadedModels {
    /// Degraded pair: every prediction through it falls back
    pub fn placeholder() -> Self {
        LoadedModels {
            classifier: Classifier::untrained(),
            scaler: FeatureScaler::identity(FEATURE_COUNT),
            origin: ModelOrigin::Placeholder,
        }
    }
}

/// Summary of the active model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub origin: ModelOrigin,
    pub n_estimators: Option<usize>,
    pub n_classes: usize,
    pub emotions: Vec<String>,
    pub feature_importances: Vec<f32>,
    pub model_path: PathBuf,
}

/// Owner of the lazily initialized model pair
///
/// Construct one per process at the composition root and share it by reference.
/// The first call to [`ModelStore::get`] loads (or bootstraps) the artifacts; concurrent
/// first callers block on that single initialization. The pair is never reloaded.
#[derive(Debug)]
pub struct ModelStore {
    model_dir: PathBuf,
    bootstrap_if_missing: bool,
    models: OnceLock<LoadedModels>,
}

impl ModelStore {
    pub fn new(model_dir: impl Into<PathBuf>, bootstrap_if_missing: bool) -> Self {
        ModelStore {
            model_dir: model_dir.into(),
            bootstrap_if_missing,
            models: OnceLock::new(),
        }
    }

    /// Store that is already initialized with the given pair
    pub fn with_models(model_dir: impl Into<PathBuf>, models: LoadedModels) -> Self {
        let store = ModelStore::new(model_dir, false);
        // Fresh OnceLock, cannot already be set
        let _ = store.models.set(models);
        store
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(MODEL_FILE_NAME)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.model_dir.join(SCALER_FILE_NAME)
    }

    pub fn is_loaded(&self) -> bool {
        self.models.get().is_some()
    }

    /// The model pair, loading it on first use
    pub fn get(&self) -> &LoadedModels {
        self.models.get_or_init(|| self.initialize())
    }

    fn initialize(&self) -> LoadedModels {
        let model_path = self.model_path();
        let scaler_path = self.scaler_path();

        if self.bootstrap_if_missing && !model_path.exists() && !scaler_path.exists() {
            log::info!(
                "No model artifacts in {}, bootstrapping a synthetic model",
                self.model_dir.display()
            );
            match self.bootstrap() {
                Ok(models) => return models,
                Err(e) => log::warn!("Model bootstrap failed: {}", e),
            }
        }

        match Self::load_artifacts(&self.model_dir) {
            Ok((classifier, scaler)) => {
                log::info!(
                    "Loaded {} ({} trees) from {}",
                    classifier.backend().model_type(),
                    classifier.n_estimators().unwrap_or(0),
                    model_path.display()
                );
                LoadedModels {
                    classifier,
                    scaler,
                    origin: ModelOrigin::Loaded,
                }
            }
            Err(e) => {
                log::warn!(
                    "Could not load model artifacts from {}: {}. Predictions will use the fallback result",
                    self.model_dir.display(),
                    e
                );
                LoadedModels::placeholder()
            }
        }
    }

    fn bootstrap(&self) -> Result<LoadedModels, StoreError> {
        let forest = bootstrap::train_placeholder()?;
        let classifier = Classifier::from_forest(forest)?;
        let scaler = FeatureScaler::identity(FEATURE_COUNT);

        // An unwritable model dir still leaves a usable in-memory model
        match Self::save_artifacts(&self.model_dir, &classifier, &scaler) {
            Ok(()) => log::info!("Saved bootstrapped model to {}", self.model_dir.display()),
            Err(e) => log::warn!("Could not persist bootstrapped model: {}", e),
        }

        Ok(LoadedModels {
            classifier,
            scaler,
            origin: ModelOrigin::Bootstrapped,
        })
    }

    /// Read and validate both artifacts from `dir`
    pub fn load_artifacts(dir: &Path) -> Result<(Classifier, FeatureScaler), StoreError> {
        let model_path = dir.join(MODEL_FILE_NAME);
        let scaler_path = dir.join(SCALER_FILE_NAME);

        for path in [&model_path, &scaler_path] {
            if !path.exists() {
                return Err(StoreError::MissingArtifact(path.clone()));
            }
        }

        let artifact: ModelArtifact = serde_json::from_slice(&fs::read(&model_path)?)?;
        let scaler: FeatureScaler = serde_json::from_slice(&fs::read(&scaler_path)?)?;

        let expected = Emotion::labels();
        if artifact.labels != expected {
            return Err(StoreError::LabelMismatch {
                expected,
                found: artifact.labels,
            });
        }

        if artifact.classifier.n_features() != FEATURE_COUNT {
            return Err(StoreError::FeatureMismatch {
                artifact: "classifier",
                expected: FEATURE_COUNT,
                found: artifact.classifier.n_features(),
            });
        }

        if scaler.n_features() != FEATURE_COUNT || scaler.scale.len() != FEATURE_COUNT {
            return Err(StoreError::FeatureMismatch {
                artifact: "scaler",
                expected: FEATURE_COUNT,
                found: scaler.n_features(),
            });
        }

        let classifier = Classifier::from_forest(artifact.classifier)?;
        Ok((classifier, scaler))
    }

    /// Write both artifacts into `dir`, creating it if needed
    pub fn save_artifacts(
        dir: &Path,
        classifier: &Classifier,
        scaler: &FeatureScaler,
    ) -> Result<(), StoreError> {
        let forest = classifier.forest().ok_or(ClassifierError::NotFitted)?;

        fs::create_dir_all(dir)?;

        let artifact = ModelArtifact {
            labels: Emotion::labels(),
            classifier: forest.clone(),
        };
        fs::write(dir.join(MODEL_FILE_NAME), serde_json::to_vec(&artifact)?)?;
        fs::write(dir.join(SCALER_FILE_NAME), serde_json::to_vec_pretty(scaler)?)?;

        Ok(())
    }

    /// Describe the active model, loading it if needed
    pub fn info(&self) -> ModelInfo {
        let models = self.get();
        ModelInfo {
            model_type: models.classifier.backend().model_type().to_string(),
            origin: models.origin,
            n_estimators: models.classifier.n_estimators(),
            n_classes: Emotion::ALL.len(),
            emotions: Emotion::labels(),
            feature_importances: models.classifier.feature_importances(),
            model_path: self.model_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::backend::ClassifierBackend;
    use crate::emotion::forest::ForestParams;
    use tempfile::tempdir;

    fn small_classifier() -> Classifier {
        let x: Vec<Vec<f32>> = (0..70)
            .map(|i| {
                let mut row = vec![0.0; FEATURE_COUNT];
                row[0] = (i % 7) as f32;
                row
            })
            .collect();
        let y: Vec<usize> = (0..70).map(|i| i % 7).collect();
        let params = ForestParams {
            n_estimators: 5,
            max_depth: 6,
            ..ForestParams::default()
        };
        Classifier::from_forest(RandomForest::fit(&x, &y, 7, params).unwrap()).unwrap()
    }

    #[test]
    fn test_missing_artifacts_without_bootstrap_gives_placeholder() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path(), false);

        assert!(!store.is_loaded());
        let models = store.get();
        assert!(store.is_loaded());
        assert_eq!(models.origin, ModelOrigin::Placeholder);
        assert_eq!(models.classifier.backend(), ClassifierBackend::Untrained);
        assert!(models.scaler.is_identity());
        assert_eq!(models.scaler.n_features(), FEATURE_COUNT);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let classifier = small_classifier();
        let mut scaler = FeatureScaler::identity(FEATURE_COUNT);
        scaler.mean[0] = 3.0;

        ModelStore::save_artifacts(dir.path(), &classifier, &scaler).unwrap();
        assert!(dir.path().join(MODEL_FILE_NAME).exists());
        assert!(dir.path().join(SCALER_FILE_NAME).exists());

        let store = ModelStore::new(dir.path(), false);
        let models = store.get();
        assert_eq!(models.origin, ModelOrigin::Loaded);
        assert_eq!(models.classifier.n_estimators(), Some(5));
        assert_eq!(models.scaler.mean[0], 3.0);
    }

    #[test]
    fn test_save_untrained_classifier_fails() {
        let dir = tempdir().unwrap();
        let result = ModelStore::save_artifacts(
            dir.path(),
            &Classifier::untrained(),
            &FeatureScaler::identity(FEATURE_COUNT),
        );
        assert!(matches!(result, Err(StoreError::Classifier(ClassifierError::NotFitted))));
    }

    #[test]
    fn test_corrupt_artifact_gives_placeholder() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(MODEL_FILE_NAME), b"not json").unwrap();
        fs::write(dir.path().join(SCALER_FILE_NAME), b"{}").unwrap();

        // Artifacts exist, so no bootstrap even when enabled
        let store = ModelStore::new(dir.path(), true);
        assert_eq!(store.get().origin, ModelOrigin::Placeholder);
    }

    #[test]
    fn test_label_order_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let classifier = small_classifier();
        ModelStore::save_artifacts(dir.path(), &classifier, &FeatureScaler::identity(FEATURE_COUNT))
            .unwrap();

        let mut labels = Emotion::labels();
        labels.swap(0, 1);
        let artifact = ModelArtifact {
            labels,
            classifier: classifier.forest().unwrap().clone(),
        };
        fs::write(
            dir.path().join(MODEL_FILE_NAME),
            serde_json::to_vec(&artifact).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            ModelStore::load_artifacts(dir.path()),
            Err(StoreError::LabelMismatch { .. })
        ));
        assert_eq!(ModelStore::new(dir.path(), false).get().origin, ModelOrigin::Placeholder);
    }

    #[test]
    fn test_scaler_width_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        ModelStore::save_artifacts(dir.path(), &small_classifier(), &FeatureScaler::identity(10))
            .unwrap();

        assert!(matches!(
            ModelStore::load_artifacts(dir.path()),
            Err(StoreError::FeatureMismatch { artifact: "scaler", .. })
        ));
    }

    #[test]
    fn test_bootstrap_when_missing() {
        let dir = tempdir().unwrap();
        let model_dir = dir.path().join("model");
        let store = ModelStore::new(&model_dir, true);

        let models = store.get();
        assert_eq!(models.origin, ModelOrigin::Bootstrapped);
        assert!(models.classifier.is_fitted());
        assert!(model_dir.join(MODEL_FILE_NAME).exists());

        // A second store reads back what the bootstrap persisted
        let reloaded = ModelStore::new(&model_dir, true);
        assert_eq!(reloaded.get().origin, ModelOrigin::Loaded);
    }

    #[test]
    fn test_get_initializes_once_across_threads() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path(), false);

        let addresses: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| store.get() as *const LoadedModels as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_info() {
        let dir = tempdir().unwrap();
        let store = ModelStore::with_models(dir.path(), LoadedModels::placeholder());
        let info = store.info();

        assert_eq!(info.model_type, "UntrainedClassifier");
        assert_eq!(info.n_classes, 7);
        assert_eq!(info.emotions[4], "neutral");
        assert!(info.feature_importances.is_empty());
        assert_eq!(info.model_path, dir.path().join(MODEL_FILE_NAME));
    }
}
