// Classifier backend abstraction
// A fitted random forest, or an untrained placeholder used in degraded mode

use crate::emotion::forest::RandomForest;
use crate::emotion::types::Emotion;
use thiserror::Error;

/// Classification backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierBackend {
    /// Random forest loaded from disk or trained in-process
    RandomForest,

    /// Placeholder with no fitted model; every prediction fails
    Untrained,
}

impl ClassifierBackend {
    pub fn model_type(&self) -> &'static str {
        match self {
            ClassifierBackend::RandomForest => "RandomForestClassifier",
            ClassifierBackend::Untrained => "UntrainedClassifier",
        }
    }
}

/// Errors that can occur during classification
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier has not been fitted")]
    NotFitted,

    #[error("Classifier expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Classifier was trained for {found} classes, expected {expected}")]
    ClassCountMismatch { expected: usize, found: usize },

    #[error("Training failed: {0}")]
    TrainingError(String),

    #[error("Classification failed: {0}")]
    ClassificationError(String),
}

/// Unified classifier interface
#[derive(Debug, Clone)]
pub struct Classifier {
    backend: ClassifierBackend,
    forest: Option<RandomForest>,
}

impl Classifier {
    /// Wrap a fitted forest
    /// The forest must produce one probability per emotion
    pub fn from_forest(forest: RandomForest) -> Result<Self, ClassifierError> {
        if forest.n_classes() != Emotion::ALL.len() {
            return Err(ClassifierError::ClassCountMismatch {
                expected: Emotion::ALL.len(),
                found: forest.n_classes(),
            });
        }

        Ok(Classifier {
            backend: ClassifierBackend::RandomForest,
            forest: Some(forest),
        })
    }

    /// Placeholder classifier for degraded mode
    pub fn untrained() -> Self {
        Classifier {
            backend: ClassifierBackend::Untrained,
            forest: None,
        }
    }

    /// Per-class probabilities in `Emotion::ALL` order
    pub fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, ClassifierError> {
        match self.backend {
            ClassifierBackend::RandomForest => match self.forest {
                Some(ref forest) => forest.predict_proba(features),
                None => Err(ClassifierError::NotFitted),
            },
            ClassifierBackend::Untrained => Err(ClassifierError::NotFitted),
        }
    }

    /// Get the current backend type
    pub fn backend(&self) -> ClassifierBackend {
        self.backend
    }

    pub fn is_fitted(&self) -> bool {
        self.forest.is_some()
    }

    pub fn forest(&self) -> Option<&RandomForest> {
        self.forest.as_ref()
    }

    pub fn n_estimators(&self) -> Option<usize> {
        self.forest.as_ref().map(|f| f.n_estimators())
    }

    /// Feature importances, empty for an untrained classifier
    pub fn feature_importances(&self) -> Vec<f32> {
        self.forest
            .as_ref()
            .map(|f| f.feature_importances().to_vec())
            .unwrap_or_default()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::untrained()
    }
}
