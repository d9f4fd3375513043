// Emotion prediction
// Scales a feature vector, runs the classifier and shapes the result.
// The public entry point never fails: any error yields the fallback result.

use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

use crate::emotion::backend::ClassifierError;
use crate::emotion::scaler::ScalerError;
use crate::emotion::store::{LoadedModels, ModelStore};
use crate::emotion::types::{Emotion, FeatureVector, PredictionResult};

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Scaler error: {0}")]
    Scaler(#[from] ScalerError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Classifier returned {actual} probabilities, expected {expected}")]
    ProbabilityLength { expected: usize, actual: usize },

    #[error("Prediction panicked: {0}")]
    Panicked(String),
}

/// Prediction plus the reason it fell back, if it did
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub result: PredictionResult,
    pub fallback_cause: Option<String>,
}

impl PredictOutcome {
    pub fn is_fallback(&self) -> bool {
        self.fallback_cause.is_some()
    }
}

/// Classify one feature vector against a loaded model pair
pub fn try_predict(
    models: &LoadedModels,
    features: &FeatureVector,
) -> Result<PredictionResult, PredictError> {
    let mut scaled = models.scaler.transform(features.as_slice())?;

    for v in scaled.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }

    let probabilities = models.classifier.predict_proba(&scaled)?;

    PredictionResult::from_probabilities(&probabilities).ok_or(PredictError::ProbabilityLength {
        expected: Emotion::ALL.len(),
        actual: probabilities.len(),
    })
}

/// Classify, converting errors and panics into the fallback result
pub fn predict_outcome(store: &ModelStore, features: &FeatureVector) -> PredictOutcome {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| try_predict(store.get(), features)))
        .unwrap_or_else(|payload| Err(PredictError::Panicked(panic_message(payload.as_ref()))));

    match attempt {
        Ok(result) => {
            log::info!(
                "Predicted {} ({})",
                result.label.display_name(),
                result.confidence_percent()
            );
            PredictOutcome {
                result,
                fallback_cause: None,
            }
        }
        Err(e) => {
            log::error!("Prediction failed, returning fallback result: {}", e);
            PredictOutcome {
                result: PredictionResult::fallback(),
                fallback_cause: Some(e.to_string()),
            }
        }
    }
}

/// Classify a feature vector; always returns a well-formed result
pub fn predict(store: &ModelStore, features: &FeatureVector) -> PredictionResult {
    predict_outcome(store, features).result
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::backend::Classifier;
    use crate::emotion::forest::{ForestParams, RandomForest};
    use crate::emotion::scaler::FeatureScaler;
    use crate::emotion::store::ModelOrigin;
    use crate::emotion::types::FEATURE_COUNT;
    use tempfile::tempdir;

    /// Forest that maps feature 0 directly to the class index
    fn trained_models() -> LoadedModels {
        let x: Vec<Vec<f32>> = (0..140)
            .map(|i| {
                let mut row = vec![0.0; FEATURE_COUNT];
                row[0] = (i % 7) as f32;
                row
            })
            .collect();
        let y: Vec<usize> = (0..140).map(|i| i % 7).collect();
        let params = ForestParams {
            n_estimators: 10,
            max_depth: 8,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, 7, params).unwrap();

        LoadedModels {
            classifier: Classifier::from_forest(forest).unwrap(),
            scaler: FeatureScaler::identity(FEATURE_COUNT),
            origin: ModelOrigin::Loaded,
        }
    }

    #[test]
    fn test_try_predict_with_trained_model() {
        let models = trained_models();
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = Emotion::Happy.index() as f32;

        let result = try_predict(&models, &FeatureVector::new(values)).unwrap();
        assert_eq!(result.label, Emotion::Happy);
        assert_eq!(result.distribution.len(), 7);
        assert!((result.distribution_sum() - 1.0).abs() < 1e-5);
        assert_eq!(result.confidence, result.probability(result.label));
    }

    #[test]
    fn test_try_predict_scrubs_non_finite_values() {
        let models = trained_models();
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = f32::NAN;
        values[5] = f32::INFINITY;

        let result = try_predict(&models, &FeatureVector::new(values)).unwrap();
        // NaN in slot 0 becomes 0.0, which the forest maps to the first class
        assert_eq!(result.label, Emotion::Angry);
    }

    #[test]
    fn test_try_predict_untrained_fails() {
        let models = LoadedModels::placeholder();
        let result = try_predict(&models, &FeatureVector::new([0.0; FEATURE_COUNT]));
        assert!(matches!(
            result,
            Err(PredictError::Classifier(ClassifierError::NotFitted))
        ));
    }

    #[test]
    fn test_try_predict_scaler_mismatch_fails() {
        let mut models = trained_models();
        models.scaler = FeatureScaler::identity(12);
        let result = try_predict(&models, &FeatureVector::new([0.0; FEATURE_COUNT]));
        assert!(matches!(result, Err(PredictError::Scaler(_))));
    }

    #[test]
    fn test_predict_falls_back_without_model() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path(), false);

        let outcome = predict_outcome(&store, &FeatureVector::new([0.3; FEATURE_COUNT]));
        assert!(outcome.is_fallback());
        assert_eq!(outcome.result, PredictionResult::fallback());

        let result = predict(&store, &FeatureVector::new([0.3; FEATURE_COUNT]));
        assert_eq!(result.label, Emotion::Neutral);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_predict_uses_loaded_model() {
        let dir = tempdir().unwrap();
        let store = ModelStore::with_models(dir.path(), trained_models());

        let mut values = [0.0; FEATURE_COUNT];
        values[0] = Emotion::Sad.index() as f32;
        let outcome = predict_outcome(&store, &FeatureVector::new(values));

        assert!(!outcome.is_fallback());
        assert_eq!(outcome.result.label, Emotion::Sad);
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }
}
