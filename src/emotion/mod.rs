// Emotion classification module
// Label set, model artifacts, lazy model store and the never-failing predictor

pub mod backend;
pub mod bootstrap;
pub mod forest;
pub mod predictor;
pub mod scaler;
pub mod store;
pub mod training;
pub mod types;

pub use backend::{Classifier, ClassifierBackend, ClassifierError};
pub use forest::{ClassWeight, ForestParams, RandomForest};
pub use predictor::{predict, predict_outcome, try_predict, PredictError, PredictOutcome};
pub use scaler::{FeatureScaler, ScalerError};
pub use store::{LoadedModels, ModelInfo, ModelOrigin, ModelStore, StoreError};
pub use training::{train, train_on_features, TrainedModel, TrainingError, TrainingOptions, TrainingReport};
pub use types::{feature_names, Emotion, FeatureVector, PredictionResult, FEATURE_COUNT, MFCC_COUNT};
