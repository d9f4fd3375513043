// Synthetic bootstrap model
// Trains a placeholder forest on class-conditioned random features so a cold start
// has something to serve. Predictions from this model carry no real meaning.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::emotion::backend::ClassifierError;
use crate::emotion::forest::{ClassWeight, ForestParams, RandomForest};
use crate::emotion::types::{Emotion, FEATURE_COUNT};

/// Synthetic samples generated per emotion
pub const SAMPLES_PER_CLASS: usize = 100;

/// Standard deviation of the Gaussian jitter added to every feature
const JITTER_STD: f32 = 0.05;

/// Forest settings for the placeholder model
pub fn bootstrap_params() -> ForestParams {
    ForestParams {
        n_estimators: 100,
        max_depth: 20,
        min_samples_split: 5,
        min_samples_leaf: 2,
        seed: 42,
        class_weight: ClassWeight::Uniform,
    }
}

/// Fill `slots` of `features` with `low + U(0,1) * width`
fn bias(features: &mut [f32], slots: std::ops::Range<usize>, low: f32, width: f32, rng: &mut StdRng) {
    for v in &mut features[slots] {
        *v = low + rng.gen::<f32>() * width;
    }
}

/// Generate the synthetic training set
///
/// Every row starts as U(0, 0.5) noise. Angry rows get high ZCR and spectral slots,
/// happy rows high energy and mid MFCC slots, sad rows low energy and low ZCR.
/// Gaussian jitter is added last.
pub fn synthetic_dataset(seed: u64) -> Result<(Vec<Vec<f32>>, Vec<usize>), ClassifierError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = Normal::new(0.0f32, JITTER_STD)
        .map_err(|e| ClassifierError::TrainingError(e.to_string()))?;

    let mut x = Vec::with_capacity(SAMPLES_PER_CLASS * Emotion::ALL.len());
    let mut y = Vec::with_capacity(SAMPLES_PER_CLASS * Emotion::ALL.len());

    for emotion in Emotion::ALL {
        for _ in 0..SAMPLES_PER_CLASS {
            let mut features: Vec<f32> = (0..FEATURE_COUNT).map(|_| rng.gen::<f32>() * 0.5).collect();

            match emotion {
                Emotion::Angry => {
                    bias(&mut features, 0..2, 0.7, 0.3, &mut rng);
                    bias(&mut features, 30..34, 0.8, 0.2, &mut rng);
                }
                Emotion::Happy => {
                    bias(&mut features, 26..30, 0.6, 0.4, &mut rng);
                    bias(&mut features, 4..8, 0.7, 0.3, &mut rng);
                }
                Emotion::Sad => {
                    bias(&mut features, 26..30, 0.1, 0.3, &mut rng);
                    bias(&mut features, 0..2, 0.1, 0.2, &mut rng);
                }
                _ => {}
            }

            for v in features.iter_mut() {
                *v += jitter.sample(&mut rng);
            }

            x.push(features);
            y.push(emotion.index());
        }
    }

    Ok((x, y))
}

/// Train the placeholder forest
pub fn train_placeholder() -> Result<RandomForest, ClassifierError> {
    let params = bootstrap_params();
    log::info!(
        "Training placeholder random forest on synthetic data ({} samples per class, {} trees)",
        SAMPLES_PER_CLASS,
        params.n_estimators
    );

    let (x, y) = synthetic_dataset(params.seed)?;
    RandomForest::fit(&x, &y, Emotion::ALL.len(), params)
}
