// Offline training
// Extracts features from labeled recordings, fits scaler and forest, reports held-out accuracy

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::audio::ANALYSIS_SAMPLE_RATE;
use crate::dataset::Sample;
use crate::emotion::backend::{Classifier, ClassifierError};
use crate::emotion::forest::{ForestParams, RandomForest};
use crate::emotion::scaler::{FeatureScaler, ScalerError};
use crate::emotion::types::{Emotion, FeatureVector};
use crate::pipeline;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("No usable training samples")]
    NoSamples,

    #[error("Need at least {needed} samples to hold out a test split, got {found}")]
    TooFewSamples { needed: usize, found: usize },

    #[error("Scaler error: {0}")]
    Scaler(#[from] ScalerError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),
}

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub params: ForestParams,

    /// Fraction of samples held out for evaluation
    pub test_fraction: f32,

    /// Seed for the train/test shuffle
    pub split_seed: u64,

    /// Rate general decodes are resampled to before extraction
    pub target_sample_rate: u32,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        TrainingOptions {
            params: ForestParams::default(),
            test_fraction: 0.15,
            split_seed: 42,
            target_sample_rate: ANALYSIS_SAMPLE_RATE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,

    /// Samples whose audio could not be decoded
    pub skipped: usize,

    /// Fraction of held-out samples classified correctly
    pub test_accuracy: f32,

    /// Training samples per emotion
    pub class_counts: BTreeMap<Emotion, usize>,
}

/// Fitted artifacts ready to be saved
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub classifier: Classifier,
    pub scaler: FeatureScaler,
    pub report: TrainingReport,
}

/// Extract features for every sample and train on them
/// Samples that fail to decode are skipped with a warning
pub fn train(samples: &[Sample], options: &TrainingOptions) -> Result<TrainedModel, TrainingError> {
    let mut rows = Vec::with_capacity(samples.len());
    let mut skipped = 0;

    for (i, sample) in samples.iter().enumerate() {
        match pipeline::extract_file_at(&sample.path, options.target_sample_rate) {
            Ok(features) => rows.push((features, sample.emotion)),
            Err(e) => {
                log::warn!("Skipping {}: {}", sample.path.display(), e);
                skipped += 1;
            }
        }

        if (i + 1) % 100 == 0 {
            log::info!("Extracted features for {}/{} samples", i + 1, samples.len());
        }
    }

    let mut model = train_on_features(&rows, options)?;
    model.report.skipped = skipped;
    Ok(model)
}

/// Train on pre-extracted feature rows
pub fn train_on_features(
    rows: &[(FeatureVector, Emotion)],
    options: &TrainingOptions,
) -> Result<TrainedModel, TrainingError> {
    if rows.is_empty() {
        return Err(TrainingError::NoSamples);
    }

    let raw: Vec<Vec<f32>> = rows.iter().map(|(f, _)| f.as_slice().to_vec()).collect();
    let labels: Vec<usize> = rows.iter().map(|(_, e)| e.index()).collect();

    let scaler = FeatureScaler::fit(&raw)?;
    let scaled = scaler.transform_all(&raw)?;

    let (train_idx, test_idx) = split_indices(rows.len(), &labels, options)?;

    let x_train: Vec<Vec<f32>> = train_idx.iter().map(|&i| scaled[i].clone()).collect();
    let y_train: Vec<usize> = train_idx.iter().map(|&i| labels[i]).collect();

    log::info!(
        "Training random forest ({} trees) on {} samples, holding out {}",
        options.params.n_estimators,
        x_train.len(),
        test_idx.len()
    );

    let forest = RandomForest::fit(&x_train, &y_train, Emotion::ALL.len(), options.params.clone())?;

    let mut correct = 0;
    for &i in &test_idx {
        if forest.predict(&scaled[i])? == labels[i] {
            correct += 1;
        }
    }
    let test_accuracy = correct as f32 / test_idx.len() as f32;
    log::info!("Held-out accuracy: {:.1}%", test_accuracy * 100.0);

    let mut class_counts = BTreeMap::new();
    for &class in &y_train {
        if let Some(emotion) = Emotion::from_index(class) {
            *class_counts.entry(emotion).or_insert(0) += 1;
        }
    }

    Ok(TrainedModel {
        classifier: Classifier::from_forest(forest)?,
        scaler,
        report: TrainingReport {
            n_samples: rows.len(),
            n_train: train_idx.len(),
            n_test: test_idx.len(),
            skipped: 0,
            test_accuracy,
            class_counts,
        },
    })
}

/// Seeded train/test split
///
/// The test set holds `max(classes present, floor(test_fraction * n))` samples. When every
/// class has at least two samples and there are at least two samples per class, the split is
/// stratified so each class keeps at least one training sample. Otherwise it is a plain shuffle.
fn split_indices(
    n: usize,
    labels: &[usize],
    options: &TrainingOptions,
) -> Result<(Vec<usize>, Vec<usize>), TrainingError> {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate().take(n) {
        by_class.entry(label).or_default().push(i);
    }
    let n_classes = by_class.len();

    let n_test = ((options.test_fraction as f64 * n as f64).floor() as usize).max(n_classes);
    if n_test >= n {
        return Err(TrainingError::TooFewSamples {
            needed: n_test + 1,
            found: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(options.split_seed);
    let stratify = n >= 2 * n_classes && by_class.values().all(|members| members.len() >= 2);

    if !stratify {
        log::info!("Too few samples per class to stratify, using a shuffled split");
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let train = indices.split_off(n_test);
        return Ok((train, indices));
    }

    let quotas = stratified_quotas(&by_class, n, n_test, &mut rng);

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (members, quota) in by_class.values().zip(quotas) {
        let mut members = members.clone();
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..quota]);
        train.extend_from_slice(&members[quota..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok((train, test))
}

/// Test samples drawn from each class, proportional to class size
/// Each class keeps at least one sample for training
fn stratified_quotas(
    by_class: &BTreeMap<usize, Vec<usize>>,
    n: usize,
    n_test: usize,
    rng: &mut StdRng,
) -> Vec<usize> {
    let sizes: Vec<usize> = by_class.values().map(Vec::len).collect();
    let exact: Vec<f64> = sizes
        .iter()
        .map(|&size| n_test as f64 * size as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = exact
        .iter()
        .zip(&sizes)
        .map(|(&e, &size)| (e.floor() as usize).min(size - 1))
        .collect();

    // Hand out the remainder by largest fractional part, ties in seeded order
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.shuffle(rng);
    order.sort_by(|&a, &b| (exact[b] - exact[b].floor()).total_cmp(&(exact[a] - exact[a].floor())));

    let mut remaining = n_test.saturating_sub(quotas.iter().sum());
    while remaining > 0 {
        let before = remaining;
        for &c in &order {
            if remaining == 0 {
                break;
            }
            if quotas[c] + 1 < sizes[c] {
                quotas[c] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }

    quotas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::types::FEATURE_COUNT;

    fn separable_rows() -> Vec<(FeatureVector, Emotion)> {
        (0..140)
            .map(|i| {
                let emotion = Emotion::ALL[i % 7];
                let mut values = [0.5; FEATURE_COUNT];
                values[0] = emotion.index() as f32 * 10.0 + (i / 7) as f32 * 0.01;
                values[1] = (i % 3) as f32;
                (FeatureVector::new(values), emotion)
            })
            .collect()
    }

    fn quick_options() -> TrainingOptions {
        TrainingOptions {
            params: ForestParams {
                n_estimators: 15,
                max_depth: 10,
                ..ForestParams::default()
            },
            ..TrainingOptions::default()
        }
    }

    #[test]
    fn test_train_on_separable_features() {
        let model = train_on_features(&separable_rows(), &quick_options()).unwrap();

        assert_eq!(model.report.n_samples, 140);
        assert_eq!(model.report.n_test, 21);
        assert_eq!(model.report.n_train, 119);
        assert!(model.report.test_accuracy > 0.9);
        assert!(model.classifier.is_fitted());
        assert_eq!(model.scaler.n_features(), FEATURE_COUNT);
    }

    #[test]
    fn test_empty_training_set() {
        assert!(matches!(
            train_on_features(&[], &quick_options()),
            Err(TrainingError::NoSamples)
        ));
    }

    #[test]
    fn test_too_few_samples() {
        let rows = vec![
            (FeatureVector::new([0.0; FEATURE_COUNT]), Emotion::Sad),
            (FeatureVector::new([1.0; FEATURE_COUNT]), Emotion::Happy),
        ];
        assert!(matches!(
            train_on_features(&rows, &quick_options()),
            Err(TrainingError::TooFewSamples { .. })
        ));
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let labels: Vec<usize> = (0..40).map(|i| i % 4).collect();
        let options = TrainingOptions::default();
        let (train_a, test_a) = split_indices(40, &labels, &options).unwrap();
        let (train_b, test_b) = split_indices(40, &labels, &options).unwrap();

        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
        assert_eq!(test_a.len(), 6);
        assert!(test_a.iter().all(|i| !train_a.contains(i)));
    }

    #[test]
    fn test_test_size_rounds_down() {
        let labels: Vec<usize> = (0..50).map(|i| i % 7).collect();
        let (train, test) = split_indices(50, &labels, &TrainingOptions::default()).unwrap();
        assert_eq!(test.len(), 7);
        assert_eq!(train.len(), 43);
    }

    #[test]
    fn test_test_size_covers_every_class() {
        let labels: Vec<usize> = (0..20).map(|i| i % 7).collect();
        let (_, test) = split_indices(20, &labels, &TrainingOptions::default()).unwrap();
        assert_eq!(test.len(), 7);
    }

    #[test]
    fn test_stratified_split_keeps_rare_class_in_training() {
        // Classes 0..6 share 58 samples, class 6 has only two
        let mut labels: Vec<usize> = (0..58).map(|i| i % 6).collect();
        labels.extend([6, 6]);

        for seed in 0..200 {
            let options = TrainingOptions {
                split_seed: seed,
                ..TrainingOptions::default()
            };
            let (train, test) = split_indices(60, &labels, &options).unwrap();
            assert_eq!(test.len(), 9);
            assert_eq!(train.len() + test.len(), 60);
            for class in 0..7 {
                assert!(
                    train.iter().any(|&i| labels[i] == class),
                    "seed {} dropped class {} from training",
                    seed,
                    class
                );
            }
        }
    }

    #[test]
    fn test_stratified_split_is_proportional() {
        let labels: Vec<usize> = (0..100).map(|i| if i < 80 { 0 } else { 1 }).collect();
        let (_, test) = split_indices(100, &labels, &TrainingOptions::default()).unwrap();
        assert_eq!(test.len(), 15);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 0).count(), 12);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 3);
    }

    #[test]
    fn test_singleton_class_falls_back_to_shuffle() {
        let mut labels: Vec<usize> = (0..30).map(|i| i % 3).collect();
        labels.push(3);
        let (train, test) = split_indices(31, &labels, &TrainingOptions::default()).unwrap();
        assert_eq!(test.len(), 4);
        assert_eq!(train.len(), 27);
        assert!(test.iter().all(|i| !train.contains(i)));
    }
}
