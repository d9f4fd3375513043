// Dataset evaluation
// Runs the full analysis pipeline over labeled samples and scores the predictions

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::Sample;
use crate::emotion::{Emotion, ModelStore};
use crate::pipeline::analyze_file;

#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub path: PathBuf,
    pub expected: Emotion,
    pub predicted: Emotion,
    pub confidence: f32,
    pub correct: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmotionScore {
    pub total: usize,
    pub correct: usize,

    /// Integer percent, rounded down
    pub accuracy: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Samples submitted
    pub total: usize,

    /// Samples that made it through the pipeline
    pub completed: usize,
    pub correct: usize,

    /// Integer percent of completed samples, rounded down
    pub accuracy: u32,

    /// Scores keyed by ground-truth emotion, completed samples only
    pub per_emotion: BTreeMap<Emotion, EmotionScore>,

    /// confusion[expected][predicted], in class order
    pub confusion: Vec<Vec<usize>>,

    pub samples: Vec<SampleResult>,
}

fn percent(correct: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        (correct * 100 / total) as u32
    }
}

/// Evaluate `store` against labeled samples
pub fn evaluate(samples: &[Sample], store: &ModelStore) -> EvaluationReport {
    let n = Emotion::ALL.len();
    let mut confusion = vec![vec![0usize; n]; n];
    let mut per_emotion: BTreeMap<Emotion, EmotionScore> = Emotion::ALL
        .iter()
        .map(|e| (*e, EmotionScore::default()))
        .collect();
    let mut results = Vec::with_capacity(samples.len());

    for (i, sample) in samples.iter().enumerate() {
        let analysis = match analyze_file(&sample.path, store) {
            Ok(analysis) => analysis,
            Err(e) => {
                log::error!("Error analyzing sample {}: {}", sample.path.display(), e);
                continue;
            }
        };

        let predicted = analysis.prediction.label;
        let correct = predicted == sample.emotion;

        confusion[sample.emotion.index()][predicted.index()] += 1;
        let score = per_emotion.entry(sample.emotion).or_default();
        score.total += 1;
        if correct {
            score.correct += 1;
        }

        results.push(SampleResult {
            path: sample.path.clone(),
            expected: sample.emotion,
            predicted,
            confidence: analysis.prediction.confidence,
            correct,
        });
        log::debug!("Evaluated {}/{}: {}", i + 1, samples.len(), sample.path.display());
    }

    for score in per_emotion.values_mut() {
        score.accuracy = percent(score.correct, score.total);
    }

    let completed = results.len();
    let correct = results.iter().filter(|r| r.correct).count();
    let report = EvaluationReport {
        total: samples.len(),
        completed,
        correct,
        accuracy: percent(correct, completed),
        per_emotion,
        confusion,
        samples: results,
    };

    log::info!(
        "Evaluation: {}/{} completed, {} correct ({}%)",
        report.completed,
        report.total,
        report.correct,
        report.accuracy
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::LoadedModels;
    use std::fs;
    use tempfile::tempdir;

    fn write_tone(path: &std::path::Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..16000 {
            let t = i as f32 / 16000.0;
            let v = (t * 300.0 * 2.0 * std::f32::consts::PI).sin() * 0.3;
            writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_percent_rounds_down() {
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(5, 5), 100);
    }

    #[test]
    fn test_evaluate_with_fallback_model() {
        let dir = tempdir().unwrap();
        let neutral = dir.path().join("neutral.wav");
        let sad = dir.path().join("sad.wav");
        let empty = dir.path().join("empty.wav");
        write_tone(&neutral);
        write_tone(&sad);
        fs::write(&empty, b"").unwrap();

        let samples = vec![
            Sample { path: neutral, emotion: Emotion::Neutral, dataset: None },
            Sample { path: sad, emotion: Emotion::Sad, dataset: None },
            Sample { path: empty, emotion: Emotion::Angry, dataset: None },
        ];

        // The placeholder classifier always yields the neutral fallback
        let store = ModelStore::with_models(dir.path(), LoadedModels::placeholder());
        let report = evaluate(&samples, &store);

        assert_eq!(report.total, 3);
        assert_eq!(report.completed, 2);
        assert_eq!(report.correct, 1);
        assert_eq!(report.accuracy, 50);
        assert_eq!(report.per_emotion[&Emotion::Neutral].accuracy, 100);
        assert_eq!(report.per_emotion[&Emotion::Sad].accuracy, 0);
        assert_eq!(report.per_emotion[&Emotion::Angry].total, 0);
        assert_eq!(
            report.confusion[Emotion::Sad.index()][Emotion::Neutral.index()],
            1
        );
    }
}
