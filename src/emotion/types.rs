// Emotion recognition types
// Defines emotion labels, the fixed-order feature vector, and prediction results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of values in every feature vector
pub const FEATURE_COUNT: usize = 38;

/// Number of MFCC coefficients summarized in the feature vector
pub const MFCC_COUNT: usize = 13;

/// Emotion categories recognized by the classifier
///
/// Declaration order is the class order the classifier is trained with.
/// Persisted model artifacts record this order and are rejected on mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprised,
}

impl Emotion {
    /// All emotions in class-index order
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprised,
    ];

    /// Class index used by the classifier
    pub fn index(&self) -> usize {
        match self {
            Emotion::Angry => 0,
            Emotion::Disgust => 1,
            Emotion::Fear => 2,
            Emotion::Happy => 3,
            Emotion::Neutral => 4,
            Emotion::Sad => 5,
            Emotion::Surprised => 6,
        }
    }

    pub fn from_index(index: usize) -> Option<Emotion> {
        Emotion::ALL.get(index).copied()
    }

    /// Canonical lowercase tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
        }
    }

    /// Human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Neutral => "Neutral",
            Emotion::Sad => "Sad",
            Emotion::Surprised => "Surprised",
        }
    }

    /// Resolve a tag or one of the aliases used by common emotional speech corpora
    /// ("anger", "fearful", "happiness", "ps", ...)
    pub fn from_alias(s: &str) -> Option<Emotion> {
        match s.trim().to_ascii_lowercase().as_str() {
            "angry" | "anger" => Some(Emotion::Angry),
            "disgust" | "disgusted" => Some(Emotion::Disgust),
            "fear" | "fearful" => Some(Emotion::Fear),
            "happy" | "happiness" => Some(Emotion::Happy),
            "neutral" | "neutrality" => Some(Emotion::Neutral),
            "sad" | "sadness" => Some(Emotion::Sad),
            "surprised" | "surprise" | "ps" => Some(Emotion::Surprised),
            _ => None,
        }
    }

    /// Canonical tags in class-index order
    pub fn labels() -> Vec<String> {
        Emotion::ALL.iter().map(|e| e.as_str().to_string()).collect()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::from_alias(s).ok_or_else(|| format!("unknown emotion label: {}", s))
    }
}

/// Fixed-length acoustic feature vector
///
/// Slot order (0-based):
/// - 0-1: zero-crossing rate (mean, std)
/// - 2-27: MFCC 1..13 (mean, std per coefficient)
/// - 28-29: RMS energy (mean, std)
/// - 30-31: spectral centroid (mean, std)
/// - 32-33: spectral bandwidth (mean, std)
/// - 34-35: spectral rolloff (mean, std)
/// - 36-37: chroma energy across all pitch classes (mean, std)
///
/// The order is load-bearing: persisted scalers and classifiers are fit against it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(#[serde(with = "feature_array")] [f32; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f32; FEATURE_COUNT]) -> Self {
        FeatureVector(values)
    }

    /// Build from an arbitrary-length slice, padding with 0.0 or truncating to 38
    pub fn from_slice_lenient(values: &[f32]) -> Self {
        if values.len() != FEATURE_COUNT {
            log::warn!(
                "Expected {} features but got {}, {}",
                FEATURE_COUNT,
                values.len(),
                if values.len() < FEATURE_COUNT {
                    "padding with zeros"
                } else {
                    "truncating"
                }
            );
        }

        let mut out = [0.0; FEATURE_COUNT];
        let copy_len = values.len().min(FEATURE_COUNT);
        out[..copy_len].copy_from_slice(&values[..copy_len]);
        FeatureVector(out)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn values(&self) -> [f32; FEATURE_COUNT] {
        self.0
    }

    /// Look up a value by slot name (e.g. "zcr_mean", "mfcc3_std")
    pub fn get(&self, name: &str) -> Option<f32> {
        feature_names()
            .iter()
            .position(|n| n == name)
            .map(|idx| self.0[idx])
    }

    /// Pair every value with its slot name
    pub fn named(&self) -> Vec<(String, f32)> {
        feature_names().into_iter().zip(self.0.iter().copied()).collect()
    }
}

/// Slot names in feature-vector order
pub fn feature_names() -> Vec<String> {
    let mut names = Vec::with_capacity(FEATURE_COUNT);
    names.push("zcr_mean".to_string());
    names.push("zcr_std".to_string());
    for i in 1..=MFCC_COUNT {
        names.push(format!("mfcc{}_mean", i));
        names.push(format!("mfcc{}_std", i));
    }
    for group in ["rms", "centroid", "bandwidth", "rolloff", "chroma"] {
        names.push(format!("{}_mean", group));
        names.push(format!("{}_std", group));
    }
    names
}

/// serde has no derive support for arrays longer than 32
mod feature_array {
    use super::FEATURE_COUNT;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f32; FEATURE_COUNT], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(values.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[f32; FEATURE_COUNT], D::Error> {
        let values = Vec::<f32>::deserialize(d)?;
        values
            .try_into()
            .map_err(|v: Vec<f32>| D::Error::invalid_length(v.len(), &"38 feature values"))
    }
}

/// Outcome of classifying one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Most likely emotion
    pub label: Emotion,

    /// Probability of the selected emotion [0.0, 1.0]
    pub confidence: f32,

    /// Probability for every emotion, keyed in class order
    pub distribution: BTreeMap<Emotion, f32>,
}

impl PredictionResult {
    /// Build from a class-ordered probability vector
    /// Returns None unless exactly one probability per emotion is supplied
    pub fn from_probabilities(probabilities: &[f32]) -> Option<Self> {
        if probabilities.len() != Emotion::ALL.len() {
            return None;
        }

        let (best_idx, best) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

        let distribution = Emotion::ALL
            .iter()
            .zip(probabilities.iter())
            .map(|(e, p)| (*e, p.clamp(0.0, 1.0)))
            .collect();

        Some(PredictionResult {
            label: Emotion::from_index(best_idx)?,
            confidence: best.clamp(0.0, 1.0),
            distribution,
        })
    }

    /// Hard-coded result returned when prediction cannot run
    ///
    /// The distribution sums to 1.1 (0.5 + 6 x 0.1). This matches results already
    /// stored by deployed installs and is kept as-is.
    pub fn fallback() -> Self {
        let mut distribution: BTreeMap<Emotion, f32> =
            Emotion::ALL.iter().map(|e| (*e, 0.1)).collect();
        distribution.insert(Emotion::Neutral, 0.5);

        PredictionResult {
            label: Emotion::Neutral,
            confidence: 0.5,
            distribution,
        }
    }

    pub fn probability(&self, emotion: Emotion) -> f32 {
        self.distribution.get(&emotion).copied().unwrap_or(0.0)
    }

    pub fn distribution_sum(&self) -> f32 {
        self.distribution.values().sum()
    }

    /// Confidence formatted as a percentage (e.g. "85.0%")
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}
