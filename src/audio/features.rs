// Acoustic feature extraction
// Builds the fixed 38-value feature vector group by group. A group that fails takes
// its fallback constants; a panic anywhere yields a random vector instead.

use rand::Rng;
use serde::Serialize;
use std::cell::OnceCell;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

use crate::audio::signal::{Signal, ANALYSIS_SAMPLE_RATE};
use crate::audio::spectral::{self, Stft, ROLLOFF_PERCENT};
use crate::emotion::predictor::panic_message;
use crate::emotion::types::{FeatureVector, FEATURE_COUNT, MFCC_COUNT};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("Signal has no samples")]
    EmptySignal,

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("{group} produced non-finite values")]
    NonFinite { group: &'static str },

    #[error("{group} produced {actual} values, expected {expected}")]
    WrongLength {
        group: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Feature extraction panicked: {0}")]
    Panicked(String),
}

/// Per-signal state shared by the feature groups
/// The STFT is computed on first use and reused by every spectral group
pub struct FeatureContext<'a> {
    pub signal: &'a Signal,
    stft: OnceCell<Result<Stft, FeatureError>>,
}

impl<'a> FeatureContext<'a> {
    pub fn new(signal: &'a Signal) -> Self {
        FeatureContext {
            signal,
            stft: OnceCell::new(),
        }
    }

    pub fn stft(&self) -> Result<&Stft, FeatureError> {
        self.stft
            .get_or_init(|| Stft::compute(&self.signal.samples, self.signal.sample_rate))
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// One contiguous block of slots in the feature vector
#[derive(Clone, Copy)]
pub struct FeatureGroup {
    pub name: &'static str,
    pub compute: fn(&FeatureContext<'_>) -> Result<Vec<f32>, FeatureError>,

    /// Values used when `compute` fails; its length is the group's width
    pub fallback: &'static [f32],
}

const MFCC_FALLBACK: [f32; 2 * MFCC_COUNT] = [
    0.0, 0.1, 0.0, 0.1, 0.0, 0.1, 0.0, 0.1, 0.0, 0.1, 0.0, 0.1, 0.0, 0.1, 0.0, 0.1, 0.0, 0.1,
    0.0, 0.1, 0.0, 0.1, 0.0, 0.1, 0.0, 0.1,
];

/// Feature groups in slot order
pub const FEATURE_GROUPS: &[FeatureGroup] = &[
    FeatureGroup {
        name: "zcr",
        compute: zcr_group,
        fallback: &[0.1, 0.05],
    },
    FeatureGroup {
        name: "mfcc",
        compute: mfcc_group,
        fallback: &MFCC_FALLBACK,
    },
    FeatureGroup {
        name: "rms",
        compute: rms_group,
        fallback: &[0.2, 0.05],
    },
    FeatureGroup {
        name: "centroid",
        compute: centroid_group,
        fallback: &[1000.0, 500.0],
    },
    FeatureGroup {
        name: "bandwidth",
        compute: bandwidth_group,
        fallback: &[1000.0, 500.0],
    },
    FeatureGroup {
        name: "rolloff",
        compute: rolloff_group,
        fallback: &[2000.0, 1000.0],
    },
    FeatureGroup {
        name: "chroma",
        compute: chroma_group,
        fallback: &[0.3, 0.15],
    },
];

/// Mean and std of a per-frame series, rejecting NaN/Inf
fn summarize<I: IntoIterator<Item = f32>>(
    group: &'static str,
    values: I,
) -> Result<[f32; 2], FeatureError> {
    let (mean, std) = spectral::mean_std(values);
    if mean.is_finite() && std.is_finite() {
        Ok([mean, std])
    } else {
        Err(FeatureError::NonFinite { group })
    }
}

fn zcr_group(ctx: &FeatureContext<'_>) -> Result<Vec<f32>, FeatureError> {
    if ctx.signal.samples.iter().any(|v| !v.is_finite()) {
        return Err(FeatureError::NonFinite { group: "zcr" });
    }
    Ok(summarize("zcr", spectral::zero_crossing_rate(&ctx.signal.samples))?.to_vec())
}

fn mfcc_group(ctx: &FeatureContext<'_>) -> Result<Vec<f32>, FeatureError> {
    let series = spectral::mfcc(ctx.stft()?, MFCC_COUNT);
    let mut values = Vec::with_capacity(2 * MFCC_COUNT);
    for coefficient in series {
        values.extend(summarize("mfcc", coefficient)?);
    }
    Ok(values)
}

fn rms_group(ctx: &FeatureContext<'_>) -> Result<Vec<f32>, FeatureError> {
    Ok(summarize("rms", spectral::rms(&ctx.signal.samples))?.to_vec())
}

fn centroid_group(ctx: &FeatureContext<'_>) -> Result<Vec<f32>, FeatureError> {
    Ok(summarize("centroid", spectral::spectral_centroid(ctx.stft()?))?.to_vec())
}

fn bandwidth_group(ctx: &FeatureContext<'_>) -> Result<Vec<f32>, FeatureError> {
    Ok(summarize("bandwidth", spectral::spectral_bandwidth(ctx.stft()?))?.to_vec())
}

fn rolloff_group(ctx: &FeatureContext<'_>) -> Result<Vec<f32>, FeatureError> {
    let rolloff = spectral::spectral_rolloff(ctx.stft()?, ROLLOFF_PERCENT);
    Ok(summarize("rolloff", rolloff)?.to_vec())
}

fn chroma_group(ctx: &FeatureContext<'_>) -> Result<Vec<f32>, FeatureError> {
    let chroma = spectral::chroma(ctx.stft()?);
    Ok(summarize("chroma", chroma.into_iter().flatten())?.to_vec())
}

/// Result of one group
#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub name: &'static str,
    pub values: Vec<f32>,

    /// Set when the fallback constants were used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Feature vector plus how it was produced
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub features: FeatureVector,
    pub groups: Vec<GroupOutcome>,

    /// The input was empty and the synthetic tone was analyzed instead
    pub synthetic_input: bool,

    /// Extraction aborted and the features are random
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catastrophic: Option<String>,
}

impl Extraction {
    /// Names of groups that fell back to constants
    pub fn fallback_groups(&self) -> Vec<&'static str> {
        self.groups
            .iter()
            .filter(|g| g.error.is_some())
            .map(|g| g.name)
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.synthetic_input
            || self.catastrophic.is_some()
            || self.groups.iter().any(|g| g.error.is_some())
    }
}

/// Extract the 38-value feature vector; never fails
pub fn extract(signal: &Signal) -> FeatureVector {
    extract_detailed(signal).features
}

/// Extract with per-group detail; never fails
pub fn extract_detailed(signal: &Signal) -> Extraction {
    extract_detailed_with(signal, FEATURE_GROUPS)
}

/// Extract, surfacing a panic as an error instead of random features
pub fn try_extract(signal: &Signal) -> Result<Extraction, FeatureError> {
    try_extract_with(signal, FEATURE_GROUPS)
}

fn extract_detailed_with(signal: &Signal, groups: &[FeatureGroup]) -> Extraction {
    match try_extract_with(signal, groups) {
        Ok(extraction) => extraction,
        Err(e) => {
            log::error!("Error extracting features: {}. Using random fallback features", e);
            Extraction {
                features: random_features(),
                groups: Vec::new(),
                synthetic_input: false,
                catastrophic: Some(e.to_string()),
            }
        }
    }
}

fn try_extract_with(signal: &Signal, groups: &[FeatureGroup]) -> Result<Extraction, FeatureError> {
    panic::catch_unwind(AssertUnwindSafe(|| extract_groups(signal, groups)))
        .map_err(|payload| FeatureError::Panicked(panic_message(payload.as_ref())))
}

/// Run every group in order, substituting fallbacks for failed groups
fn extract_groups(signal: &Signal, groups: &[FeatureGroup]) -> Extraction {
    let substitute;
    let synthetic_input = signal.is_empty();
    let signal = if synthetic_input {
        let rate = if signal.sample_rate == 0 {
            ANALYSIS_SAMPLE_RATE
        } else {
            signal.sample_rate
        };
        log::warn!("Empty audio signal, analyzing a synthetic tone at {} Hz instead", rate);
        substitute = Signal::synthetic_tone(rate);
        &substitute
    } else {
        signal
    };

    let ctx = FeatureContext::new(signal);
    let mut values = Vec::with_capacity(FEATURE_COUNT);
    let mut outcomes = Vec::with_capacity(groups.len());

    for group in groups {
        let result = (group.compute)(&ctx).and_then(|v| {
            if v.len() == group.fallback.len() {
                Ok(v)
            } else {
                Err(FeatureError::WrongLength {
                    group: group.name,
                    expected: group.fallback.len(),
                    actual: v.len(),
                })
            }
        });

        let outcome = match result {
            Ok(v) => GroupOutcome {
                name: group.name,
                values: v,
                error: None,
            },
            Err(e) => {
                log::warn!("Error computing {}: {}. Using fallback values", group.name, e);
                GroupOutcome {
                    name: group.name,
                    values: group.fallback.to_vec(),
                    error: Some(e.to_string()),
                }
            }
        };

        values.extend_from_slice(&outcome.values);
        outcomes.push(outcome);
    }

    Extraction {
        features: FeatureVector::from_slice_lenient(&values),
        groups: outcomes,
        synthetic_input,
        catastrophic: None,
    }
}

/// Uniform random values in [0, 1)
pub fn random_features() -> FeatureVector {
    let mut rng = rand::thread_rng();
    let mut values = [0.0f32; FEATURE_COUNT];
    for v in values.iter_mut() {
        *v = rng.gen::<f32>();
    }
    FeatureVector::new(values)
}
