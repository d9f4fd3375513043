// Mono signal type
// Samples plus sample rate, and the deterministic synthetic tone used when decoding fails

use serde::Serialize;
use std::f64::consts::PI;

/// Sample rate of the synthetic tone and of resampled decodes
pub const ANALYSIS_SAMPLE_RATE: u32 = 22050;

/// Synthetic tone frequency in Hz
pub const SYNTHETIC_TONE_HZ: f32 = 440.0;

/// Synthetic tone length in seconds
pub const SYNTHETIC_TONE_SECS: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Mono samples, nominally in [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Summary statistics over the samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalStats {
    pub duration_secs: f32,
    pub sample_rate: u32,
    pub min_amplitude: f32,
    pub max_amplitude: f32,
    pub mean_amplitude: f32,
    pub rms: f32,
}

impl Signal {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Signal {
            samples,
            sample_rate,
        }
    }

    /// 3 s, 440 Hz sine at `sample_rate`
    ///
    /// Time points are spaced evenly over [0, 3] with both ends included, so the
    /// last sample lands exactly on t = 3.
    pub fn synthetic_tone(sample_rate: u32) -> Self {
        let n = sample_rate as usize * SYNTHETIC_TONE_SECS as usize;
        let step = if n > 1 {
            SYNTHETIC_TONE_SECS as f64 / (n - 1) as f64
        } else {
            0.0
        };

        let samples = (0..n)
            .map(|i| {
                let t = i as f64 * step;
                (2.0 * PI * SYNTHETIC_TONE_HZ as f64 * t).sin() as f32
            })
            .collect();

        Signal {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Largest absolute sample value, ignoring NaN
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .filter(|v| !v.is_nan())
            .fold(0.0f32, |acc, v| acc.max(v.abs()))
    }

    pub fn stats(&self) -> SignalStats {
        let (min, max, sum, sum_sq) = self.samples.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f64, 0.0f64),
            |(min, max, sum, sum_sq), &v| {
                (min.min(v), max.max(v), sum + v as f64, sum_sq + (v as f64).powi(2))
            },
        );

        let n = self.samples.len().max(1) as f64;
        SignalStats {
            duration_secs: self.duration_secs(),
            sample_rate: self.sample_rate,
            min_amplitude: if self.is_empty() { 0.0 } else { min },
            max_amplitude: if self.is_empty() { 0.0 } else { max },
            mean_amplitude: (sum / n) as f32,
            rms: (sum_sq / n).sqrt() as f32,
        }
    }
}
