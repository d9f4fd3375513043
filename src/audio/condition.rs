// Signal conditioning
// Pads short signals to one second, scrubs non-finite samples and caps the peak at 1.0

use serde::Serialize;

use crate::audio::signal::Signal;

/// What conditioning changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConditionReport {
    /// Zeros appended to reach one second
    pub padded_samples: usize,

    /// NaN or infinite samples replaced with 0.0
    pub scrubbed_samples: usize,

    /// Divisor applied when the peak exceeded 1.0
    pub normalized_by: Option<f32>,
}

impl ConditionReport {
    pub fn is_unchanged(&self) -> bool {
        self.padded_samples == 0 && self.scrubbed_samples == 0 && self.normalized_by.is_none()
    }
}

/// Condition a signal in place
///
/// 1. Right-pad with zeros to `sample_rate` samples
/// 2. Replace NaN and ±Inf with 0.0
/// 3. Divide by the peak when it exceeds 1.0 (quiet signals are never scaled up)
///
/// Already-conditioned input passes through unchanged.
pub fn condition(signal: &mut Signal) -> ConditionReport {
    let mut report = ConditionReport::default();

    let min_len = signal.sample_rate as usize;
    if signal.samples.len() < min_len {
        report.padded_samples = min_len - signal.samples.len();
        log::warn!(
            "Audio too short ({:.2}s), padding with zeros",
            signal.duration_secs()
        );
        signal.samples.resize(min_len, 0.0);
    }

    for v in signal.samples.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
            report.scrubbed_samples += 1;
        }
    }
    if report.scrubbed_samples > 0 {
        log::warn!(
            "Audio contains {} NaN or Inf values, replaced with zeros",
            report.scrubbed_samples
        );
    }

    let peak = signal.peak();
    if peak > 1.0 {
        log::info!("Normalizing audio amplitude (peak {:.3})", peak);
        for v in signal.samples.iter_mut() {
            *v /= peak;
        }
        report.normalized_by = Some(peak);
    }

    report
}
