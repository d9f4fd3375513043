// Spectral analysis primitives
// Framing, STFT, mel and chroma filterbanks, DCT and the per-frame descriptors built on them.
// Conventions: 2048-point frames, 512 hop, frames centered on hop boundaries.

use realfft::RealFftPlanner;
use std::f64::consts::PI;

use crate::audio::features::FeatureError;

/// FFT size and analysis frame length
pub const N_FFT: usize = 2048;

/// Samples between successive frames
pub const HOP_LENGTH: usize = 512;

/// Mel bands used for MFCC
pub const N_MELS: usize = 128;

/// Pitch classes in a chroma vector
pub const N_CHROMA: usize = 12;

/// Fraction of spectral energy below the rolloff frequency
pub const ROLLOFF_PERCENT: f32 = 0.85;

/// Dynamic range kept when converting mel power to decibels
pub const TOP_DB: f32 = 80.0;

/// Floor applied before taking logs of power
const AMIN: f32 = 1e-10;

/// |x| at or below this counts as zero for crossing detection
const ZERO_THRESHOLD: f32 = 1e-10;

/// Periodic Hann window (suited to overlapping FFT frames)
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos())) as f32)
        .collect()
}

/// Pad `pad` zeros on both sides
fn pad_constant(samples: &[f32], pad: usize) -> Vec<f32> {
    let mut padded = vec![0.0; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);
    padded
}

/// Pad by repeating the first and last sample
fn pad_edge(samples: &[f32], pad: usize) -> Vec<f32> {
    let first = samples.first().copied().unwrap_or(0.0);
    let last = samples.last().copied().unwrap_or(0.0);

    let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
    padded.resize(pad, first);
    padded.extend_from_slice(samples);
    padded.resize(samples.len() + 2 * pad, last);
    padded
}

/// Iterate over full frames of `padded`
fn frames(padded: &[f32], frame_length: usize, hop: usize) -> impl Iterator<Item = &[f32]> {
    let n_frames = if padded.len() >= frame_length {
        1 + (padded.len() - frame_length) / hop
    } else {
        0
    };
    (0..n_frames).map(move |i| &padded[i * hop..i * hop + frame_length])
}

/// Zero-crossing rate per frame (crossings / frame length)
pub fn zero_crossing_rate(samples: &[f32]) -> Vec<f32> {
    let clipped: Vec<f32> = samples
        .iter()
        .map(|&v| if v.abs() <= ZERO_THRESHOLD { 0.0 } else { v })
        .collect();
    let padded = pad_edge(&clipped, N_FFT / 2);

    frames(&padded, N_FFT, HOP_LENGTH)
        .map(|frame| {
            let crossings = frame
                .windows(2)
                .filter(|pair| pair[0].is_sign_negative() != pair[1].is_sign_negative())
                .count();
            crossings as f32 / N_FFT as f32
        })
        .collect()
}

/// Root-mean-square energy per frame
pub fn rms(samples: &[f32]) -> Vec<f32> {
    let padded = pad_constant(samples, N_FFT / 2);

    frames(&padded, N_FFT, HOP_LENGTH)
        .map(|frame| {
            let power = frame.iter().map(|&v| (v as f64).powi(2)).sum::<f64>() / N_FFT as f64;
            power.sqrt() as f32
        })
        .collect()
}

/// Center frequency of every FFT bin
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..=n_fft / 2)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Magnitude short-time Fourier transform
#[derive(Debug, Clone)]
pub struct Stft {
    /// One magnitude spectrum (`N_FFT / 2 + 1` bins) per frame
    pub magnitudes: Vec<Vec<f32>>,

    pub sample_rate: u32,
}

impl Stft {
    pub fn compute(samples: &[f32], sample_rate: u32) -> Result<Self, FeatureError> {
        if sample_rate == 0 {
            return Err(FeatureError::InvalidSampleRate(sample_rate));
        }
        // Every spectral group shares this transform, so NaN/Inf fails them together
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(FeatureError::NonFinite { group: "stft" });
        }

        let padded = pad_constant(samples, N_FFT / 2);
        let window = hann_window(N_FFT);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(N_FFT);
        let mut input = fft.make_input_vec();
        let mut spectrum = fft.make_output_vec();

        let mut magnitudes = Vec::new();
        for frame in frames(&padded, N_FFT, HOP_LENGTH) {
            for ((dst, &s), &w) in input.iter_mut().zip(frame.iter()).zip(window.iter()) {
                *dst = s * w;
            }
            fft.process(&mut input, &mut spectrum)
                .map_err(|e| FeatureError::Fft(e.to_string()))?;
            magnitudes.push(spectrum.iter().map(|c| c.norm()).collect());
        }

        if magnitudes.is_empty() {
            return Err(FeatureError::EmptySignal);
        }

        Ok(Stft {
            magnitudes,
            sample_rate,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.magnitudes.len()
    }

    /// Squared magnitudes
    pub fn power(&self) -> Vec<Vec<f32>> {
        self.magnitudes
            .iter()
            .map(|frame| frame.iter().map(|m| m * m).collect())
            .collect()
    }

    pub fn frequencies(&self) -> Vec<f32> {
        fft_frequencies(self.sample_rate, N_FFT)
    }
}

/// Magnitude column scaled to unit L1 norm; all-zero columns stay zero
fn l1_normalized(frame: &[f32]) -> Vec<f64> {
    let total: f64 = frame.iter().map(|&m| m.abs() as f64).sum();
    if total < f64::MIN_POSITIVE {
        return vec![0.0; frame.len()];
    }
    frame.iter().map(|&m| m as f64 / total).collect()
}

/// Spectral centroid per frame in Hz
pub fn spectral_centroid(stft: &Stft) -> Vec<f32> {
    let freqs = stft.frequencies();
    stft.magnitudes
        .iter()
        .map(|frame| {
            l1_normalized(frame)
                .iter()
                .zip(freqs.iter())
                .map(|(w, &f)| w * f as f64)
                .sum::<f64>() as f32
        })
        .collect()
}

/// Second-order spectral bandwidth per frame in Hz
pub fn spectral_bandwidth(stft: &Stft) -> Vec<f32> {
    let freqs = stft.frequencies();
    let centroids = spectral_centroid(stft);

    stft.magnitudes
        .iter()
        .zip(centroids.iter())
        .map(|(frame, &centroid)| {
            l1_normalized(frame)
                .iter()
                .zip(freqs.iter())
                .map(|(w, &f)| w * (f as f64 - centroid as f64).powi(2))
                .sum::<f64>()
                .sqrt() as f32
        })
        .collect()
}

/// Lowest frequency below which `percent` of the frame's magnitude lies
/// Silent frames roll off at 0 Hz
pub fn spectral_rolloff(stft: &Stft, percent: f32) -> Vec<f32> {
    let freqs = stft.frequencies();
    stft.magnitudes
        .iter()
        .map(|frame| {
            let total: f64 = frame.iter().map(|&m| m as f64).sum();
            let threshold = percent as f64 * total;

            let mut cumulative = 0.0f64;
            for (&m, &f) in frame.iter().zip(freqs.iter()) {
                cumulative += m as f64;
                if cumulative >= threshold {
                    return f;
                }
            }
            freqs.last().copied().unwrap_or(0.0)
        })
        .collect()
}

/// Hz to mel on the Slaney scale (linear below 1 kHz, logarithmic above)
pub fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f64.ln() / 27.0;

    if mel >= min_log_mel {
        MIN_LOG_HZ * (logstep * (mel - min_log_mel)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filterbank spanning 0 Hz to Nyquist, area-normalized per band
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let enorm = 2.0 / (hi - lo);

            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - lo) / (center - lo);
                    let upper = (hi - f) / (hi - center);
                    (lower.min(upper).max(0.0) * enorm) as f32
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II of `input`, keeping the first `n_out` coefficients
pub fn dct_ortho(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_out];
    }

    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| x as f64 * (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos())
                .sum();
            let scale = if k == 0 {
                (1.0 / n as f64).sqrt()
            } else {
                (2.0 / n as f64).sqrt()
            };
            (sum * scale) as f32
        })
        .collect()
}

/// Mel power spectrogram in dB, floored at `TOP_DB` below the global peak
fn log_mel_spectrogram(stft: &Stft) -> Vec<Vec<f32>> {
    let filterbank = mel_filterbank(stft.sample_rate, N_FFT, N_MELS);

    let mut db: Vec<Vec<f32>> = stft
        .power()
        .iter()
        .map(|frame| {
            filterbank
                .iter()
                .map(|filter| {
                    let energy: f32 = filter.iter().zip(frame.iter()).map(|(w, p)| w * p).sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect()
        })
        .collect();

    let peak = db
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - TOP_DB;
    for v in db.iter_mut().flat_map(|frame| frame.iter_mut()) {
        *v = v.max(floor);
    }

    db
}

/// MFCC series, indexed `[coefficient][frame]`
pub fn mfcc(stft: &Stft, n_mfcc: usize) -> Vec<Vec<f32>> {
    let mut series = vec![Vec::with_capacity(stft.n_frames()); n_mfcc];
    for frame in log_mel_spectrogram(stft) {
        for (coefficient, value) in series.iter_mut().zip(dct_ortho(&frame, n_mfcc)) {
            coefficient.push(value);
        }
    }
    series
}

/// Log2 octaves relative to C0-ish reference (A440 / 16)
/// Octaves above C0 (A440 / 16), with A shifted by `tuning` fractions of a semitone
fn hz_to_octs(hz: f64, tuning: f64) -> f64 {
    let a440 = 440.0 * 2f64.powf(tuning / N_CHROMA as f64);
    (hz / (a440 / 16.0)).log2()
}

/// Lowest and highest frequency considered when picking pitch peaks
const PITCH_FMIN: f64 = 150.0;
const PITCH_FMAX: f64 = 4000.0;

/// Peaks below this fraction of the frame maximum are ignored
const PITCH_PEAK_THRESHOLD: f64 = 0.1;

/// Histogram step for tuning estimation, in semitones
const TUNING_RESOLUTION: f64 = 0.01;

/// Parabolic-interpolated spectral peaks as `(frequency, magnitude)` pairs
fn pitch_peaks(stft: &Stft) -> Vec<(f64, f64)> {
    let sr = stft.sample_rate as f64;
    let fmax = PITCH_FMAX.min(sr / 2.0);
    let bin_hz = sr / N_FFT as f64;
    let mut peaks = Vec::new();

    for frame in stft.power() {
        let s: Vec<f64> = frame.iter().map(|&p| p as f64).collect();
        let ref_value = PITCH_PEAK_THRESHOLD * s.iter().copied().fold(0.0, f64::max);
        let masked = |k: usize| if s[k] > ref_value { s[k] } else { 0.0 };

        for k in 1..s.len().saturating_sub(1) {
            let freq = k as f64 * bin_hz;
            if freq < PITCH_FMIN || freq >= fmax {
                continue;
            }
            let here = masked(k);
            if !(here > masked(k - 1) && here >= masked(k + 1)) {
                continue;
            }

            let avg = 0.5 * (s[k + 1] - s[k - 1]);
            let mut curvature = 2.0 * s[k] - s[k + 1] - s[k - 1];
            if curvature.abs() < f64::MIN_POSITIVE {
                curvature += 1.0;
            }
            let shift = avg / curvature;
            let pitch = (k as f64 + shift) * bin_hz;
            if pitch > 0.0 {
                peaks.push((pitch, s[k] + 0.5 * avg * shift));
            }
        }
    }

    peaks
}

/// Most common deviation of `frequencies` from equal temperament, in `[-0.5, 0.5)` semitones
pub fn pitch_tuning(frequencies: &[f64]) -> f64 {
    let n_bins = (1.0 / TUNING_RESOLUTION).ceil() as usize;
    let mut counts = vec![0usize; n_bins];
    let mut any = false;

    for &hz in frequencies.iter().filter(|&&hz| hz > 0.0) {
        let mut residual = (N_CHROMA as f64 * hz_to_octs(hz, 0.0)).rem_euclid(1.0);
        if residual >= 0.5 {
            residual -= 1.0;
        }
        let bin = (((residual + 0.5) / TUNING_RESOLUTION).floor() as usize).min(n_bins - 1);
        counts[bin] += 1;
        any = true;
    }
    if !any {
        return 0.0;
    }

    let best = counts
        .iter()
        .enumerate()
        .fold((0, 0), |acc, (i, &c)| if c > acc.1 { (i, c) } else { acc });
    -0.5 + best.0 as f64 * TUNING_RESOLUTION
}

/// Tuning offset of the recording, from its strongest spectral peaks
/// Returns 0 when no peak is found
pub fn estimate_tuning(stft: &Stft) -> f64 {
    let peaks = pitch_peaks(stft);
    if peaks.is_empty() {
        return 0.0;
    }

    let mut mags: Vec<f64> = peaks.iter().map(|&(_, m)| m).collect();
    mags.sort_by(|a, b| a.total_cmp(b));
    let mid = mags.len() / 2;
    let threshold = if mags.len() % 2 == 0 {
        0.5 * (mags[mid - 1] + mags[mid])
    } else {
        mags[mid]
    };

    let strong: Vec<f64> = peaks
        .iter()
        .filter(|&&(_, m)| m >= threshold)
        .map(|&(hz, _)| hz)
        .collect();
    pitch_tuning(&strong)
}

/// Chroma filterbank `[pitch class][bin]`, rows starting at C
///
/// Each FFT bin spreads Gaussian weight over the pitch classes near it, columns are
/// L2-normalized, then weighted by a Gaussian over octaves centered on octave 5.
/// `tuning` shifts the reference A by that many semitones.
pub fn chroma_filterbank(sample_rate: u32, n_fft: usize, tuning: f64) -> Vec<Vec<f32>> {
    const CENTER_OCTAVE: f64 = 5.0;
    const OCTAVE_WIDTH: f64 = 2.0;
    let n_chroma = N_CHROMA as f64;

    // Bin positions in chroma units; bin 0 (DC) sits 1.5 octaves below bin 1
    let mut frqbins: Vec<f64> = (1..n_fft)
        .map(|k| n_chroma * hz_to_octs(k as f64 * sample_rate as f64 / n_fft as f64, tuning))
        .collect();
    frqbins.insert(0, frqbins[0] - 1.5 * n_chroma);

    let mut binwidths: Vec<f64> = frqbins.windows(2).map(|w| (w[1] - w[0]).max(1.0)).collect();
    binwidths.push(1.0);

    let half = (n_chroma / 2.0).round();
    let mut weights = vec![vec![0.0f64; n_fft]; N_CHROMA];
    for (bin, (&pos, &width)) in frqbins.iter().zip(binwidths.iter()).enumerate() {
        for (class, row) in weights.iter_mut().enumerate() {
            let d = (pos - class as f64 + half + 10.0 * n_chroma).rem_euclid(n_chroma) - half;
            row[bin] = (-0.5 * (2.0 * d / width).powi(2)).exp();
        }
    }

    for bin in 0..n_fft {
        let norm = weights.iter().map(|row| row[bin].powi(2)).sum::<f64>().sqrt();
        let octave_weight =
            (-0.5 * ((frqbins[bin] / n_chroma - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();
        for row in weights.iter_mut() {
            if norm > f64::MIN_POSITIVE {
                row[bin] /= norm;
            }
            row[bin] *= octave_weight;
        }
    }

    // Rows come out starting at A; rotate so row 0 is C
    weights.rotate_left(3);

    weights
        .into_iter()
        .map(|row| row[..n_fft / 2 + 1].iter().map(|&w| w as f32).collect())
        .collect()
}

/// Chromagram, indexed `[frame][pitch class]`, each frame scaled to a maximum of 1
/// The filterbank follows the tuning estimated from the recording itself
pub fn chroma(stft: &Stft) -> Vec<Vec<f32>> {
    let tuning = estimate_tuning(stft);
    let filterbank = chroma_filterbank(stft.sample_rate, N_FFT, tuning);

    stft.power()
        .iter()
        .map(|frame| {
            let raw: Vec<f32> = filterbank
                .iter()
                .map(|filter| filter.iter().zip(frame.iter()).map(|(w, p)| w * p).sum())
                .collect();
            let peak = raw.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
            if peak > f32::MIN_POSITIVE {
                raw.iter().map(|v| v / peak).collect()
            } else {
                raw
            }
        })
        .collect()
}

/// Mean and population standard deviation
pub fn mean_std<I: IntoIterator<Item = f32>>(values: I) -> (f32, f32) {
    let values: Vec<f64> = values.into_iter().map(|v| v as f64).collect();
    if values.is_empty() {
        return (f32::NAN, f32::NAN);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, variance.sqrt() as f32)
}
