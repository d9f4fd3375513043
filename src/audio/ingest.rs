// Audio ingestion module
// Decodes a recording to mono samples: WAV first, then any container symphonia can
// probe (resampled to the analysis rate), then a synthetic tone as the last resort

use hound::{SampleFormat, WavReader};
use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::signal::{Signal, ANALYSIS_SAMPLE_RATE};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("Audio file is empty (0 bytes): {0}")]
    EmptyInput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Resample failed: {0}")]
    Resample(String),

    #[error("Invalid audio data")]
    InvalidData,
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples normalized to f32 in range [-1.0, 1.0]
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 16000, 44100)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of original audio (8, 16, 24, 32)
    pub bit_depth: u16,

    /// Duration in milliseconds
    pub duration_ms: i64,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    /// Get duration in seconds as f64
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    pub fn into_signal(self) -> Signal {
        let samples = self.to_mono();
        Signal::new(samples, self.sample_rate)
    }
}

/// Which decode strategy produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeSource {
    /// Read directly as WAV at its native sample rate
    Wav,

    /// Decoded by the general-purpose decoder and resampled
    Resampled,

    /// Neither decoder could read the file; a synthetic tone stands in
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub signal: Signal,
    pub source: DecodeSource,

    /// Why earlier strategies were skipped, in the order they were tried
    pub fallback_reasons: Vec<String>,
}

/// Ingest a WAV file from raw bytes
/// Returns AudioData with normalized samples and metadata
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    let mut reader = WavReader::new(Cursor::new(data))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;
    let bit_depth = spec.bits_per_sample;
    let sample_format = spec.sample_format;

    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::InvalidData);
    }

    let samples: Vec<f32> = match (sample_format, bit_depth) {
        (SampleFormat::Int, 8) => {
            // hound converts unsigned 8-bit storage to signed [-128, 127]
            reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                sample_format, bit_depth
            )));
        }
    };

    let frame_count = samples.len() / channels as usize;
    let duration_ms = (frame_count as f64 / sample_rate as f64 * 1000.0) as i64;

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        bit_depth,
        duration_ms,
        frame_count,
    })
}

/// Decode any container symphonia can probe, downmix to mono and resample to `target_rate`
pub fn decode_general(
    data: &[u8],
    extension: Option<&str>,
    target_rate: u32,
) -> Result<Signal, AudioError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode(format!("probe failed: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Decode("no audio track found".to_string()))?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioError::Decode("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode(format!("codec init failed: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(AudioError::Decode(format!("packet read: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| AudioError::Decode(format!("decode: {}", e)))?;

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        if channels > 1 {
            mono.extend(
                buffer
                    .samples()
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        } else {
            mono.extend_from_slice(buffer.samples());
        }
    }

    if mono.is_empty() {
        return Err(AudioError::Decode("no audio samples decoded".to_string()));
    }

    let samples = if source_rate != target_rate {
        resample(&mono, source_rate, target_rate)?
    } else {
        mono
    };

    Ok(Signal::new(samples, target_rate))
}

/// Resample mono audio from `from_rate` to `to_rate`
/// Output length is `round(len * to_rate / from_rate)` with the filter delay removed
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid rates {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AudioError::Resample(format!("init: {}", e)))?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + chunk_size);

    // Keep feeding (zero-padded past the end) until the delayed tail has been flushed
    let mut pos = 0;
    while output.len() < expected + delay {
        let mut chunk = if pos < samples.len() {
            samples[pos..(pos + chunk_size).min(samples.len())].to_vec()
        } else {
            Vec::new()
        };
        chunk.resize(chunk_size, 0.0);
        pos += chunk_size;

        let resampled = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioError::Resample(format!("process: {}", e)))?;

        match resampled.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => break,
        }
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Decode a file at `path` using the default analysis rate for resampled decodes
pub fn decode_file(path: &Path) -> Result<Decoded, AudioError> {
    decode_file_at(path, ANALYSIS_SAMPLE_RATE)
}

/// Decode a file, trying WAV, then general decode at `target_rate`, then the synthetic tone
///
/// Only a missing or zero-byte file is an error; every other failure degrades.
pub fn decode_file_at(path: &Path, target_rate: u32) -> Result<Decoded, AudioError> {
    if !path.exists() {
        log::error!("Audio file not found: {}", path.display());
        return Err(AudioError::NotFound(path.to_path_buf()));
    }

    let size = fs::metadata(path)?.len();
    log::info!("Processing audio file: {} ({} bytes)", path.display(), size);
    if size == 0 {
        log::error!("Audio file is empty (0 bytes): {}", path.display());
        return Err(AudioError::EmptyInput(path.to_path_buf()));
    }

    let mut fallback_reasons = Vec::new();

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Could not read {}: {}", path.display(), e);
            fallback_reasons.push(format!("read: {}", e));
            return Ok(synthetic(fallback_reasons));
        }
    };

    match ingest_wav(&data) {
        Ok(audio) => {
            let signal = audio.into_signal();
            log::info!(
                "Decoded WAV: {:.2}s at {} Hz",
                signal.duration_secs(),
                signal.sample_rate
            );
            return Ok(Decoded {
                signal,
                source: DecodeSource::Wav,
                fallback_reasons,
            });
        }
        Err(e) => {
            log::warn!("WAV decode failed ({}), trying general decoder", e);
            fallback_reasons.push(format!("wav: {}", e));
        }
    }

    let extension = path.extension().and_then(|e| e.to_str());
    match decode_general(&data, extension, target_rate) {
        Ok(signal) => {
            log::info!(
                "Decoded with general decoder: {:.2}s at {} Hz",
                signal.duration_secs(),
                signal.sample_rate
            );
            Ok(Decoded {
                signal,
                source: DecodeSource::Resampled,
                fallback_reasons,
            })
        }
        Err(e) => {
            log::warn!("General decode failed ({}), using synthetic tone", e);
            fallback_reasons.push(format!("general: {}", e));
            Ok(synthetic(fallback_reasons))
        }
    }
}

fn synthetic(fallback_reasons: Vec<String>) -> Decoded {
    Decoded {
        signal: Signal::synthetic_tone(ANALYSIS_SAMPLE_RATE),
        source: DecodeSource::Synthetic,
        fallback_reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_audio_data_to_mono() {
        // Stereo: [L, R, L, R, L, R]
        let audio_data = AudioData {
            samples: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            sample_rate: 44100,
            channels: 2,
            bit_depth: 16,
            duration_ms: 1,
            frame_count: 3,
        };

        let mono = audio_data.to_mono();

        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.15).abs() < 1e-6);
        assert!((mono[1] - 0.35).abs() < 1e-6);
        assert!((mono[2] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_audio_data_duration_secs() {
        let audio_data = AudioData {
            samples: vec![],
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
            duration_ms: 5000,
            frame_count: 0,
        };

        assert_eq!(audio_data.duration_secs(), 5.0);
    }

    #[test]
    fn test_ingest_wav_16bit_stereo() {
        let data = wav_bytes(&[16384, -16384, 0, 32767], 16000, 2);
        let audio = ingest_wav(&data).unwrap();

        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frame_count, 2);

        let signal = audio.into_signal();
        assert_eq!(signal.samples.len(), 2);
        assert!(signal.samples[0].abs() < 1e-6);
    }

    #[test]
    fn test_ingest_wav_8bit_is_centered() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0i8).unwrap();
            writer.write_sample(64i8).unwrap();
            writer.finalize().unwrap();
        }

        let audio = ingest_wav(&cursor.into_inner()).unwrap();
        assert_eq!(audio.samples, vec![0.0, 0.5]);
    }

    #[test]
    fn test_ingest_garbage_fails() {
        assert!(ingest_wav(b"definitely not a wav file").is_err());
    }

    #[test]
    fn test_decode_missing_file() {
        let dir = tempdir().unwrap();
        let result = decode_file(&dir.path().join("missing.wav"));
        assert!(matches!(result, Err(AudioError::NotFound(_))));
    }

    #[test]
    fn test_decode_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        fs::write(&path, b"").unwrap();

        assert!(matches!(decode_file(&path), Err(AudioError::EmptyInput(_))));
    }

    #[test]
    fn test_decode_garbage_gives_synthetic_tone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.wav");
        fs::write(&path, b"RIFF garbage that is not audio at all").unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.source, DecodeSource::Synthetic);
        assert_eq!(decoded.signal.samples.len(), 66150);
        assert_eq!(decoded.signal.sample_rate, 22050);
        assert_eq!(decoded.fallback_reasons.len(), 2);
    }

    #[test]
    fn test_decode_wav_keeps_native_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..8000).map(|i| ((i % 50) as i16 - 25) * 100).collect();
        fs::write(&path, wav_bytes(&samples, 8000, 1)).unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.source, DecodeSource::Wav);
        assert_eq!(decoded.signal.sample_rate, 8000);
        assert_eq!(decoded.signal.samples.len(), 8000);
        assert!(decoded.fallback_reasons.is_empty());
    }

    #[test]
    fn test_decode_general_resamples_wav() {
        let samples: Vec<i16> = (0..16000).map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16).collect();
        let data = wav_bytes(&samples, 16000, 1);

        let signal = decode_general(&data, Some("wav"), 22050).unwrap();
        assert_eq!(signal.sample_rate, 22050);
        assert_eq!(signal.samples.len(), 22050);
    }

    #[test]
    fn test_resample_lengths() {
        let samples: Vec<f32> = (0..48000).map(|i| (i as f32 / 48000.0).sin()).collect();
        let down = resample(&samples, 48000, 16000).unwrap();
        assert_eq!(down.len(), 16000);

        let same = resample(&samples, 48000, 48000).unwrap();
        assert_eq!(same.len(), samples.len());

        assert!(resample(&samples, 0, 16000).is_err());
    }
}
