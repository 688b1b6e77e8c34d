// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Frequency and waveform analysis over a sliding sample window.
//!
//! Spectra are computed with a Blackman window, smoothed over time and
//! scaled from decibels onto 0..255. Waveforms map -1..1 onto 0..255 with 128
//! as silence.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::warn;

use super::{AnalyserChannel, AudioError};

pub const DEFAULT_FFT_SIZE: usize = 4096;
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

/// Analysis settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    /// Window length in samples (power of two)
    pub fft_size: usize,
    /// Time smoothing constant 0..1
    pub smoothing: f32,
    /// Level mapped to 0
    pub min_decibels: f32,
    /// Level mapped to 255
    pub max_decibels: f32,
    /// Linear input gain
    pub gain: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: 0.9,
            min_decibels: -90.0,
            max_decibels: 0.0,
            gain: 1.0,
        }
    }
}

/// Analysis result: intensity values 0..255
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spectrum {
    pub data: Vec<f32>,
    pub length: usize,
}

impl Spectrum {
    fn new(data: Vec<f32>) -> Self {
        let length = data.len();
        Self { data, length }
    }
}

#[derive(Debug, Clone)]
struct SignalBuffer {
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
}

impl SignalBuffer {
    fn new(fft_size: usize) -> Self {
        Self {
            samples: VecDeque::from(vec![0.0; fft_size]),
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    fn push(&mut self, sample: f32) {
        self.samples.pop_front();
        self.samples.push_back(sample);
    }
}

/// Stereo analyser with separate left and right signals
pub struct Analyser {
    settings: AnalyserSettings,
    stereo: SignalBuffer,
    left: SignalBuffer,
    right: SignalBuffer,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl Analyser {
    /// Create an analyser. An invalid FFT size falls back to the default.
    pub fn new(settings: AnalyserSettings) -> Self {
        let mut settings = settings;
        if validate_fft_size(settings.fft_size).is_err() {
            warn!(
                "Invalid FFT size {}, using {}",
                settings.fft_size, DEFAULT_FFT_SIZE
            );
            settings.fft_size = DEFAULT_FFT_SIZE;
        }
        let size = settings.fft_size;
        Self {
            settings,
            stereo: SignalBuffer::new(size),
            left: SignalBuffer::new(size),
            right: SignalBuffer::new(size),
            window: blackman(size),
            fft: FftPlanner::new().plan_fft_forward(size),
        }
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    /// Number of frequency bins, `fft_size / 2`
    pub fn bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Change the window length. Buffered signal is discarded.
    pub fn set_fft_size(&mut self, fft_size: usize) -> Result<(), AudioError> {
        validate_fft_size(fft_size)?;
        *self = Self::new(AnalyserSettings {
            fft_size,
            ..self.settings
        });
        Ok(())
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.settings.smoothing = smoothing.clamp(0.0, 1.0);
    }

    pub fn set_decibel_range(&mut self, min_decibels: f32, max_decibels: f32) {
        self.settings.min_decibels = min_decibels;
        self.settings.max_decibels = max_decibels;
    }

    pub fn gain(&self) -> f32 {
        self.settings.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.settings.gain = gain;
    }

    /// Feed interleaved samples. Mono input feeds both sides.
    pub fn push_samples(&mut self, interleaved: &[f32], channels: usize) {
        let channels = channels.max(1);
        let gain = self.settings.gain;
        for frame in interleaved.chunks(channels) {
            let left = frame[0] * gain;
            let right = frame.get(1).map_or(left, |r| r * gain);
            self.left.push(left);
            self.right.push(right);
            self.stereo.push((left + right) * 0.5);
        }
    }

    /// Frequency intensities, optionally averaged into `segments` buckets
    pub fn frequency_data(&mut self, segments: Option<usize>, channel: AnalyserChannel) -> Spectrum {
        let settings = self.settings;
        let size = settings.fft_size;
        let fft = Arc::clone(&self.fft);
        let window = &self.window;
        let buffer = match channel {
            AnalyserChannel::Stereo => &mut self.stereo,
            AnalyserChannel::Left => &mut self.left,
            AnalyserChannel::Right => &mut self.right,
        };

        let mut bins: Vec<Complex<f32>> = buffer
            .samples
            .iter()
            .zip(window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut bins);

        let range = settings.max_decibels - settings.min_decibels;
        let data: Vec<f32> = bins
            .iter()
            .take(size / 2)
            .zip(buffer.smoothed.iter_mut())
            .map(|(bin, smoothed)| {
                let magnitude = bin.norm() / size as f32;
                *smoothed = settings.smoothing * *smoothed + (1.0 - settings.smoothing) * magnitude;
                let db = 20.0 * smoothed.log10();
                if !db.is_finite() || range <= 0.0 {
                    return 0.0;
                }
                (255.0 / range * (db - settings.min_decibels)).floor().clamp(0.0, 255.0)
            })
            .collect();

        Spectrum::new(bucket(&data, segments, size / 2))
    }

    /// Waveform values (128 = silence), optionally averaged into buckets
    pub fn waveform_data(&self, segments: Option<usize>, channel: AnalyserChannel) -> Spectrum {
        let size = self.settings.fft_size;
        let buffer = match channel {
            AnalyserChannel::Stereo => &self.stereo,
            AnalyserChannel::Left => &self.left,
            AnalyserChannel::Right => &self.right,
        };
        let data: Vec<f32> = buffer
            .samples
            .iter()
            .skip(size - size / 2)
            .map(|s| (128.0 * (1.0 + s)).floor().clamp(0.0, 255.0))
            .collect();

        Spectrum::new(bucket(&data, segments, size / 2))
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new(AnalyserSettings::default())
    }
}

fn validate_fft_size(fft_size: usize) -> Result<(), AudioError> {
    if fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
        Ok(())
    } else {
        Err(AudioError::InvalidFftSize(fft_size))
    }
}

fn blackman(size: usize) -> Vec<f32> {
    let alpha = 0.16;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Average `data` into `segments` contiguous buckets.
///
/// Requests above `max` are clamped with a warning; `None` or `Some(0)`
/// return the data unchanged.
pub(crate) fn bucket(data: &[f32], segments: Option<usize>, max: usize) -> Vec<f32> {
    let requested = match segments {
        Some(n) if n > 0 => n,
        _ => return data.to_vec(),
    };
    let count = if requested > max {
        warn!("Requested {} segments, only {} available", requested, max);
        max
    } else {
        requested
    };
    let len = data.len();
    if count == 0 || len == 0 {
        return Vec::new();
    }

    (0..count)
        .map(|i| {
            let start = i * len / count;
            let end = ((i + 1) * len / count).max(start + 1).min(len);
            let chunk = &data[start..end];
            chunk.iter().sum::<f32>() / chunk.len() as f32
        })
        .collect()
}
