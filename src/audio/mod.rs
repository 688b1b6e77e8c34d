// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio analysis data source.
//!
//! This module provides:
//! - Spectrum and waveform analysis for stereo, left and right channels
//! - Audio input capture via cpal

pub mod analyser;
pub mod input;

pub use analyser::{Analyser, AnalyserSettings, Spectrum};
pub use input::{list_inputs, print_inputs, AudioInput};

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Analyser shared between the capture callback and scenes
pub type SharedAnalyser = Arc<Mutex<Analyser>>;

/// Which signal an analysis reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyserChannel {
    /// Mix of both sides
    #[default]
    Stereo,
    Left,
    Right,
}

impl FromStr for AnalyserChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stereo" => Ok(AnalyserChannel::Stereo),
            "left" => Ok(AnalyserChannel::Left),
            "right" => Ok(AnalyserChannel::Right),
            other => Err(format!("unknown analyser channel: {}", other)),
        }
    }
}

/// Audio error types
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    /// No input device available
    #[error("no audio input device available")]
    NoDevice,
    /// No input device matches the requested name
    #[error("audio input \"{0}\" not found")]
    DeviceNotFound(String),
    /// Device sample format is not handled
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    /// Failed to build or start the input stream
    #[error("audio stream failed: {0}")]
    StreamFailed(String),
    /// FFT size is not a power of two in 32..=32768
    #[error("invalid FFT size {0} (power of two between 32 and 32768 required)")]
    InvalidFftSize(usize),
}
