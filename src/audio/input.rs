// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio input via cpal, feeding the analyser.

use std::sync::{Arc, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SizedSample, Stream, StreamConfig};
use tracing::{error, info};

use super::{AudioError, SharedAnalyser};

/// Running capture stream. Capture stops when this is dropped.
pub struct AudioInput {
    _stream: Stream,
    device: String,
    sample_rate: u32,
    channels: u16,
}

impl AudioInput {
    /// Open an input device by name (substring match), or the default input
    pub fn open(device: Option<&str>, analyser: SharedAnalyser) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = match device {
            Some(name) => find_input(&host, name)?,
            None => host.default_input_device().ok_or(AudioError::NoDevice)?,
        };
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::StreamFailed(format!("Failed to get default config: {}", e)))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), analyser),
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), analyser),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), analyser),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::StreamFailed(format!("Failed to start stream: {}", e)))?;

        info!("Active audio device: {} ({} Hz, {} ch)", name, sample_rate, channels);

        Ok(Self {
            _stream: stream,
            device: name,
            sample_rate,
            channels,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

fn find_input(host: &cpal::Host, name: &str) -> Result<Device, AudioError> {
    let needle = name.to_lowercase();
    host.input_devices()
        .map_err(|e| AudioError::StreamFailed(format!("Failed to enumerate inputs: {}", e)))?
        .find(|d| {
            d.name()
                .map(|n| n == name || n.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    analyser: SharedAnalyser,
) -> Result<Stream, AudioError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;
    let analyser = Arc::clone(&analyser);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|s| s.to_sample::<f32>()));
                analyser
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_samples(&scratch, channels);
            },
            |err| error!("Audio input error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamFailed(format!("Failed to build stream: {}", e)))
}

/// List available audio input devices
pub fn list_inputs() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Print available audio inputs to stdout
pub fn print_inputs() {
    let inputs = list_inputs();
    if inputs.is_empty() {
        println!("No audio inputs found.");
    } else {
        println!("Available audio inputs:");
        for (i, name) in inputs.iter().enumerate() {
            println!("  {}: {}", i, name);
        }
    }
}
