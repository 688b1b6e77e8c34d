// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Stage configuration.
//!
//! A single YAML file describes the MIDI clock and control mapping, the
//! audio analyser, the output surface and the scene groups to register.
//! Every field has a default, so an empty file is a valid configuration.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::AnalyserSettings;
use crate::control::{
    ControlMapping, MidiChannel, DEFAULT_SCENE_CHANGE_CC, DEFAULT_SCENE_PARAM_CC,
};
use crate::scene::SceneId;
use crate::scenes;
use crate::timing::TempoSettings;

/// Root stage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageConfig {
    #[serde(default)]
    pub midi: MidiSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub render: RenderSettings,
    /// Scene groups, registered in order
    #[serde(default)]
    pub scenes: Vec<SceneGroupConfig>,
}

impl StageConfig {
    /// Load a stage configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a stage configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as a map
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))
    }

    /// Check value ranges and scene kinds
    pub fn validate(&self) -> Result<()> {
        let midi = &self.midi;
        if !(midi.bpm > 0.0) {
            bail!("midi.bpm must be positive, got {}", midi.bpm);
        }
        if let Some(effective) = midi.effective_bpm {
            if !(effective > 0.0) {
                bail!("midi.effective_bpm must be positive, got {}", effective);
            }
        }
        if midi.beats_per_bar == 0 {
            bail!("midi.beats_per_bar must be at least 1");
        }
        for (name, cc) in [
            ("cc_scene_change", midi.cc_scene_change),
            ("cc_scene_value", midi.cc_scene_value),
        ] {
            if cc > 127 {
                bail!("midi.{} must be 0-127, got {}", name, cc);
            }
        }
        if !midi.channel.is_valid() {
            bail!("midi.channel must be 1-16 or \"all\", got {}", midi.channel);
        }

        let audio = &self.audio;
        if !audio.fft_size.is_power_of_two() || !(32..=32768).contains(&audio.fft_size) {
            bail!(
                "audio.fft_size must be a power of two between 32 and 32768, got {}",
                audio.fft_size
            );
        }
        if !(0.0..=1.0).contains(&audio.smoothing) {
            bail!("audio.smoothing must be 0-1, got {}", audio.smoothing);
        }
        if audio.min_decibels >= audio.max_decibels {
            bail!(
                "audio.min_decibels ({}) must be below audio.max_decibels ({})",
                audio.min_decibels,
                audio.max_decibels
            );
        }

        if self.render.fps == 0 {
            bail!("render.fps must be at least 1");
        }
        if self.render.width == 0 || self.render.height == 0 {
            bail!("render size must be non-zero");
        }

        for group in &self.scenes {
            for kind in &group.scenes {
                if !scenes::KINDS.contains(&kind.as_str()) {
                    bail!(
                        "scene group {}: unknown scene kind \"{}\" (known: {})",
                        group.id,
                        kind,
                        scenes::KINDS.join(", ")
                    );
                }
            }
        }
        Ok(())
    }
}

/// MIDI clock and control settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MidiSettings {
    /// Input device name
    #[serde(default)]
    pub device: Option<String>,
    /// Tempo set on the device
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    /// Felt tempo when the device clock runs at a multiple
    #[serde(default)]
    pub effective_bpm: Option<f64>,
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,
    #[serde(default = "default_cc_scene_change")]
    pub cc_scene_change: u8,
    #[serde(default = "default_cc_scene_value")]
    pub cc_scene_value: u8,
    /// Listening channel for scene control
    #[serde(default)]
    pub channel: MidiChannel,
}

fn default_bpm() -> f64 {
    120.0
}
fn default_beats_per_bar() -> u32 {
    4
}
fn default_cc_scene_change() -> u8 {
    DEFAULT_SCENE_CHANGE_CC
}
fn default_cc_scene_value() -> u8 {
    DEFAULT_SCENE_PARAM_CC
}

impl Default for MidiSettings {
    fn default() -> Self {
        Self {
            device: None,
            bpm: default_bpm(),
            effective_bpm: None,
            beats_per_bar: default_beats_per_bar(),
            cc_scene_change: default_cc_scene_change(),
            cc_scene_value: default_cc_scene_value(),
            channel: MidiChannel::default(),
        }
    }
}

impl MidiSettings {
    pub fn tempo(&self) -> TempoSettings {
        TempoSettings {
            bpm: self.bpm,
            effective_bpm: self.effective_bpm,
            beats_per_bar: self.beats_per_bar,
        }
    }

    pub fn mapping(&self) -> ControlMapping {
        ControlMapping {
            scene_change_cc: self.cc_scene_change,
            scene_param_cc: self.cc_scene_value,
            channel: self.channel,
        }
    }
}

/// Audio analyser settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioSettings {
    /// Input device name, default input when unset
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    #[serde(default)]
    pub max_decibels: f32,
    #[serde(default = "default_gain")]
    pub gain: f32,
}

fn default_fft_size() -> usize {
    4096
}
fn default_smoothing() -> f32 {
    0.9
}
fn default_min_decibels() -> f32 {
    -90.0
}
fn default_gain() -> f32 {
    1.0
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: 0.0,
            gain: default_gain(),
        }
    }
}

impl AudioSettings {
    pub fn analyser(&self) -> AnalyserSettings {
        AnalyserSettings {
            fft_size: self.fft_size,
            smoothing: self.smoothing,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
            gain: self.gain,
        }
    }
}

/// Output surface settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderSettings {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Log the measured frame rate
    #[serde(default)]
    pub show_stats: bool,
}

fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_fps() -> u32 {
    60
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            show_stats: false,
        }
    }
}

/// A scene group: its id and the scene kinds it instantiates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneGroupConfig {
    pub id: SceneId,
    #[serde(default)]
    pub scenes: Vec<String>,
}
