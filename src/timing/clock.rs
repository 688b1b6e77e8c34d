// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tempo clock driven by incoming MIDI clock pulses.
//!
//! MIDI clock runs at 24 PPQN (Pulses Per Quarter Note). The tempo clock
//! counts pulses and declares beat and bar boundaries from them, optionally
//! corrected for a device running at a multiple of the felt tempo.

use crate::events::{BarEvent, BeatEvent, Event};

/// Pulses Per Quarter Note - MIDI standard is 24
pub const PPQN: u32 = 24;

/// Lowest accepted nominal tempo
pub const MIN_BPM: f64 = 1.0;

/// Tempo configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoSettings {
    /// Tempo set on the device
    pub bpm: f64,
    /// Felt tempo when the device runs at a multiplied rate for resolution
    pub effective_bpm: Option<f64>,
    /// Beats per bar
    pub beats_per_bar: u32,
}

impl TempoSettings {
    pub fn new(bpm: f64, beats_per_bar: u32) -> Self {
        Self {
            bpm,
            effective_bpm: None,
            beats_per_bar,
        }
    }

    /// Builder: set the felt tempo
    pub fn with_effective_bpm(mut self, effective_bpm: f64) -> Self {
        self.effective_bpm = Some(effective_bpm);
        self
    }

    /// Ratio of felt to nominal tempo (1 when no override is set).
    ///
    /// The nominal tempo is clamped to [`MIN_BPM`] first, as the clock does.
    pub fn correction_factor(&self) -> f64 {
        match self.effective_bpm {
            Some(effective) if effective > 0.0 => effective / self.bpm.max(MIN_BPM),
            _ => 1.0,
        }
    }
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self::new(120.0, 4)
    }
}

/// Events produced by a single pulse, in delivery order
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PulseOutcome {
    pub bar: Option<BarEvent>,
    pub beat: Option<BeatEvent>,
}

impl PulseOutcome {
    /// The bar event (if any) followed by the beat event (if any)
    pub fn events(&self) -> impl Iterator<Item = Event> {
        self.bar
            .map(Event::Bar)
            .into_iter()
            .chain(self.beat.map(Event::Beat))
    }

    pub fn is_empty(&self) -> bool {
        self.bar.is_none() && self.beat.is_none()
    }
}

/// Beat/bar derivation from clock pulses
#[derive(Debug, Clone)]
pub struct TempoClock {
    tempo: f64,
    correction: f64,
    beats_per_bar: u32,
    beat_length: f64,
    bar_length: f64,
    pulse_count: u64,
    beat_count: u64,
    bar_count: u64,
}

impl TempoClock {
    /// Create a tempo clock from settings
    pub fn new(settings: TempoSettings) -> Self {
        let mut clock = Self {
            tempo: 0.0,
            correction: 1.0,
            beats_per_bar: 1,
            beat_length: 0.0,
            bar_length: 0.0,
            pulse_count: 0,
            beat_count: 0,
            bar_count: 0,
        };
        clock.initialize(settings);
        clock
    }

    /// Apply settings and reset all counters.
    ///
    /// Published lengths use the nominal tempo; only the pulse boundary uses
    /// the correction factor.
    pub fn initialize(&mut self, settings: TempoSettings) {
        self.tempo = settings.bpm.max(MIN_BPM);
        self.correction = settings.correction_factor();
        self.beats_per_bar = settings.beats_per_bar.max(1);
        self.beat_length = 60.0 / self.tempo;
        self.bar_length = self.beat_length * self.beats_per_bar as f64;
        self.reset();
    }

    /// Reset pulse, beat and bar counters
    pub fn reset(&mut self) {
        self.pulse_count = 0;
        self.beat_count = 0;
        self.bar_count = 0;
    }

    /// Nominal tempo in BPM
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Felt-to-nominal tempo ratio
    pub fn correction_factor(&self) -> f64 {
        self.correction
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    /// Beat length in seconds
    pub fn beat_length(&self) -> f64 {
        self.beat_length
    }

    /// Bar length in seconds
    pub fn bar_length(&self) -> f64 {
        self.bar_length
    }

    pub fn pulse_count(&self) -> u64 {
        self.pulse_count
    }

    /// Total beats declared since the last reset
    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    /// Total bars declared since the last reset
    pub fn bar_count(&self) -> u64 {
        self.bar_count
    }

    /// Pulses between beat boundaries, `round(24 / correction)`
    pub fn pulses_per_beat(&self) -> u64 {
        (PPQN as f64 / self.correction).round().max(1.0) as u64
    }

    /// Count one pulse and return any boundaries it completes.
    ///
    /// The bar event is produced before the beat that closes the bar, and
    /// the bar counter moves before the beat counter does.
    pub fn pulse(&mut self, timestamp_us: u64) -> PulseOutcome {
        self.pulse_count += 1;
        if self.pulse_count % self.pulses_per_beat() != 0 {
            return PulseOutcome::default();
        }

        let beat_in_bar = (self.beat_count % self.beats_per_bar as u64) as u32 + 1;

        let bar = if beat_in_bar == self.beats_per_bar {
            self.bar_count += 1;
            Some(BarEvent {
                bar: self.bar_count,
                bar_length: self.bar_length,
                tempo: self.tempo,
                timestamp_us,
            })
        } else {
            None
        };

        self.beat_count += 1;
        let beat = Some(BeatEvent {
            beat: beat_in_bar,
            beat_length: self.beat_length,
            tempo: self.tempo,
            timestamp_us,
        });

        PulseOutcome { bar, beat }
    }
}

impl Default for TempoClock {
    fn default() -> Self {
        Self::new(TempoSettings::default())
    }
}
