// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing module.
//!
//! Beat and bar derivation from MIDI clock pulses, plus cancellable timed
//! tasks for scene animations.

pub mod clock;
pub mod tasks;

pub use clock::{PulseOutcome, TempoClock, TempoSettings, MIN_BPM, PPQN};
pub use tasks::{TaskId, TaskSet};
