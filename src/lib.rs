// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! BEATSTAGE - MIDI clock and audio reactive visual stage
//!
//! An external MIDI clock drives beat and bar events, control changes on a
//! listening channel select and parameterize scene groups, and a compositor
//! runs every registered render target once per animation frame.

pub mod audio;
pub mod config;
pub mod control;
pub mod engine;
pub mod events;
pub mod midi;
pub mod render;
pub mod scene;
pub mod scenes;
pub mod timing;

pub use config::StageConfig;
pub use engine::{ClockEngine, Stage};
pub use events::{Event, EventKind};
