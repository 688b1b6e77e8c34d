// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI input layer.
//!
//! This module provides a trait-based abstraction over MIDI input devices so
//! the clock source can bind to hardware through `midir` or to an in-memory
//! backend in tests.

pub mod input;
pub mod source;

use thiserror::Error;

pub use input::{list_sources, print_sources, MidiMessage, MidirBackend};
pub use source::{ClockSource, SourceEvent, RETRY_INTERVAL};

/// Callback receiving `(timestamp_us, raw_bytes)` for every incoming message.
pub type MessageSink = Box<dyn FnMut(u64, &[u8]) + Send + 'static>;

/// Errors raised by MIDI backends.
#[derive(Debug, Error)]
pub enum MidiError {
    /// The backend client could not be created
    #[error("failed to initialize MIDI backend: {0}")]
    Init(String),
    /// No input port matches the requested name
    #[error("MIDI device \"{0}\" not found")]
    DeviceNotFound(String),
    /// The port exists but the connection failed
    #[error("failed to connect to MIDI device \"{device}\": {reason}")]
    Connect { device: String, reason: String },
}

/// Trait for MIDI input backends.
///
/// A backend enumerates input devices by name and opens connections that
/// deliver raw bytes to a sink until the connection is closed.
pub trait MidiBackend: Send + Sync {
    /// Names of the currently available input devices.
    fn input_names(&self) -> Vec<String>;

    /// Open a connection to the named device.
    ///
    /// # Arguments
    /// * `device` - Device name (exact match preferred, substring accepted)
    /// * `sink` - Receives every message as `(timestamp_us, bytes)`
    fn connect(&self, device: &str, sink: MessageSink)
        -> Result<Box<dyn InputConnection>, MidiError>;
}

/// An open input connection. Dropping or closing it stops message delivery.
pub trait InputConnection: Send {
    /// Name of the device this connection is bound to.
    fn device(&self) -> &str;

    /// Close the connection and release the port.
    fn close(self: Box<Self>);
}

/// Resolve a requested device against the available names.
///
/// Exact matches win; otherwise the first case-insensitive substring match is
/// returned.
pub fn resolve_device<'a>(names: &'a [String], requested: &str) -> Option<(usize, &'a str)> {
    if let Some(index) = names.iter().position(|n| n == requested) {
        return Some((index, names[index].as_str()));
    }
    let needle = requested.to_lowercase();
    names
        .iter()
        .position(|n| n.to_lowercase().contains(&needle))
        .map(|index| (index, names[index].as_str()))
}

/// MIDI message constants
pub mod messages {
    // Channel Voice Messages (upper nibble, lower nibble is channel 0-15)
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_AFTERTOUCH: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_AFTERTOUCH: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;

    // System Real-Time Messages
    pub const TIMING_CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
}
