// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI input parsing and the `midir` device backend.

use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::debug;

use super::{messages, resolve_device, InputConnection, MessageSink, MidiBackend, MidiError};

const CLIENT_NAME: &str = "beatstage";

/// Parsed MIDI message types
#[derive(Debug, Clone, PartialEq)]
pub enum MidiMessage {
    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Control Change: channel (0-15), controller (0-127), value (0-127)
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },
    /// Pitch Bend: channel (0-15), value (-8192 to 8191)
    PitchBend { channel: u8, value: i16 },
    /// Channel Aftertouch: channel (0-15), pressure (0-127)
    ChannelAftertouch { channel: u8, pressure: u8 },
    /// Poly Aftertouch: channel (0-15), note (0-127), pressure (0-127)
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    /// MIDI Clock tick
    TimingClock,
    /// Start playback
    Start,
    /// Continue playback
    Continue,
    /// Stop playback
    Stop,
    /// Unknown/unparsed message
    Unknown(Vec<u8>),
}

impl MidiMessage {
    /// Parse raw MIDI bytes into a MidiMessage
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;

        // System Real-Time messages (single byte)
        match status {
            messages::TIMING_CLOCK => return Some(MidiMessage::TimingClock),
            messages::START => return Some(MidiMessage::Start),
            messages::CONTINUE => return Some(MidiMessage::Continue),
            messages::STOP => return Some(MidiMessage::Stop),
            _ => {}
        }

        let msg_type = status & 0xF0;
        let channel = status & 0x0F;

        match (msg_type, rest) {
            (messages::NOTE_OFF, [note, velocity, ..]) => Some(MidiMessage::NoteOff {
                channel,
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            }),
            (messages::NOTE_ON, [note, velocity, ..]) => {
                let velocity = velocity & 0x7F;
                // Note On with velocity 0 is equivalent to Note Off
                if velocity == 0 {
                    Some(MidiMessage::NoteOff {
                        channel,
                        note: note & 0x7F,
                        velocity: 0,
                    })
                } else {
                    Some(MidiMessage::NoteOn {
                        channel,
                        note: note & 0x7F,
                        velocity,
                    })
                }
            }
            (messages::CONTROL_CHANGE, [controller, value, ..]) => {
                Some(MidiMessage::ControlChange {
                    channel,
                    controller: controller & 0x7F,
                    value: value & 0x7F,
                })
            }
            (messages::PROGRAM_CHANGE, [program, ..]) => Some(MidiMessage::ProgramChange {
                channel,
                program: program & 0x7F,
            }),
            (messages::PITCH_BEND, [lsb, msb, ..]) => {
                let value = (((*msb as i16 & 0x7F) << 7) | (*lsb as i16 & 0x7F)) - 8192;
                Some(MidiMessage::PitchBend { channel, value })
            }
            (messages::CHANNEL_AFTERTOUCH, [pressure, ..]) => {
                Some(MidiMessage::ChannelAftertouch {
                    channel,
                    pressure: pressure & 0x7F,
                })
            }
            (messages::POLY_AFTERTOUCH, [note, pressure, ..]) => {
                Some(MidiMessage::PolyAftertouch {
                    channel,
                    note: note & 0x7F,
                    pressure: pressure & 0x7F,
                })
            }
            _ => Some(MidiMessage::Unknown(data.to_vec())),
        }
    }

    /// Check if this is a clock-related message
    pub fn is_clock_message(&self) -> bool {
        matches!(
            self,
            MidiMessage::TimingClock
                | MidiMessage::Start
                | MidiMessage::Continue
                | MidiMessage::Stop
        )
    }
}

/// `midir` implementation of [`MidiBackend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MidirBackend;

impl MidirBackend {
    pub fn new() -> Self {
        Self
    }

    fn client() -> Result<MidiInput, MidiError> {
        let mut input = MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        // Clock pulses must come through
        input.ignore(Ignore::SysexAndActiveSense);
        Ok(input)
    }
}

struct MidirConnection {
    device: String,
    connection: MidiInputConnection<()>,
}

impl InputConnection for MidirConnection {
    fn device(&self) -> &str {
        &self.device
    }

    fn close(self: Box<Self>) {
        let _ = self.connection.close();
    }
}

impl MidiBackend for MidirBackend {
    fn input_names(&self) -> Vec<String> {
        list_sources().into_iter().map(|(_, name)| name).collect()
    }

    fn connect(
        &self,
        device: &str,
        mut sink: MessageSink,
    ) -> Result<Box<dyn InputConnection>, MidiError> {
        let input = Self::client()?;
        let ports = input.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| input.port_name(p).unwrap_or_default())
            .collect();

        let (index, name) = resolve_device(&names, device)
            .map(|(i, n)| (i, n.to_string()))
            .ok_or_else(|| MidiError::DeviceNotFound(device.to_string()))?;
        debug!("Connecting MIDI input port {} ({})", index, name);

        let connection = input
            .connect(
                &ports[index],
                "beatstage-input",
                move |timestamp_us, bytes, _| sink(timestamp_us, bytes),
                (),
            )
            .map_err(|e| MidiError::Connect {
                device: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(MidirConnection {
            device: name,
            connection,
        }))
    }
}

/// List all available MIDI sources
pub fn list_sources() -> Vec<(usize, String)> {
    let input = match MidirBackend::client() {
        Ok(input) => input,
        Err(e) => {
            debug!("{}", e);
            return Vec::new();
        }
    };

    input
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            let name = input
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i));
            (i, name)
        })
        .collect()
}

/// Print all available MIDI sources to stdout
pub fn print_sources() {
    let sources = list_sources();
    if sources.is_empty() {
        println!("No MIDI sources found.");
    } else {
        println!("Available MIDI sources (inputs):");
        for (i, name) in sources {
            println!("  {}: {}", i, name);
        }
    }
}
