// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Control routing for MIDI controller input.
//!
//! The router classifies inbound channel messages against a
//! [`ControlMapping`] and produces the semantic events scenes react to. It is
//! channel-agnostic: the channel check belongs to the consumers.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::events::Event;
use crate::midi::MidiMessage;

/// Default CC number selecting a scene group
pub const DEFAULT_SCENE_CHANGE_CC: u8 = 20;
/// Default CC number carrying the scene parameter
pub const DEFAULT_SCENE_PARAM_CC: u8 = 21;
/// Default listening channel (1-based)
pub const DEFAULT_CHANNEL: u8 = 16;

/// A MIDI channel filter: a single channel (1-16) or every channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiChannel {
    All,
    Number(u8),
}

impl MidiChannel {
    /// Whether a 1-based channel passes this filter
    pub fn matches(&self, channel: u8) -> bool {
        match self {
            MidiChannel::All => true,
            MidiChannel::Number(n) => *n == channel,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            MidiChannel::All => true,
            MidiChannel::Number(n) => (1..=16).contains(n),
        }
    }
}

impl Default for MidiChannel {
    fn default() -> Self {
        MidiChannel::Number(DEFAULT_CHANNEL)
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiChannel::All => f.write_str("all"),
            MidiChannel::Number(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for MidiChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MidiChannel::All => serializer.serialize_str("all"),
            MidiChannel::Number(n) => serializer.serialize_u8(*n),
        }
    }
}

impl<'de> Deserialize<'de> for MidiChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChannelVisitor;

        impl<'de> Visitor<'de> for ChannelVisitor {
            type Value = MidiChannel;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a MIDI channel 1-16 or \"all\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MidiChannel, E> {
                u8::try_from(v)
                    .ok()
                    .filter(|n| (1..=16).contains(n))
                    .map(MidiChannel::Number)
                    .ok_or_else(|| E::custom(format!("MIDI channel out of range: {}", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MidiChannel, E> {
                let v = u64::try_from(v)
                    .map_err(|_| E::custom(format!("MIDI channel out of range: {}", v)))?;
                self.visit_u64(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MidiChannel, E> {
                if v.eq_ignore_ascii_case("all") {
                    return Ok(MidiChannel::All);
                }
                let n: u64 = v
                    .parse()
                    .map_err(|_| E::custom(format!("invalid MIDI channel: {}", v)))?;
                self.visit_u64(n)
            }
        }

        deserializer.deserialize_any(ChannelVisitor)
    }
}

/// Which controllers drive scene selection and the scene parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMapping {
    pub scene_change_cc: u8,
    pub scene_param_cc: u8,
    pub channel: MidiChannel,
}

impl Default for ControlMapping {
    fn default() -> Self {
        Self {
            scene_change_cc: DEFAULT_SCENE_CHANGE_CC,
            scene_param_cc: DEFAULT_SCENE_PARAM_CC,
            channel: MidiChannel::default(),
        }
    }
}

/// Classifies channel messages into semantic events
#[derive(Debug, Clone, Default)]
pub struct ControlRouter {
    mapping: ControlMapping,
}

impl ControlRouter {
    pub fn new(mapping: ControlMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &ControlMapping {
        &self.mapping
    }

    pub fn set_mapping(&mut self, mapping: ControlMapping) {
        self.mapping = mapping;
    }

    /// Route one message.
    ///
    /// The raw message always comes first. Program changes add a
    /// `ProgramChange`; control changes add a `ControlChange` followed by a
    /// `SceneChange` or `SceneParam` when the controller is mapped. Event
    /// channels are 1-based.
    pub fn route(&self, message: &MidiMessage) -> Vec<Event> {
        let mut events = vec![Event::Message(message.clone())];

        match *message {
            MidiMessage::ProgramChange { channel, program } => {
                events.push(Event::ProgramChange {
                    channel: channel + 1,
                    value: program,
                });
            }
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => {
                let channel = channel + 1;
                events.push(Event::ControlChange {
                    channel,
                    controller,
                    value,
                });
                if controller == self.mapping.scene_change_cc {
                    events.push(Event::SceneChange { channel, value });
                } else if controller == self.mapping.scene_param_cc {
                    events.push(Event::SceneParam { channel, value });
                }
            }
            _ => {}
        }

        events
    }
}
