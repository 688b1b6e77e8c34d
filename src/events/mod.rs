// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Typed semantic events and the bus that delivers them.
//!
//! Every event published by the clock engine is one variant of [`Event`];
//! subscribers register per [`EventKind`] and get a [`ListenerId`] back that
//! can be used to unregister them again.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::midi::MidiMessage;

/// A beat boundary derived from clock pulses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Beat within the current bar (1..=beats_per_bar)
    pub beat: u32,
    /// Length of one beat in seconds at the nominal tempo
    pub beat_length: f64,
    /// Nominal tempo in BPM
    pub tempo: f64,
    /// Timestamp of the pulse that produced the beat (microseconds)
    pub timestamp_us: u64,
}

/// A bar boundary derived from clock pulses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarEvent {
    /// Running bar number, starting at 1
    pub bar: u64,
    /// Length of one bar in seconds at the nominal tempo
    pub bar_length: f64,
    /// Nominal tempo in BPM
    pub tempo: f64,
    /// Timestamp of the pulse that produced the bar (microseconds)
    pub timestamp_us: u64,
}

/// Semantic events produced for external consumers.
///
/// Channels carried by events are 1-based (1-16).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Beat(BeatEvent),
    Bar(BarEvent),
    /// Transport start
    Start,
    /// Transport stop
    Stop,
    /// Raw device message, passed through for diagnostics
    Message(MidiMessage),
    ProgramChange { channel: u8, value: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    SceneChange { channel: u8, value: u8 },
    SceneParam { channel: u8, value: u8 },
    /// A device was bound
    Device { name: String },
}

impl Event {
    /// The kind used to route this event to subscribers
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Beat(_) => EventKind::Beat,
            Event::Bar(_) => EventKind::Bar,
            Event::Start => EventKind::Start,
            Event::Stop => EventKind::Stop,
            Event::Message(_) => EventKind::Message,
            Event::ProgramChange { .. } => EventKind::ProgramChange,
            Event::ControlChange { .. } => EventKind::ControlChange,
            Event::SceneChange { .. } => EventKind::SceneChange,
            Event::SceneParam { .. } => EventKind::SceneParam,
            Event::Device { .. } => EventKind::Device,
        }
    }
}

/// Event names subscribers register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Beat,
    Bar,
    Start,
    Stop,
    Message,
    ProgramChange,
    ControlChange,
    SceneChange,
    SceneParam,
    Device,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::Beat,
        EventKind::Bar,
        EventKind::Start,
        EventKind::Stop,
        EventKind::Message,
        EventKind::ProgramChange,
        EventKind::ControlChange,
        EventKind::SceneChange,
        EventKind::SceneParam,
        EventKind::Device,
    ];

    /// Public event name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Beat => "beat",
            EventKind::Bar => "bar",
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Message => "message",
            EventKind::ProgramChange => "programChange",
            EventKind::ControlChange => "controlChange",
            EventKind::SceneChange => "sceneChange",
            EventKind::SceneParam => "sceneParam",
            EventKind::Device => "device",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event name: {}", s))
    }
}

/// Identity of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Boxed event listener
pub type Listener = Box<dyn FnMut(&Event) + Send + 'static>;

/// Publish/subscribe dispatch keyed by event kind
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Unregister listeners.
    ///
    /// With `Some(id)` only that listener is removed; with `None` every
    /// listener of `kind` is removed. Returns the number removed.
    pub fn off(&mut self, kind: EventKind, listener: Option<ListenerId>) -> usize {
        let Some(listeners) = self.listeners.get_mut(&kind) else {
            return 0;
        };
        match listener {
            Some(id) => {
                let before = listeners.len();
                listeners.retain(|(existing, _)| *existing != id);
                before - listeners.len()
            }
            None => {
                let removed = listeners.len();
                listeners.clear();
                removed
            }
        }
    }

    /// Deliver an event to every listener of its kind, in registration order
    pub fn emit(&mut self, event: &Event) {
        if let Some(listeners) = self.listeners.get_mut(&event.kind()) {
            for (_, listener) in listeners.iter_mut() {
                listener(event);
            }
        }
    }

    /// Number of listeners registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Drop every listener
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .listeners
            .iter()
            .map(|(kind, l)| (kind.as_str(), l.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_event_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("tick".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        bus.on(EventKind::Start, move |e| s.lock().unwrap().push(e.clone()));

        bus.emit(&Event::Stop);
        bus.emit(&Event::Start);

        assert_eq!(*seen.lock().unwrap(), vec![Event::Start]);
    }

    #[test]
    fn test_off_with_listener_removes_only_that_listener() {
        let mut bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        let c1 = Arc::clone(&count);
        let first = bus.on(EventKind::Stop, move |_| *c1.lock().unwrap() += 1);
        let c2 = Arc::clone(&count);
        bus.on(EventKind::Stop, move |_| *c2.lock().unwrap() += 10);

        assert_eq!(bus.off(EventKind::Stop, Some(first)), 1);
        bus.emit(&Event::Stop);

        assert_eq!(*count.lock().unwrap(), 10);
        assert_eq!(bus.listener_count(EventKind::Stop), 1);
    }

    #[test]
    fn test_off_without_listener_clears_kind() {
        let mut bus = EventBus::new();
        bus.on(EventKind::Beat, |_| {});
        bus.on(EventKind::Beat, |_| {});
        bus.on(EventKind::Bar, |_| {});

        assert_eq!(bus.off(EventKind::Beat, None), 2);
        assert_eq!(bus.listener_count(EventKind::Beat), 0);
        assert_eq!(bus.listener_count(EventKind::Bar), 1);
        assert_eq!(bus.off(EventKind::Device, None), 0);
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let mut bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let o = Arc::clone(&order);
            bus.on(EventKind::Device, move |_| o.lock().unwrap().push(i));
        }

        bus.emit(&Event::Device {
            name: "Tracker".to_string(),
        });

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
