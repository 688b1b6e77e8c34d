// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Clock engine and stage host.
//!
//! The [`ClockEngine`] turns normalized clock-source traffic into semantic
//! events: pulses go through the tempo clock, channel messages through the
//! control router, and everything is published on the event bus. The
//! [`Stage`] wires the engine to the scene registry, the compositor and the
//! audio analyser.

pub mod stage;

pub use stage::Stage;

use crate::control::{ControlMapping, ControlRouter};
use crate::events::{Event, EventBus, EventKind, ListenerId};
use crate::midi::SourceEvent;
use crate::timing::{TempoClock, TempoSettings};

/// Tempo clock, control router and event bus
#[derive(Debug, Default)]
pub struct ClockEngine {
    clock: TempoClock,
    router: ControlRouter,
    bus: EventBus,
}

impl ClockEngine {
    pub fn new(settings: TempoSettings, mapping: ControlMapping) -> Self {
        Self {
            clock: TempoClock::new(settings),
            router: ControlRouter::new(mapping),
            bus: EventBus::new(),
        }
    }

    /// Re-initialize tempo and mapping. Counters restart from zero;
    /// listeners are kept.
    pub fn initialize(&mut self, settings: TempoSettings, mapping: ControlMapping) {
        self.clock.initialize(settings);
        self.router.set_mapping(mapping);
    }

    /// Turn one source event into semantic events and publish them.
    ///
    /// Returns the published events in delivery order.
    pub fn process(&mut self, event: SourceEvent) -> Vec<Event> {
        let events: Vec<Event> = match event {
            SourceEvent::Pulse { timestamp_us } => self.clock.pulse(timestamp_us).events().collect(),
            SourceEvent::Start => vec![Event::Start],
            SourceEvent::Stop => vec![Event::Stop],
            SourceEvent::Message(message) => self.router.route(&message),
            SourceEvent::Device { name } => vec![Event::Device { name }],
        };
        for event in &events {
            self.bus.emit(event);
        }
        events
    }

    /// Subscribe to one event kind
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.bus.on(kind, listener)
    }

    /// Unsubscribe one listener, or all listeners of `kind` with `None`.
    ///
    /// Only bus listeners are affected. The scene registry is fed directly
    /// by [`Stage::dispatch`] and stops reacting to `sceneChange`,
    /// `sceneParam`, `beat` and `bar` only when it is destroyed.
    pub fn off(&mut self, kind: EventKind, listener: Option<ListenerId>) -> usize {
        self.bus.off(kind, listener)
    }

    /// Drop every listener
    pub fn clear_listeners(&mut self) {
        self.bus.clear();
    }

    pub fn clock(&self) -> &TempoClock {
        &self.clock
    }

    pub fn router(&self) -> &ControlRouter {
        &self.router
    }

    /// Nominal tempo in BPM
    pub fn tempo(&self) -> f64 {
        self.clock.tempo()
    }

    /// Beat length in seconds
    pub fn beat_length(&self) -> f64 {
        self.clock.beat_length()
    }

    /// Bar length in seconds
    pub fn bar_length(&self) -> f64 {
        self.clock.bar_length()
    }
}
