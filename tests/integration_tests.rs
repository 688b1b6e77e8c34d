// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Integration tests for BEATSTAGE
//!
//! These tests drive the public API end to end with an in-memory MIDI
//! backend and a recording pipeline, so no hardware is needed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use beatstage::audio::{Analyser, AnalyserChannel, AnalyserSettings};
use beatstage::config::StageConfig;
use beatstage::control::{ControlMapping, MidiChannel};
use beatstage::engine::{ClockEngine, Stage};
use beatstage::events::{Event, EventKind};
use beatstage::midi::{InputConnection, MessageSink, MidiBackend, MidiError, SourceEvent};
use beatstage::render::{PassRef, Pipeline, MAIN_TARGET};
use beatstage::scene::{
    BoxFuture, RegistryState, Scene, SceneDescriptor, SceneError, SceneId, SceneInstance,
    SceneRegistry,
};
use beatstage::timing::TempoSettings;

// ============================================================================
// Test doubles
// ============================================================================

type Sinks = Arc<Mutex<HashMap<String, MessageSink>>>;

/// MIDI backend whose devices are plain names
#[derive(Clone, Default)]
struct LoopbackBackend {
    devices: Arc<Mutex<Vec<String>>>,
    sinks: Sinks,
}

impl LoopbackBackend {
    fn with_device(name: &str) -> Self {
        let backend = Self::default();
        backend.devices.lock().unwrap().push(name.to_string());
        backend
    }

    fn send(&self, device: &str, timestamp_us: u64, bytes: &[u8]) {
        if let Some(sink) = self.sinks.lock().unwrap().get_mut(device) {
            sink(timestamp_us, bytes);
        }
    }
}

struct LoopbackConnection {
    device: String,
    sinks: Sinks,
}

impl InputConnection for LoopbackConnection {
    fn device(&self) -> &str {
        &self.device
    }

    fn close(self: Box<Self>) {
        self.sinks.lock().unwrap().remove(&self.device);
    }
}

impl MidiBackend for LoopbackBackend {
    fn input_names(&self) -> Vec<String> {
        self.devices.lock().unwrap().clone()
    }

    fn connect(&self, device: &str, sink: MessageSink) -> Result<Box<dyn InputConnection>, MidiError> {
        if !self.devices.lock().unwrap().iter().any(|d| d == device) {
            return Err(MidiError::DeviceNotFound(device.to_string()));
        }
        self.sinks.lock().unwrap().insert(device.to_string(), sink);
        Ok(Box::new(LoopbackConnection {
            device: device.to_string(),
            sinks: Arc::clone(&self.sinks),
        }))
    }
}

/// Pipeline that keeps the stage labels of every frame
#[derive(Clone, Default)]
struct FrameRecorder {
    frames: Arc<Mutex<Vec<Vec<String>>>>,
    pending: Vec<String>,
}

impl Pipeline for FrameRecorder {
    fn clear_passes(&mut self) {
        self.pending.clear();
    }

    fn add_pass(&mut self, pass: PassRef) {
        self.pending.push(pass.label().to_string());
    }

    fn render(&mut self) {
        self.frames.lock().unwrap().push(self.pending.clone());
    }

    fn set_size(&mut self, _width: u32, _height: u32) {}
}

type Calls = Arc<Mutex<Vec<String>>>;

/// Scene that records its lifecycle calls as "label:call"
struct Recording {
    label: &'static str,
    calls: Calls,
}

impl Recording {
    fn factory(label: &'static str, calls: &Calls) -> impl Fn() -> Box<dyn Scene> + Send + Sync {
        let calls = Arc::clone(calls);
        move || {
            Box::new(Recording {
                label,
                calls: Arc::clone(&calls),
            }) as Box<dyn Scene>
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(format!("{}:{}", self.label, call));
    }
}

impl Scene for Recording {
    fn name(&self) -> &str {
        "Recording"
    }

    fn play(&mut self) {
        self.record("play".to_string());
    }

    fn stop(&mut self) {
        self.record("stop".to_string());
    }

    fn destroy(&mut self) {
        self.record("destroy".to_string());
    }

    fn on_parameter_change(&mut self, value: f64, retriggered: bool) {
        self.record(format!("param({},{})", value, retriggered));
    }
}

/// Scene whose setup always fails
struct Broken;

impl Scene for Broken {
    fn name(&self) -> &str {
        "Broken"
    }

    fn setup(&mut self) -> BoxFuture<'_, Result<(), SceneError>> {
        Box::pin(async {
            Err(SceneError::Setup {
                scene: "Broken".to_string(),
                reason: "texture missing".to_string(),
            })
        })
    }
}

fn count(calls: &Calls, entry: &str) -> usize {
    calls.lock().unwrap().iter().filter(|c| *c == entry).count()
}

fn labels(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            Event::Beat(b) => format!("beat{}", b.beat),
            Event::Bar(b) => format!("bar{}", b.bar),
            other => other.kind().to_string(),
        })
        .collect()
}

fn pulses(engine: &mut ClockEngine, n: u64) -> Vec<Event> {
    (0..n)
        .flat_map(|ts| engine.process(SourceEvent::Pulse { timestamp_us: ts }))
        .collect()
}

// ============================================================================
// Clock
// ============================================================================

#[test]
fn test_one_bar_at_120_bpm() {
    let mut engine = ClockEngine::new(TempoSettings::new(120.0, 4), ControlMapping::default());
    assert_eq!(engine.beat_length(), 0.5);
    assert_eq!(engine.bar_length(), 2.0);

    let events = pulses(&mut engine, 96);
    assert_eq!(labels(&events), vec!["beat1", "beat2", "beat3", "bar1", "beat4"]);
}

#[test]
fn test_bar_numbers_follow_bar_boundaries() {
    let mut engine = ClockEngine::new(TempoSettings::new(100.0, 4), ControlMapping::default());
    let bars: Vec<u64> = pulses(&mut engine, 24 * 4 * 3 + 24)
        .into_iter()
        .filter_map(|e| match e {
            Event::Bar(b) => Some(b.bar),
            _ => None,
        })
        .collect();
    assert_eq!(bars, vec![1, 2, 3]);
}

#[test]
fn test_doubled_device_clock_beats_every_12_pulses() {
    let settings = TempoSettings::new(120.0, 4).with_effective_bpm(240.0);
    let mut engine = ClockEngine::new(settings, ControlMapping::default());

    assert!(pulses(&mut engine, 11).is_empty());
    let events = pulses(&mut engine, 1);
    assert_eq!(labels(&events), vec!["beat1"]);
}

#[test]
fn test_bus_subscribers_receive_events_by_name() {
    let mut engine = ClockEngine::default();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for name in ["beat", "bar", "sceneChange"] {
        let kind: EventKind = name.parse().unwrap();
        let s = Arc::clone(&seen);
        engine.on(kind, move |e| s.lock().unwrap().push(e.kind().to_string()));
    }
    pulses(&mut engine, 96);
    engine.process(SourceEvent::Message(beatstage::midi::MidiMessage::ControlChange {
        channel: 15,
        controller: 20,
        value: 3,
    }));

    // Clearing a kind stops its delivery
    assert_eq!(engine.off(EventKind::Beat, None), 1);
    pulses(&mut engine, 24);

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["beat", "beat", "beat", "bar", "beat", "sceneChange"]
    );
}

// ============================================================================
// Scene registry
// ============================================================================

async fn two_groups(calls: &Calls) -> SceneRegistry {
    let mut registry = SceneRegistry::new(MidiChannel::Number(16));
    registry
        .setup(vec![
            SceneDescriptor::new(1)
                .with(Recording::factory("a1", calls))
                .with(Recording::factory("a2", calls)),
            SceneDescriptor::new(2).with(Recording::factory("b1", calls)),
        ])
        .await
        .unwrap();
    registry
}

#[tokio::test]
async fn test_switching_groups_stops_only_the_previous_group() {
    let calls = Calls::default();
    let mut registry = two_groups(&calls).await;
    let one = SceneId::from(1);
    let two = SceneId::from(2);

    registry.play(&one);
    registry.play(&two);
    registry.play(&one);

    assert_eq!(count(&calls, "a1:stop"), 1);
    assert_eq!(count(&calls, "a2:stop"), 1);
    assert_eq!(count(&calls, "b1:stop"), 1);
    assert_eq!(count(&calls, "a1:play"), 2);
    assert_eq!(registry.state(), RegistryState::Active(one));

    // The group becoming active is never stopped on the way in
    let order = calls.lock().unwrap().clone();
    let last_a1_play = order.iter().rposition(|c| c == "a1:play").unwrap();
    let last_a1_stop = order.iter().rposition(|c| c == "a1:stop").unwrap();
    assert!(last_a1_stop < last_a1_play);
}

#[tokio::test]
async fn test_playing_the_active_group_again_is_a_no_op() {
    let calls = Calls::default();
    let mut registry = two_groups(&calls).await;

    registry.play(&SceneId::from(2));
    registry.play(&SceneId::from(2));

    assert_eq!(count(&calls, "b1:play"), 1);
    assert_eq!(count(&calls, "b1:stop"), 0);
}

#[tokio::test]
async fn test_unknown_group_leaves_active_group_alone() {
    let calls = Calls::default();
    let mut registry = two_groups(&calls).await;

    registry.play(&SceneId::from(1));
    registry.play(&SceneId::from("nonexistent"));
    registry.stop(Some(&SceneId::from(9)));

    assert_eq!(count(&calls, "a1:play"), 1);
    assert_eq!(count(&calls, "a1:stop"), 0);
    assert_eq!(registry.state(), RegistryState::Active(SceneId::from(1)));
}

#[tokio::test]
async fn test_failed_setup_leaves_nothing_registered() {
    let calls = Calls::default();
    let mut registry = SceneRegistry::default();

    let result = registry
        .setup(vec![
            SceneDescriptor::new(1).with(Recording::factory("a1", &calls)),
            SceneDescriptor::new(2).with(|| Box::new(Broken) as Box<dyn Scene>),
        ])
        .await;

    assert!(matches!(result, Err(SceneError::Setup { .. })));
    assert_eq!(registry.state(), RegistryState::Empty);
    assert!(!registry.is_subscribed());
    assert_eq!(count(&calls, "a1:destroy"), 1);
}

#[test]
fn test_repeated_parameter_value_is_a_retrigger() {
    let calls = Calls::default();
    let factory = Recording::factory("p", &calls);
    let mut instance = SceneInstance::new(factory());

    assert!(!instance.set_parameter(3.0));
    assert!(instance.set_parameter(3.0));
    assert!(!instance.set_parameter(4.0));

    assert_eq!(
        *calls.lock().unwrap(),
        vec!["p:param(3,false)", "p:param(3,true)", "p:param(4,false)"]
    );
}

// ============================================================================
// Audio analysis
// ============================================================================

#[test]
fn test_segment_requests_are_clamped_to_half_the_window() {
    let mut analyser = Analyser::new(AnalyserSettings {
        fft_size: 256,
        ..AnalyserSettings::default()
    });
    let tone: Vec<f32> = (0..512).map(|i| (i as f32 * 0.3).sin()).collect();
    analyser.push_samples(&tone, 1);

    let spectrum = analyser.frequency_data(Some(1000), AnalyserChannel::Stereo);
    assert_eq!(spectrum.length, 128);

    let waveform = analyser.waveform_data(Some(1000), AnalyserChannel::Left);
    assert_eq!(waveform.length, 128);

    let buckets = analyser.frequency_data(Some(8), AnalyserChannel::Right);
    assert_eq!(buckets.data.len(), 8);
    assert!(buckets.data.iter().all(|v| (0.0..=255.0).contains(v)));
}

// ============================================================================
// Stage
// ============================================================================

fn stage_config() -> StageConfig {
    StageConfig::from_yaml(
        r#"
midi:
  device: Loopback
  bpm: 120
  beats_per_bar: 4
  channel: 16
render:
  width: 800
  height: 600
  fps: 50
scenes:
  - id: 1
    scenes: [pulse]
  - id: 2
    scenes: [feedback]
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_stage_routes_clock_and_control_to_scenes() {
    let backend = LoopbackBackend::with_device("Loopback");
    let pipeline = FrameRecorder::default();
    let frames = Arc::clone(&pipeline.frames);

    let mut stage = Stage::new(stage_config(), Arc::new(backend.clone()), Box::new(pipeline));
    stage.setup().await.unwrap();
    stage.start();

    // Select group 2 on channel 16, then set its parameter
    backend.send("Loopback", 0, &[0xBF, 20, 2]);
    backend.send("Loopback", 0, &[0xBF, 21, 64]);
    // A scene change on another channel is ignored
    backend.send("Loopback", 0, &[0xB0, 20, 1]);
    stage.pump();
    assert_eq!(stage.registry().state(), RegistryState::Active(SceneId::from(2)));

    for ts in 0..96 {
        backend.send("Loopback", ts, &[0xF8]);
    }
    stage.pump();
    assert_eq!(stage.engine().clock().bar_count(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    let last = frames.lock().unwrap().last().cloned().unwrap_or_default();
    assert_eq!(last.last().map(String::as_str), Some("main:render"));
    assert_eq!(stage.targets().names().last().map(String::as_str), Some(MAIN_TARGET));

    stage.teardown();
    assert!(stage.targets().is_empty());
    assert!(!stage.compositor().is_running());
}
