// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The running stage: clock source, engine, scenes, compositor and audio.
//!
//! Source events are drained from the clock source channel and dispatched
//! through the engine; every resulting event is offered to the scene
//! registry, which reacts only while it is subscribed.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::ClockEngine;
use crate::audio::{Analyser, AudioInput, SharedAnalyser};
use crate::config::{ConfigEvent, ConfigWatcher, StageConfig};
use crate::events::Event;
use crate::midi::{ClockSource, MidiBackend, SourceEvent};
use crate::render::{Compositor, Pipeline, RenderTargets};
use crate::scene::{SceneDescriptor, SceneError, SceneRegistry};
use crate::scenes;

/// How often the run loop checks for configuration reloads
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_millis(250);

enum Step {
    Source(SourceEvent),
    Poll,
    Shutdown,
}

pub struct Stage {
    config: StageConfig,
    engine: ClockEngine,
    source: ClockSource,
    events: UnboundedReceiver<SourceEvent>,
    registry: SceneRegistry,
    compositor: Compositor,
    analyser: SharedAnalyser,
    audio: Option<AudioInput>,
}

impl Stage {
    pub fn new(config: StageConfig, backend: Arc<dyn MidiBackend>, pipeline: Box<dyn Pipeline>) -> Self {
        let (source, events) = ClockSource::new(backend);
        let engine = ClockEngine::new(config.midi.tempo(), config.midi.mapping());
        let registry = SceneRegistry::new(config.midi.channel);
        let compositor = Compositor::new(
            pipeline,
            config.render.width,
            config.render.height,
            config.render.show_stats,
        );
        let analyser = Arc::new(Mutex::new(Analyser::new(config.audio.analyser())));

        Self {
            config,
            engine,
            source,
            events,
            registry,
            compositor,
            analyser,
            audio: None,
        }
    }

    /// Register the configured scene groups
    pub async fn setup(&mut self) -> Result<(), SceneError> {
        let descriptors = scenes::descriptors(&self.config.scenes, self.compositor.targets())?;
        self.setup_with(descriptors).await
    }

    /// Register scene groups built by the host
    pub async fn setup_with(&mut self, descriptors: Vec<SceneDescriptor>) -> Result<(), SceneError> {
        self.registry.setup(descriptors).await
    }

    /// Start compositing and bind the configured MIDI device
    pub fn start(&mut self) {
        self.compositor.start(self.config.render.fps);
        match self.config.midi.device.clone() {
            Some(device) => self.source.configure(&device),
            None => warn!("No MIDI device configured, clock events will not arrive"),
        }
    }

    /// Open the audio input. Failure leaves analysis silent.
    pub fn start_audio(&mut self) {
        self.audio = None;
        match AudioInput::open(self.config.audio.device.as_deref(), Arc::clone(&self.analyser)) {
            Ok(input) => self.audio = Some(input),
            Err(e) => warn!("Audio input unavailable: {}", e),
        }
    }

    /// Run one source event through the engine and the scene registry.
    ///
    /// The registry is not a bus listener: removing bus listeners with
    /// [`ClockEngine::off`] leaves scene control attached.
    pub fn dispatch(&mut self, event: SourceEvent) -> Vec<Event> {
        let events = self.engine.process(event);
        for event in &events {
            self.registry.handle_event(event);
        }
        events
    }

    /// Dispatch every source event already queued. Returns how many.
    pub fn pump(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// Dispatch source events until `shutdown` completes.
    ///
    /// With a watcher, reloaded configurations are applied between events.
    pub async fn run_until<F>(&mut self, shutdown: F, watcher: Option<&ConfigWatcher>)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut reload_check = tokio::time::interval(CONFIG_POLL_INTERVAL);

        loop {
            let step = tokio::select! {
                _ = &mut shutdown => Step::Shutdown,
                event = self.events.recv() => match event {
                    Some(event) => Step::Source(event),
                    None => Step::Shutdown,
                },
                _ = reload_check.tick() => Step::Poll,
            };

            match step {
                Step::Source(event) => {
                    self.dispatch(event);
                }
                Step::Poll => {
                    if let Some(watcher) = watcher {
                        for event in watcher.recv_all() {
                            self.handle_config_event(event);
                        }
                    }
                }
                Step::Shutdown => break,
            }
        }
    }

    /// React to one configuration watcher event
    pub fn handle_config_event(&mut self, event: ConfigEvent) {
        match event {
            ConfigEvent::Reloaded(config) => {
                info!("Configuration reloaded");
                self.apply_config(*config);
            }
            ConfigEvent::Error(e) => warn!("Keeping current configuration: {}", e),
            ConfigEvent::FileCreated(path) => debug!("Config file created: {:?}", path),
            ConfigEvent::FileDeleted(path) => debug!("Config file deleted: {:?}", path),
        }
    }

    /// Apply a new configuration to the running stage.
    ///
    /// Tempo and mapping changes restart the clock counters. Scene groups
    /// are not re-registered.
    pub fn apply_config(&mut self, config: StageConfig) {
        self.engine
            .initialize(config.midi.tempo(), config.midi.mapping());
        self.registry.set_channel(config.midi.channel);

        if config.midi.device != self.config.midi.device {
            match config.midi.device.as_deref() {
                Some(device) => self.source.rebind(device),
                None => self.source.teardown(),
            }
        }

        {
            let mut analyser = self.analyser.lock().unwrap_or_else(PoisonError::into_inner);
            let settings = config.audio.analyser();
            if settings.fft_size != analyser.fft_size() {
                if let Err(e) = analyser.set_fft_size(settings.fft_size) {
                    warn!("{}", e);
                }
            }
            analyser.set_smoothing(settings.smoothing);
            analyser.set_decibel_range(settings.min_decibels, settings.max_decibels);
            analyser.set_gain(settings.gain);
        }
        let reopen_audio = self.audio.is_some() && config.audio.device != self.config.audio.device;

        let render = &config.render;
        if (render.width, render.height) != self.compositor.targets().size() {
            self.compositor.targets().resize(render.width, render.height);
        }
        if render.fps != self.config.render.fps && self.compositor.is_running() {
            self.compositor.stop();
            self.compositor.start(render.fps);
        }

        self.config = config;
        if reopen_audio {
            self.start_audio();
        }
    }

    /// Release scenes, targets, the device and the audio stream
    pub fn teardown(&mut self) {
        self.registry.destroy();
        self.compositor.destroy();
        self.source.teardown();
        self.audio = None;
        self.engine.clear_listeners();
        info!("Stage torn down");
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn engine(&self) -> &ClockEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ClockEngine {
        &mut self.engine
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SceneRegistry {
        &mut self.registry
    }

    pub fn source(&self) -> &ClockSource {
        &self.source
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn targets(&self) -> &RenderTargets {
        self.compositor.targets()
    }

    pub fn analyser(&self) -> &SharedAnalyser {
        &self.analyser
    }

    /// Whether an audio stream is open
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}
