// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Built-in scenes selectable from the stage configuration.
//!
//! - `pulse`: follows the clock and the scene parameter, logging both
//! - `feedback`: owns a render target whose effect pass is toggled while
//!   playing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::SceneGroupConfig;
use crate::events::Event;
use crate::render::{RenderTargets, StagePass};
use crate::scene::{BoxFuture, Scene, SceneDescriptor, SceneError, SceneFactory};
use crate::timing::TaskSet;

/// Scene kinds known to [`factory`]
pub const KINDS: [&str; 2] = ["pulse", "feedback"];

/// Constructor for a named scene kind
pub fn factory(kind: &str, targets: &RenderTargets) -> Result<SceneFactory, SceneError> {
    match kind {
        "pulse" => Ok(Box::new(|| Box::new(PulseScene::new()) as Box<dyn Scene>)),
        "feedback" => {
            let targets = targets.clone();
            Ok(Box::new(move || {
                Box::new(FeedbackScene::new(targets.clone())) as Box<dyn Scene>
            }))
        }
        other => Err(SceneError::UnknownKind(other.to_string())),
    }
}

/// Build registry descriptors from configured scene groups
pub fn descriptors(
    groups: &[SceneGroupConfig],
    targets: &RenderTargets,
) -> Result<Vec<SceneDescriptor>, SceneError> {
    groups
        .iter()
        .map(|group| {
            let factories = group
                .scenes
                .iter()
                .map(|kind| factory(kind, targets))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SceneDescriptor {
                id: group.id.clone(),
                factories,
            })
        })
        .collect()
}

/// Logs beats, bars and parameter triggers
#[derive(Debug, Default)]
pub struct PulseScene {
    playing: bool,
    beats: u64,
    bars: u64,
    triggers: u64,
}

impl PulseScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Beats seen while playing
    pub fn beats(&self) -> u64 {
        self.beats
    }

    pub fn bars(&self) -> u64 {
        self.bars
    }

    /// Parameter changes received
    pub fn triggers(&self) -> u64 {
        self.triggers
    }
}

impl Scene for PulseScene {
    fn name(&self) -> &str {
        "PulseScene"
    }

    fn play(&mut self) {
        self.playing = true;
        self.beats = 0;
        self.bars = 0;
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn on_parameter_change(&mut self, value: f64, retriggered: bool) {
        self.triggers += 1;
        if retriggered {
            debug!("Pulse retriggered at {}", value);
        } else {
            debug!("Pulse parameter {}", value);
        }
    }

    fn on_clock(&mut self, event: &Event) {
        if !self.playing {
            return;
        }
        match event {
            Event::Beat(beat) => {
                self.beats += 1;
                debug!("Beat {} ({:.1} bpm)", beat.beat, beat.tempo);
            }
            Event::Bar(bar) => {
                self.bars += 1;
                info!("Bar {} ({:.2}s)", bar.bar, bar.bar_length);
            }
            _ => {}
        }
    }

    fn is_playing(&self) -> Option<bool> {
        Some(self.playing)
    }
}

static FEEDBACK_TARGETS: AtomicUsize = AtomicUsize::new(0);

/// Toggle interval of the feedback effect
pub const FEEDBACK_INTERVAL: Duration = Duration::from_millis(250);

/// Draws into its own render target and flickers an effect pass
pub struct FeedbackScene {
    targets: RenderTargets,
    target: String,
    tasks: TaskSet,
    playing: bool,
}

impl FeedbackScene {
    pub fn new(targets: RenderTargets) -> Self {
        let n = FEEDBACK_TARGETS.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            targets,
            target: format!("feedback-{}", n),
            tasks: TaskSet::new(),
            playing: false,
        }
    }

    /// Name of the render target this scene draws into
    pub fn target(&self) -> &str {
        &self.target
    }

    fn effect_label(&self) -> String {
        format!("{}:glitch", self.target)
    }
}

impl Scene for FeedbackScene {
    fn name(&self) -> &str {
        "FeedbackScene"
    }

    fn setup(&mut self) -> BoxFuture<'_, Result<(), SceneError>> {
        Box::pin(async move {
            let (width, height) = self.targets.size();
            if !self.targets.create_target(&self.target, width, height) {
                return Err(SceneError::Setup {
                    scene: self.target.clone(),
                    reason: "render target name is reserved".to_string(),
                });
            }
            self.targets.with_target(&self.target, |target| {
                for i in 0..3 {
                    target.graph.add(format!("triangle-{}", i));
                }
            });
            Ok(())
        })
    }

    fn play(&mut self) {
        self.playing = true;
        let targets = self.targets.clone();
        let name = self.target.clone();
        let label = self.effect_label();
        let mut on = false;
        self.tasks.every(FEEDBACK_INTERVAL, move || {
            on = !on;
            let pass = on.then(|| StagePass::effect(label.clone()));
            targets.set_effect_pass(&name, pass);
        });
    }

    fn stop(&mut self) {
        self.playing = false;
        self.tasks.kill_all();
        self.targets.set_effect_pass(&self.target, None);
    }

    fn destroy(&mut self) {
        self.tasks.kill_all();
        self.targets.remove_target(&self.target);
    }

    fn on_parameter_change(&mut self, value: f64, retriggered: bool) {
        // A fresh value flashes the effect immediately
        if self.playing && !retriggered {
            self.targets
                .set_effect_pass(&self.target, Some(StagePass::effect(self.effect_label())));
            debug!("Feedback flash at {}", value);
        }
    }

    fn is_playing(&self) -> Option<bool> {
        Some(self.playing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BeatEvent;
    use crate::render::{Compositor, HeadlessPipeline};
    use crate::scene::{SceneId, SceneInstance};

    fn compositor() -> Compositor {
        Compositor::new(Box::new(HeadlessPipeline::new()), 320, 240, false)
    }

    fn has_effect(targets: &RenderTargets, name: &str) -> bool {
        targets
            .with_target(name, |t| t.post.effect.is_some())
            .unwrap_or(false)
    }

    #[test]
    fn test_unknown_kind() {
        let compositor = compositor();
        assert!(matches!(
            factory("strobe", compositor.targets()),
            Err(SceneError::UnknownKind(_))
        ));
        for kind in KINDS {
            assert!(factory(kind, compositor.targets()).is_ok());
        }
    }

    #[test]
    fn test_descriptors_from_config() {
        let compositor = compositor();
        let groups = vec![SceneGroupConfig {
            id: SceneId::Number(1),
            scenes: vec!["pulse".to_string(), "feedback".to_string()],
        }];
        let descriptors = descriptors(&groups, compositor.targets()).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].factories.len(), 2);
    }

    #[test]
    fn test_pulse_counts_only_while_playing() {
        let mut scene = PulseScene::new();
        let beat = Event::Beat(BeatEvent {
            beat: 1,
            beat_length: 0.5,
            tempo: 120.0,
            timestamp_us: 0,
        });
        scene.on_clock(&beat);
        assert_eq!(scene.beats(), 0);

        scene.play();
        scene.on_clock(&beat);
        scene.on_clock(&beat);
        assert_eq!(scene.beats(), 2);
        assert_eq!(scene.is_playing(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_feedback_lifecycle() {
        let compositor = compositor();
        let targets = compositor.targets().clone();
        let mut instance = SceneInstance::new(Box::new(FeedbackScene::new(targets.clone())));

        instance.setup().await.unwrap();
        let names = targets.names();
        assert_eq!(names.len(), 2);
        let name = names[0].clone();
        assert!(name.starts_with("feedback-"));
        assert_eq!(targets.with_target(&name, |t| t.graph.len()), Some(3));

        instance.play();
        tokio::time::sleep(FEEDBACK_INTERVAL + Duration::from_millis(10)).await;
        assert!(has_effect(&targets, &name));
        tokio::time::sleep(FEEDBACK_INTERVAL).await;
        assert!(!has_effect(&targets, &name));

        instance.set_parameter(5.0);
        assert!(has_effect(&targets, &name));

        instance.stop();
        assert!(!has_effect(&targets, &name));
        tokio::time::sleep(FEEDBACK_INTERVAL * 4).await;
        assert!(!has_effect(&targets, &name));

        instance.destroy();
        assert!(!targets.contains(&name));
    }
}
