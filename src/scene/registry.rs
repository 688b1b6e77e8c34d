// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Scene registry: groups of live scenes with at most one group active.

use tracing::{debug, info, warn};

use super::{SceneDescriptor, SceneError, SceneId, SceneInstance};
use crate::control::MidiChannel;
use crate::events::Event;

/// Registry lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryState {
    /// No groups registered
    Empty,
    /// Groups registered, none active
    Idle,
    /// Exactly one group active
    Active(SceneId),
}

/// Scene instances of one group, in registration order
#[derive(Debug)]
struct SceneGroup {
    id: SceneId,
    instances: Vec<SceneInstance>,
}

/// Owns every scene group and the active-group marker
#[derive(Debug)]
pub struct SceneRegistry {
    groups: Vec<SceneGroup>,
    active: Option<usize>,
    channel: MidiChannel,
    subscribed: bool,
}

impl SceneRegistry {
    /// Create an empty registry listening on `channel`
    pub fn new(channel: MidiChannel) -> Self {
        Self {
            groups: Vec::new(),
            active: None,
            channel,
            subscribed: false,
        }
    }

    /// Instantiate and set up every scene of every descriptor.
    ///
    /// Setups run one at a time in declaration order. If any setup fails,
    /// every instance created so far is destroyed, the registry is left
    /// empty and the error is returned.
    pub async fn setup(&mut self, descriptors: Vec<SceneDescriptor>) -> Result<(), SceneError> {
        if !self.groups.is_empty() {
            self.destroy();
        }

        let mut groups: Vec<SceneGroup> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let mut group = SceneGroup {
                id: descriptor.id,
                instances: Vec::with_capacity(descriptor.factories.len()),
            };
            for factory in &descriptor.factories {
                let mut instance = SceneInstance::new(factory());
                if let Err(e) = instance.setup().await {
                    warn!("Scene setup failed in group {}: {}", group.id, e);
                    instance.destroy();
                    groups.push(group);
                    for group in groups.iter_mut() {
                        for instance in group.instances.iter_mut() {
                            instance.destroy();
                        }
                    }
                    return Err(e);
                }
                debug!("Scene {} ready in group {}", instance.id(), group.id);
                group.instances.push(instance);
            }
            groups.push(group);
        }

        info!("Registered {} scene group(s)", groups.len());
        self.groups = groups;
        self.active = None;
        self.subscribed = true;
        Ok(())
    }

    /// Activate a group. Unknown ids and the already active id are no-ops.
    pub fn play(&mut self, id: &SceneId) {
        let Some(target) = self.position(id) else {
            debug!("No scene group {}", id);
            return;
        };

        if let Some(active) = self.active {
            if active == target {
                return;
            }
            self.stop_group(active);
            self.active = None;
        }

        debug!("Playing scene group {}", id);
        for instance in self.groups[target].instances.iter_mut() {
            instance.play();
        }
        self.active = Some(target);
    }

    /// Stop a group, or the active group when `id` is `None`.
    ///
    /// The active marker is cleared only when the stopped group is the
    /// active one.
    pub fn stop(&mut self, id: Option<&SceneId>) {
        let target = match id {
            Some(id) => self.position(id),
            None => self.active,
        };
        let Some(target) = target else {
            return;
        };

        self.stop_group(target);
        if self.active == Some(target) {
            self.active = None;
        }
    }

    /// Set the parameter on every instance of the active group
    pub fn set_scene_parameter(&mut self, value: f64) {
        if let Some(active) = self.active {
            for instance in self.groups[active].instances.iter_mut() {
                instance.set_parameter(value);
            }
        }
    }

    /// Stop and destroy every instance, then forget all groups
    pub fn destroy(&mut self) {
        for group in self.groups.iter_mut() {
            for instance in group.instances.iter_mut() {
                instance.stop();
                instance.destroy();
            }
        }
        self.groups.clear();
        self.active = None;
        self.subscribed = false;
    }

    /// React to a bus event.
    ///
    /// `sceneParam` and `sceneChange` are honoured only on the registry's
    /// channel; beats and bars go to the active group.
    pub fn handle_event(&mut self, event: &Event) {
        if !self.subscribed {
            return;
        }
        match event {
            Event::SceneParam { channel, value } if self.channel.matches(*channel) => {
                self.set_scene_parameter(*value as f64);
            }
            Event::SceneChange { channel, value } if self.channel.matches(*channel) => {
                self.play(&SceneId::from(*value));
            }
            Event::Beat(_) | Event::Bar(_) => {
                if let Some(active) = self.active {
                    for instance in self.groups[active].instances.iter_mut() {
                        instance.on_clock(event);
                    }
                }
            }
            _ => {}
        }
    }

    pub fn state(&self) -> RegistryState {
        match self.active {
            Some(index) => RegistryState::Active(self.groups[index].id.clone()),
            None if self.groups.is_empty() => RegistryState::Empty,
            None => RegistryState::Idle,
        }
    }

    /// Id of the active group
    pub fn active_id(&self) -> Option<&SceneId> {
        self.active.map(|index| &self.groups[index].id)
    }

    pub fn channel(&self) -> MidiChannel {
        self.channel
    }

    pub fn set_channel(&mut self, channel: MidiChannel) {
        self.channel = channel;
    }

    /// Whether bus events are being handled
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Registered group ids in order
    pub fn group_ids(&self) -> Vec<SceneId> {
        self.groups.iter().map(|g| g.id.clone()).collect()
    }

    /// Instance ids of one group
    pub fn instance_ids(&self, id: &SceneId) -> Vec<String> {
        self.position(id)
            .map(|index| {
                self.groups[index]
                    .instances
                    .iter()
                    .map(|i| i.id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn position(&self, id: &SceneId) -> Option<usize> {
        self.groups.iter().position(|g| &g.id == id)
    }

    fn stop_group(&mut self, index: usize) {
        debug!("Stopping scene group {}", self.groups[index].id);
        for instance in self.groups[index].instances.iter_mut() {
            instance.stop();
        }
    }
}

impl Default for SceneRegistry {
    fn default() -> Self {
        Self::new(MidiChannel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BeatEvent;
    use crate::scene::testing::{failing, probe, take, CallLog};
    use std::sync::{Arc, Mutex};

    fn log() -> CallLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    async fn two_groups(log: &CallLog) -> SceneRegistry {
        let mut registry = SceneRegistry::default();
        registry
            .setup(vec![
                SceneDescriptor::new(1i64)
                    .with(probe("a1", log))
                    .with(probe("a2", log)),
                SceneDescriptor::new(2i64).with(probe("b1", log)),
            ])
            .await
            .unwrap();
        take(log);
        registry
    }

    #[tokio::test]
    async fn test_setup_is_sequential_and_ordered() {
        let log = log();
        let mut registry = SceneRegistry::default();
        assert_eq!(registry.state(), RegistryState::Empty);

        registry
            .setup(vec![
                SceneDescriptor::new(1i64)
                    .with(probe("a1", &log))
                    .with(probe("a2", &log)),
                SceneDescriptor::new("outro").with(probe("b1", &log)),
            ])
            .await
            .unwrap();

        assert_eq!(take(&log), vec!["a1:setup", "a2:setup", "b1:setup"]);
        assert_eq!(registry.state(), RegistryState::Idle);
        assert!(registry.is_subscribed());
        assert_eq!(
            registry.group_ids(),
            vec![SceneId::Number(1), SceneId::from("outro")]
        );
        assert_eq!(registry.instance_ids(&SceneId::Number(1)).len(), 2);
    }

    #[tokio::test]
    async fn test_setup_failure_destroys_everything() {
        let log = log();
        let mut registry = SceneRegistry::default();

        let result = registry
            .setup(vec![
                SceneDescriptor::new(1i64).with(probe("a1", &log)),
                SceneDescriptor::new(2i64)
                    .with(probe("b1", &log))
                    .with(failing("b2", &log))
                    .with(probe("b3", &log)),
            ])
            .await;

        assert!(matches!(result, Err(SceneError::Setup { .. })));
        assert_eq!(
            take(&log),
            vec![
                "a1:setup",
                "b1:setup",
                "b2:setup",
                "b2:destroy",
                "a1:destroy",
                "b1:destroy"
            ]
        );
        assert_eq!(registry.state(), RegistryState::Empty);
        assert!(!registry.is_subscribed());

        registry.play(&SceneId::Number(1));
        assert!(take(&log).is_empty());
    }

    #[tokio::test]
    async fn test_switching_groups_stops_previous_once() {
        let log = log();
        let mut registry = two_groups(&log).await;

        registry.play(&SceneId::Number(1));
        registry.play(&SceneId::Number(2));
        registry.play(&SceneId::Number(1));

        assert_eq!(
            take(&log),
            vec![
                "a1:play", "a2:play", "a1:stop", "a2:stop", "b1:play", "b1:stop", "a1:play",
                "a2:play"
            ]
        );
        assert_eq!(registry.state(), RegistryState::Active(SceneId::Number(1)));
    }

    #[tokio::test]
    async fn test_same_id_play_is_idempotent() {
        let log = log();
        let mut registry = two_groups(&log).await;

        registry.play(&SceneId::Number(2));
        registry.play(&SceneId::Number(2));
        assert_eq!(take(&log), vec!["b1:play"]);
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_no_op() {
        let log = log();
        let mut registry = two_groups(&log).await;

        registry.play(&SceneId::Number(1));
        take(&log);

        registry.play(&SceneId::from("nonexistent"));
        registry.stop(Some(&SceneId::Number(99)));
        assert!(take(&log).is_empty());
        assert_eq!(registry.active_id(), Some(&SceneId::Number(1)));
    }

    #[tokio::test]
    async fn test_stop_without_id_clears_active() {
        let log = log();
        let mut registry = two_groups(&log).await;

        registry.stop(None);
        assert!(take(&log).is_empty());

        registry.play(&SceneId::Number(2));
        registry.stop(None);
        assert_eq!(take(&log), vec!["b1:play", "b1:stop"]);
        assert_eq!(registry.state(), RegistryState::Idle);

        // Playing the same group again is a fresh activation
        registry.play(&SceneId::Number(2));
        assert_eq!(take(&log), vec!["b1:play"]);
    }

    #[tokio::test]
    async fn test_stop_inactive_group_keeps_active_marker() {
        let log = log();
        let mut registry = two_groups(&log).await;

        registry.play(&SceneId::Number(1));
        registry.stop(Some(&SceneId::Number(2)));
        assert_eq!(take(&log), vec!["a1:play", "a2:play", "b1:stop"]);
        assert_eq!(registry.active_id(), Some(&SceneId::Number(1)));
    }

    #[tokio::test]
    async fn test_parameter_goes_to_active_group_only() {
        let log = log();
        let mut registry = two_groups(&log).await;

        registry.set_scene_parameter(3.0);
        assert!(take(&log).is_empty());

        registry.play(&SceneId::Number(2));
        take(&log);
        registry.set_scene_parameter(3.0);
        registry.set_scene_parameter(3.0);
        assert_eq!(take(&log), vec!["b1:param(3,false)", "b1:param(3,true)"]);
    }

    #[tokio::test]
    async fn test_events_are_channel_filtered() {
        let log = log();
        let mut registry = two_groups(&log).await;

        registry.handle_event(&Event::SceneChange {
            channel: 1,
            value: 1,
        });
        assert!(take(&log).is_empty());

        registry.handle_event(&Event::SceneChange {
            channel: 16,
            value: 1,
        });
        registry.handle_event(&Event::SceneParam {
            channel: 16,
            value: 64,
        });
        registry.handle_event(&Event::SceneParam {
            channel: 2,
            value: 1,
        });
        assert_eq!(
            take(&log),
            vec!["a1:play", "a2:play", "a1:param(64,false)", "a2:param(64,false)"]
        );

        registry.set_channel(MidiChannel::All);
        registry.handle_event(&Event::SceneChange {
            channel: 3,
            value: 2,
        });
        assert_eq!(registry.active_id(), Some(&SceneId::Number(2)));
    }

    #[tokio::test]
    async fn test_clock_events_reach_active_group() {
        let log = log();
        let mut registry = two_groups(&log).await;
        let beat = Event::Beat(BeatEvent {
            beat: 1,
            beat_length: 0.5,
            tempo: 120.0,
            timestamp_us: 0,
        });

        registry.handle_event(&beat);
        assert!(take(&log).is_empty());

        registry.play(&SceneId::Number(2));
        take(&log);
        registry.handle_event(&beat);
        assert_eq!(take(&log), vec!["b1:beat1"]);
    }

    #[tokio::test]
    async fn test_destroy_stops_and_destroys_in_order() {
        let log = log();
        let mut registry = two_groups(&log).await;
        registry.play(&SceneId::Number(1));
        take(&log);

        registry.destroy();
        assert_eq!(
            take(&log),
            vec![
                "a1:stop",
                "a1:destroy",
                "a2:stop",
                "a2:destroy",
                "b1:stop",
                "b1:destroy"
            ]
        );
        assert_eq!(registry.state(), RegistryState::Empty);
        assert!(!registry.is_subscribed());

        registry.handle_event(&Event::SceneChange {
            channel: 16,
            value: 1,
        });
        assert!(take(&log).is_empty());
    }
}
