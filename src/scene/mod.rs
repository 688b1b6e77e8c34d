// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Scene contract and lifecycle.
//!
//! A scene is a self-contained visual behavior with a play/stop/parameter
//! lifecycle. Concrete scenes implement [`Scene`]; the [`SceneInstance`]
//! adapter gives every instance a process-unique id and tracks the last
//! parameter value so scenes can tell a fresh trigger from a repeat.

pub mod registry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::Event;

pub use registry::{RegistryState, SceneRegistry};

/// Boxed future returned by async scene hooks
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised while preparing scenes
#[derive(Debug, Error)]
pub enum SceneError {
    /// A scene's async setup failed
    #[error("scene {scene} failed to set up: {reason}")]
    Setup { scene: String, reason: String },
    /// A configured scene kind has no factory
    #[error("unknown scene kind: {0}")]
    UnknownKind(String),
}

/// Scene group identifier: a number (selectable by CC value) or a name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SceneId {
    Number(i64),
    Name(String),
}

impl From<i64> for SceneId {
    fn from(n: i64) -> Self {
        SceneId::Number(n)
    }
}

impl From<i32> for SceneId {
    fn from(n: i32) -> Self {
        SceneId::Number(n as i64)
    }
}

impl From<u8> for SceneId {
    fn from(n: u8) -> Self {
        SceneId::Number(n as i64)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        SceneId::Name(s.to_string())
    }
}

impl From<String> for SceneId {
    fn from(s: String) -> Self {
        SceneId::Name(s)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneId::Number(n) => write!(f, "{}", n),
            SceneId::Name(s) => f.write_str(s),
        }
    }
}

/// Lifecycle every concrete scene implements.
///
/// Everything except `name` has a no-op default. `stop` must undo whatever
/// `play` started.
pub trait Scene: Send {
    /// Type name of the scene, used for instance ids and logging
    fn name(&self) -> &str;

    /// One-time resource acquisition
    fn setup(&mut self) -> BoxFuture<'_, Result<(), SceneError>> {
        Box::pin(async { Ok(()) })
    }

    /// Activate the scene
    fn play(&mut self) {}

    /// Deactivate the scene
    fn stop(&mut self) {}

    /// Release everything acquired in `setup`
    fn destroy(&mut self) {}

    /// The scene parameter was set. `retriggered` is true when the value
    /// equals the previous one.
    fn on_parameter_change(&mut self, _value: f64, _retriggered: bool) {}

    /// Beat and bar events while the scene's group is active
    fn on_clock(&mut self, _event: &Event) {}

    /// Playing state, `None` when the scene does not track it
    fn is_playing(&self) -> Option<bool> {
        None
    }
}

static NEXT_UID: AtomicU64 = AtomicU64::new(0);

/// A live scene plus the state every scene shares
pub struct SceneInstance {
    id: String,
    parameter: Option<f64>,
    scene: Box<dyn Scene>,
}

impl SceneInstance {
    pub fn new(scene: Box<dyn Scene>) -> Self {
        let uid = NEXT_UID.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            id: format!("{}{}", scene.name(), uid),
            parameter: None,
            scene,
        }
    }

    /// Process-unique instance id (`<name><n>`)
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.scene.name()
    }

    /// Last parameter value, `None` until one is set
    pub fn parameter(&self) -> Option<f64> {
        self.parameter
    }

    /// Set the parameter and notify the scene. Returns the retrigger flag.
    pub fn set_parameter(&mut self, value: f64) -> bool {
        let retriggered = self.parameter == Some(value);
        self.scene.on_parameter_change(value, retriggered);
        self.parameter = Some(value);
        retriggered
    }

    pub async fn setup(&mut self) -> Result<(), SceneError> {
        self.scene.setup().await
    }

    pub fn play(&mut self) {
        self.scene.play();
    }

    pub fn stop(&mut self) {
        self.scene.stop();
    }

    pub fn destroy(&mut self) {
        self.scene.destroy();
    }

    pub fn on_clock(&mut self, event: &Event) {
        self.scene.on_clock(event);
    }

    pub fn is_playing(&self) -> Option<bool> {
        self.scene.is_playing()
    }
}

impl fmt::Debug for SceneInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneInstance")
            .field("id", &self.id)
            .field("parameter", &self.parameter)
            .finish()
    }
}

/// Constructor for one scene
pub type SceneFactory = Box<dyn Fn() -> Box<dyn Scene> + Send + Sync>;

/// A group id plus the ordered factories of its scenes
pub struct SceneDescriptor {
    pub id: SceneId,
    pub factories: Vec<SceneFactory>,
}

impl SceneDescriptor {
    pub fn new(id: impl Into<SceneId>) -> Self {
        Self {
            id: id.into(),
            factories: Vec::new(),
        }
    }

    /// Builder: append a scene constructor
    pub fn with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Scene> + Send + Sync + 'static,
    {
        self.factories.push(Box::new(factory));
        self
    }
}

impl fmt::Debug for SceneDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneDescriptor")
            .field("id", &self.id)
            .field("factories", &self.factories.len())
            .finish()
    }
}
