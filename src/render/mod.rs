// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Frame composition.
//!
//! The compositor owns an ordered set of render targets, each a scene graph
//! with a camera and up to three pipeline stages. Once per frame it rebuilds
//! the pipeline from the current targets and runs it. Drawing itself is the
//! host's job, behind the [`Pipeline`] trait.

pub mod compositor;
pub mod frame_loop;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

pub use compositor::{Compositor, RenderTargets, MAIN_TARGET};
pub use frame_loop::FrameLoop;

/// Kind of pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Draws a target's scene graph through its camera
    Render,
    /// Captures the output so far as a texture
    Save,
    /// Post-processing effect
    Effect,
}

/// A pipeline stage supplied by the rendering host
pub trait RenderPass: Send + Sync + fmt::Debug {
    fn label(&self) -> &str;
    fn kind(&self) -> PassKind;
}

/// Shared handle to a stage
pub type PassRef = Arc<dyn RenderPass>;

/// Plain labelled stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePass {
    label: String,
    kind: PassKind,
}

impl StagePass {
    pub fn new(label: impl Into<String>, kind: PassKind) -> Self {
        Self {
            label: label.into(),
            kind,
        }
    }

    /// Shared render pass for a target
    pub fn render(target: &str) -> PassRef {
        Arc::new(Self::new(format!("{}:render", target), PassKind::Render))
    }

    /// Shared save pass for a target
    pub fn save(target: &str) -> PassRef {
        Arc::new(Self::new(format!("{}:save", target), PassKind::Save))
    }

    /// Shared effect pass
    pub fn effect(label: impl Into<String>) -> PassRef {
        Arc::new(Self::new(label, PassKind::Effect))
    }
}

impl RenderPass for StagePass {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> PassKind {
        self.kind
    }
}

/// The host's compositing pipeline
pub trait Pipeline: Send {
    /// Drop every stage
    fn clear_passes(&mut self);

    /// Append a stage
    fn add_pass(&mut self, pass: PassRef);

    /// Run the assembled stages once
    fn render(&mut self);

    /// Resize the output surface
    fn set_size(&mut self, width: u32, height: u32);
}

/// Pipeline that draws nothing and keeps the last assembled frame.
#[derive(Debug, Default)]
pub struct HeadlessPipeline {
    passes: Vec<PassRef>,
    last_frame: Vec<String>,
    frames: u64,
    size: (u32, u32),
}

impl HeadlessPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels of the stages run in the last frame
    pub fn last_frame(&self) -> &[String] {
        &self.last_frame
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Pipeline for HeadlessPipeline {
    fn clear_passes(&mut self) {
        self.passes.clear();
    }

    fn add_pass(&mut self, pass: PassRef) {
        self.passes.push(pass);
    }

    fn render(&mut self) {
        self.frames += 1;
        self.last_frame = self.passes.iter().map(|p| p.label().to_string()).collect();
        trace!("Frame {}: {:?}", self.frames, self.last_frame);
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }
}

/// Perspective camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Vertical field of view in degrees
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub look_at: [f32; 3],
}

impl Camera {
    /// Default stage camera: 50 degrees, 1..1000, at z=200 looking at origin
    pub fn perspective(aspect: f32) -> Self {
        Self {
            fov: 50.0,
            aspect,
            near: 1.0,
            far: 1000.0,
            position: [0.0, 0.0, 200.0],
            look_at: [0.0, 0.0, 0.0],
        }
    }

    /// Camera for a surface of the given pixel size
    pub fn for_size(width: u32, height: u32) -> Self {
        Self::perspective(aspect_ratio(width, height))
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }
}

pub(crate) fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// A node in a target's scene graph
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub visible: bool,
}

/// Root of an independent scene graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl SceneGraph {
    pub fn add(&mut self, name: impl Into<String>) {
        self.nodes.push(SceneNode {
            name: name.into(),
            visible: true,
        });
    }

    /// Remove every node with the given name. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.name != name);
        before - self.nodes.len()
    }

    pub fn set_visible(&mut self, name: &str, visible: bool) {
        for node in self.nodes.iter_mut().filter(|n| n.name == name) {
            node.visible = visible;
        }
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

/// Pipeline stages attached to a target
#[derive(Debug, Clone, Default)]
pub struct PostStages {
    pub render: Option<PassRef>,
    pub save: Option<PassRef>,
    pub effect: Option<PassRef>,
}

impl PostStages {
    /// Stages in composition order: render, effect, save
    pub fn ordered(&self) -> impl Iterator<Item = &PassRef> {
        self.render
            .iter()
            .chain(self.effect.iter())
            .chain(self.save.iter())
    }
}

/// Scene graph, camera and stages composited as one layer
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub name: String,
    pub graph: SceneGraph,
    pub camera: Camera,
    pub post: PostStages,
}

impl RenderTarget {
    /// A target with a render pass and a save pass
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            graph: SceneGraph::default(),
            camera: Camera::for_size(width, height),
            post: PostStages {
                render: Some(StagePass::render(name)),
                save: Some(StagePass::save(name)),
                effect: None,
            },
        }
    }
}

/// Frame counter with a once-per-second rate
#[derive(Debug, Clone)]
pub struct FrameStats {
    frames: u64,
    fps: f64,
    window_start: Instant,
    window_frames: u64,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            fps: 0.0,
            window_start: now,
            window_frames: 0,
        }
    }

    /// Count a frame. Returns the new rate when a measuring window closes.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        self.window_frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        self.fps = self.window_frames as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        self.window_frames = 0;
        Some(self.fps)
    }

    /// Frames composed so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Last measured frames per second
    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}
