// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Render target collection and the per-frame compositor.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, trace, warn};

use super::{aspect_ratio, FrameLoop, FrameStats, PassRef, Pipeline, RenderTarget};

/// Name of the target registered at start-up
pub const MAIN_TARGET: &str = "main";

struct TargetState {
    targets: HashMap<String, RenderTarget>,
    /// Composition order, newest first; `main` stays last
    order: VecDeque<String>,
    pipeline: Box<dyn Pipeline>,
    stats: FrameStats,
    show_stats: bool,
    size: (u32, u32),
}

/// Shared handle to the render target collection.
///
/// Every mutation and every frame goes through one lock. Clones refer to the
/// same collection, so scenes can hold one.
#[derive(Clone)]
pub struct RenderTargets {
    inner: Arc<Mutex<TargetState>>,
}

impl RenderTargets {
    fn new(pipeline: Box<dyn Pipeline>, width: u32, height: u32, show_stats: bool) -> Self {
        let mut main = RenderTarget::new(MAIN_TARGET, width, height);
        main.post.save = None;

        let mut targets = HashMap::new();
        targets.insert(MAIN_TARGET.to_string(), main);

        let mut pipeline = pipeline;
        pipeline.set_size(width, height);

        Self {
            inner: Arc::new(Mutex::new(TargetState {
                targets,
                order: VecDeque::from([MAIN_TARGET.to_string()]),
                pipeline,
                stats: FrameStats::new(Instant::now()),
                show_stats,
                size: (width, height),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TargetState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a target with a render and a save pass, composited first.
    ///
    /// An existing target of the same name is replaced and moves to the
    /// front. `main` cannot be recreated.
    pub fn create_target(&self, name: &str, width: u32, height: u32) -> bool {
        if name == MAIN_TARGET {
            warn!("Render target \"{}\" is reserved", MAIN_TARGET);
            return false;
        }
        let mut state = self.lock();
        if state.targets.contains_key(name) {
            debug!("Replacing render target {}", name);
            state.order.retain(|n| n != name);
        }
        state
            .targets
            .insert(name.to_string(), RenderTarget::new(name, width, height));
        state.order.push_front(name.to_string());
        true
    }

    /// Remove a dynamically created target. `main` is never removed.
    pub fn remove_target(&self, name: &str) -> bool {
        if name == MAIN_TARGET {
            return false;
        }
        let mut state = self.lock();
        match state.targets.remove(name) {
            Some(_) => {
                state.order.retain(|n| n != name);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().targets.contains_key(name)
    }

    /// Target names in composition order
    pub fn names(&self) -> Vec<String> {
        self.lock().order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().targets.is_empty()
    }

    /// Run `f` on a target while holding the collection lock
    pub fn with_target<R>(&self, name: &str, f: impl FnOnce(&mut RenderTarget) -> R) -> Option<R> {
        self.lock().targets.get_mut(name).map(f)
    }

    /// Attach or detach a target's effect pass
    pub fn set_effect_pass(&self, name: &str, pass: Option<PassRef>) -> bool {
        self.with_target(name, |target| target.post.effect = pass)
            .is_some()
    }

    /// Rebuild the pipeline from the current targets and run it once.
    ///
    /// Returns the number of stages run.
    pub fn compose_frame(&self) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.pipeline.clear_passes();
        let mut stages = 0;
        for name in state.order.iter() {
            if let Some(target) = state.targets.get(name) {
                for pass in target.post.ordered() {
                    state.pipeline.add_pass(Arc::clone(pass));
                    stages += 1;
                }
            }
        }
        state.pipeline.render();

        if let Some(fps) = state.stats.tick(Instant::now()) {
            if state.show_stats {
                debug!("Compositor: {:.1} fps, {} stages", fps, stages);
            }
        }
        trace!("Composed frame with {} stages", stages);
        stages
    }

    /// Update the main camera aspect and the output surface size
    pub fn resize(&self, width: u32, height: u32) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(main) = state.targets.get_mut(MAIN_TARGET) {
            main.camera.set_aspect(aspect_ratio(width, height));
        }
        state.pipeline.set_size(width, height);
        state.size = (width, height);
    }

    /// Output surface size
    pub fn size(&self) -> (u32, u32) {
        self.lock().size
    }

    /// Frames composed so far
    pub fn frame_count(&self) -> u64 {
        self.lock().stats.frames()
    }

    fn clear(&self) {
        let mut state = self.lock();
        for target in state.targets.values_mut() {
            target.graph.clear();
        }
        state.targets.clear();
        state.order.clear();
        state.pipeline.clear_passes();
    }
}

/// Continuous compositor over the render target collection
pub struct Compositor {
    targets: RenderTargets,
    frame_loop: Option<FrameLoop>,
}

impl Compositor {
    /// Create a compositor with the `main` target registered
    pub fn new(pipeline: Box<dyn Pipeline>, width: u32, height: u32, show_stats: bool) -> Self {
        Self {
            targets: RenderTargets::new(pipeline, width, height, show_stats),
            frame_loop: None,
        }
    }

    /// Handle to the target collection
    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// Start composing at `fps`. Does nothing if already running.
    pub fn start(&mut self, fps: u32) {
        if self.is_running() {
            return;
        }
        let targets = self.targets.clone();
        self.frame_loop = Some(FrameLoop::start(fps, move || {
            targets.compose_frame();
        }));
        debug!("Compositor started at {} fps", fps);
    }

    /// Cancel the frame loop
    pub fn stop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.as_ref().is_some_and(FrameLoop::is_running)
    }

    /// Stop and release every target
    pub fn destroy(&mut self) {
        self.stop();
        self.targets.clear();
    }
}
