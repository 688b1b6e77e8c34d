// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Fixed-rate frame loop with an explicit cancellation handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// Runs a callback once per frame until cancelled.
///
/// The flag is checked before every frame, so a frame in progress always
/// completes. Dropping the loop cancels it.
#[derive(Debug)]
pub struct FrameLoop {
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameLoop {
    /// Start calling `frame` at `fps` frames per second
    pub fn start<F>(fps: u32, mut frame: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));

        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, frame loop not started");
            cancelled.store(true, Ordering::SeqCst);
            return Self {
                cancelled,
                handle: None,
            };
        };

        let period = frame_interval(fps);
        let flag = Arc::clone(&cancelled);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                frame();
            }
        });

        Self {
            cancelled,
            handle: Some(handle),
        }
    }

    /// Request cancellation; no further frame starts
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !self.is_cancelled() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Frame period for a rate, treating 0 as 1 fps
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}
