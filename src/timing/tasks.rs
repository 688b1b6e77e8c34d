// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Cancellable one-shot and repeating timers owned by a scene.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// Handle to a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// A set of timed tasks that are all cancelled together.
///
/// Dropping the set cancels everything still pending.
#[derive(Debug, Default)]
pub struct TaskSet {
    tasks: HashMap<TaskId, JoinHandle<()>>,
    next_id: u64,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once after `delay`
    pub fn delayed<F>(&mut self, delay: Duration, f: F) -> Option<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        })
    }

    /// Run `f` every `period`, first after one full period
    pub fn every<F>(&mut self, period: Duration, mut f: F) -> Option<TaskId>
    where
        F: FnMut() + Send + 'static,
    {
        self.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                f();
            }
        })
    }

    /// Cancel one task. Returns false if it was unknown.
    pub fn kill(&mut self, id: TaskId) -> bool {
        match self.tasks.remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending task
    pub fn kill_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Number of tasks that have not completed yet
    pub fn pending(&mut self) -> usize {
        self.tasks.retain(|_, handle| !handle.is_finished());
        self.tasks.len()
    }

    fn spawn<Fut>(&mut self, task: Fut) -> Option<TaskId>
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, timed task not scheduled");
            return None;
        };
        self.tasks.retain(|_, handle| !handle.is_finished());
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.tasks.insert(id, runtime.spawn(task));
        Some(id)
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.kill_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_delayed_runs_once() {
        let mut tasks = TaskSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);

        tasks.delayed(Duration::from_millis(100), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_repeats_until_killed() {
        let mut tasks = TaskSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);

        let id = tasks
            .every(Duration::from_millis(100), move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        assert!(tasks.kill(id));
        assert!(!tasks.kill(id));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_tasks() {
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let mut tasks = TaskSet::new();
            let h = Arc::clone(&hits);
            tasks.delayed(Duration::from_millis(100), move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_tasks_are_pruned_on_schedule() {
        let mut tasks = TaskSet::new();
        for _ in 0..10 {
            tasks.delayed(Duration::from_millis(10), || {});
        }
        assert_eq!(tasks.tasks.len(), 10);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tasks.delayed(Duration::from_millis(10), || {});
        assert_eq!(tasks.tasks.len(), 1);
    }

    #[test]
    fn test_without_runtime_nothing_is_scheduled() {
        let mut tasks = TaskSet::new();
        assert!(tasks.delayed(Duration::from_millis(1), || {}).is_none());
        assert_eq!(tasks.pending(), 0);
    }
}
