// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! File watcher for hot-reload configuration.
//!
//! Modifications are debounced, then the file is re-read and validated. A
//! valid file arrives as [`ConfigEvent::Reloaded`]; anything else as
//! [`ConfigEvent::Error`], leaving the running stage untouched.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use super::StageConfig;

/// Default debounce window
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Events emitted by the config watcher
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Configuration file was modified and successfully reloaded
    Reloaded(Box<StageConfig>),
    /// Configuration file was modified but failed to load or validate
    Error(String),
    /// A new file was created in the watch directory
    FileCreated(PathBuf),
    /// A file was deleted from the watch directory
    FileDeleted(PathBuf),
}

/// Configuration file watcher with debouncing and validation
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    event_receiver: Receiver<ConfigEvent>,
    watched_path: PathBuf,
}

impl ConfigWatcher {
    /// Watch a config file, or every YAML file in a directory.
    ///
    /// # Arguments
    /// * `path` - Path to watch (file or directory)
    /// * `debounce_ms` - Debounce duration in milliseconds (default: 500)
    pub fn new<P: AsRef<Path>>(path: P, debounce_ms: Option<u64>) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let debounce = Duration::from_millis(debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS));

        let (event_tx, event_rx) = mpsc::channel();
        let (notify_tx, notify_rx) = mpsc::channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        let mode = if watched_path.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&watched_path, mode)
            .map_err(|e| anyhow!("Failed to watch path {:?}: {}", watched_path, e))?;

        let root = watched_path.clone();
        std::thread::spawn(move || debounce_loop(notify_rx, event_tx, root, debounce));

        Ok(Self {
            _watcher: watcher,
            event_receiver: event_rx,
            watched_path,
        })
    }

    /// Try to receive the next config event (non-blocking)
    pub fn try_recv(&self) -> Option<ConfigEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Receive all pending config events
    pub fn recv_all(&self) -> Vec<ConfigEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait up to `timeout` for the next config event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ConfigEvent> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Get the path being watched
    pub fn watched_path(&self) -> &Path {
        &self.watched_path
    }
}

fn debounce_loop(
    notify_rx: Receiver<Event>,
    event_tx: Sender<ConfigEvent>,
    root: PathBuf,
    debounce: Duration,
) {
    let mut last_event: Option<Instant> = None;
    let mut pending: Vec<PathBuf> = Vec::new();

    loop {
        match notify_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => match event.kind {
                EventKind::Create(_) => {
                    for path in event.paths {
                        let _ = event_tx.send(ConfigEvent::FileCreated(path));
                    }
                }
                EventKind::Remove(_) => {
                    for path in event.paths {
                        let _ = event_tx.send(ConfigEvent::FileDeleted(path));
                    }
                }
                EventKind::Modify(_) => {
                    for path in event.paths {
                        if !pending.contains(&path) {
                            pending.push(path);
                        }
                    }
                    last_event = Some(Instant::now());
                }
                _ => {}
            },
            Err(RecvTimeoutError::Timeout) => {
                let settled = last_event.is_some_and(|t| t.elapsed() >= debounce);
                if !settled {
                    continue;
                }
                for path in pending.drain(..) {
                    if is_config_file(&path, &root) {
                        debug!("Reloading configuration from {:?}", path);
                        let event = match validate_config(&path) {
                            Ok(config) => ConfigEvent::Reloaded(Box::new(config)),
                            Err(e) => ConfigEvent::Error(format!("Failed to load {:?}: {:#}", path, e)),
                        };
                        let _ = event_tx.send(event);
                    }
                }
                last_event = None;
            }
            // Watcher was dropped
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn is_config_file(path: &Path, root: &Path) -> bool {
    match path.extension() {
        Some(ext) => ext == "yaml" || ext == "yml",
        None => path == root,
    }
}

/// Load and validate a configuration without applying it
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<StageConfig> {
    let config = StageConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_validate_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("stage.yaml");
        fs::write(&file_path, "midi:\n  bpm: 96\n  channel: 1\n").unwrap();

        let config = validate_config(&file_path).unwrap();
        assert_eq!(config.midi.bpm, 96.0);
    }

    #[test]
    fn test_validate_invalid_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("invalid.yaml");

        fs::write(&file_path, "this is not valid yaml: [").unwrap();
        assert!(validate_config(&file_path).is_err());

        fs::write(&file_path, "midi:\n  beats_per_bar: 0\n").unwrap();
        assert!(validate_config(&file_path).is_err());
    }

    #[test]
    fn test_is_config_file() {
        let root = Path::new("/stage");
        assert!(is_config_file(Path::new("/stage/live.yml"), root));
        assert!(is_config_file(root, root));
        assert!(!is_config_file(Path::new("/stage/notes.txt"), root));
        assert!(!is_config_file(Path::new("/stage/README"), root));
    }

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("stage.yaml"), "").unwrap();

        let watcher = ConfigWatcher::new(dir.path(), Some(100)).unwrap();
        assert_eq!(watcher.watched_path(), dir.path());
        assert!(ConfigWatcher::new(dir.path().join("missing.yaml"), None).is_err());
    }

    #[test]
    fn test_watcher_detects_changes() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("detect_test.yaml");
        fs::write(&file_path, "midi:\n  bpm: 120\n").unwrap();

        let watcher = ConfigWatcher::new(dir.path(), Some(100)).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&file_path)
            .unwrap();
        file.write_all(b"midi:\n  bpm: 140\n  beats_per_bar: 3\n").unwrap();
        file.flush().unwrap();
        drop(file);

        std::thread::sleep(Duration::from_millis(300));
        let events = watcher.recv_all();

        // File events are not guaranteed to arrive in every CI environment
        if let Some(ConfigEvent::Reloaded(config)) =
            events.iter().find(|e| matches!(e, ConfigEvent::Reloaded(_)))
        {
            assert_eq!(config.midi.bpm, 140.0);
            assert_eq!(config.midi.beats_per_bar, 3);
        }
    }
}
