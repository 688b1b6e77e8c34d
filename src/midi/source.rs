// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Clock source: binds a named MIDI input and normalizes its traffic.
//!
//! Incoming bytes are turned into [`SourceEvent`]s and pushed onto an
//! unbounded channel in device order. When the requested device is missing
//! the source keeps polling for it in the background until it appears.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{InputConnection, MidiBackend, MidiError, MidiMessage};

/// Interval between device discovery attempts while waiting for a device
pub const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Normalized clock source output
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// One MIDI clock pulse (24 per quarter note)
    Pulse { timestamp_us: u64 },
    /// Transport start
    Start,
    /// Transport stop
    Stop,
    /// Any other message, passed through
    Message(MidiMessage),
    /// A device was bound
    Device { name: String },
}

type SharedConnection = Arc<Mutex<Option<Box<dyn InputConnection>>>>;

/// Bumped on every configure, rebind and teardown. A bind started under an
/// older generation is discarded.
type Generation = Arc<AtomicU64>;

/// MIDI clock source bound to at most one input device
pub struct ClockSource {
    backend: Arc<dyn MidiBackend>,
    sender: UnboundedSender<SourceEvent>,
    connection: SharedConnection,
    generation: Generation,
    retry: Option<JoinHandle<()>>,
}

impl ClockSource {
    /// Create a source and the receiver its events are delivered to
    pub fn new(backend: Arc<dyn MidiBackend>) -> (Self, UnboundedReceiver<SourceEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let source = Self {
            backend,
            sender,
            connection: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            retry: None,
        };
        (source, receiver)
    }

    /// Bind to a named input device.
    ///
    /// A missing device is not an error: a warning is logged and discovery
    /// is retried every [`RETRY_INTERVAL`] until the bind succeeds. The
    /// caller is never blocked.
    pub fn configure(&mut self, device: &str) {
        self.cancel_retry();
        let generation = self.generation.load(Ordering::SeqCst);

        match bind(
            &*self.backend,
            device,
            &self.sender,
            &self.connection,
            (&*self.generation, generation),
        ) {
            Ok(_) => {}
            Err(e) => {
                warn!("MIDI device \"{}\" currently not available ({})", device, e);
                self.spawn_retry(device.to_string(), generation);
            }
        }
    }

    /// Drop the current device and bind a new one
    pub fn rebind(&mut self, device: &str) {
        self.cancel_retry();
        self.unbind();
        self.configure(device);
    }

    /// Cancel any pending retry and release the device connection
    pub fn teardown(&mut self) {
        self.cancel_retry();
        self.unbind();
    }

    /// Whether a device is currently bound
    pub fn is_bound(&self) -> bool {
        lock(&self.connection).is_some()
    }

    /// Whether a background discovery retry is pending
    pub fn is_waiting(&self) -> bool {
        self.retry.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Name of the bound device
    pub fn device(&self) -> Option<String> {
        lock(&self.connection)
            .as_ref()
            .map(|conn| conn.device().to_string())
    }

    /// Names of the inputs the backend currently reports
    pub fn available_inputs(&self) -> Vec<String> {
        self.backend.input_names()
    }

    fn unbind(&mut self) {
        if let Some(conn) = lock(&self.connection).take() {
            debug!("Releasing MIDI device {}", conn.device());
            conn.close();
        }
    }

    /// Invalidate any bind still in flight, then abort the retry task.
    ///
    /// Aborting alone cannot stop a backend connect that is already running.
    fn cancel_retry(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.retry.take() {
            handle.abort();
        }
    }

    fn spawn_retry(&mut self, device: String, generation: u64) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, not waiting for MIDI device \"{}\"", device);
            return;
        };

        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        let connection = Arc::clone(&self.connection);
        let current = Arc::clone(&self.generation);

        self.retry = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(RETRY_INTERVAL);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if backend.input_names().is_empty() {
                    continue;
                }
                match bind(&*backend, &device, &sender, &connection, (&*current, generation)) {
                    Ok(_) => break,
                    Err(e) => debug!("MIDI device \"{}\" still unavailable: {}", device, e),
                }
            }
        }));
    }
}

impl Drop for ClockSource {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock(connection: &SharedConnection) -> std::sync::MutexGuard<'_, Option<Box<dyn InputConnection>>> {
    connection.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connect and store the connection.
///
/// Returns `Ok(false)` without binding when `generation` moved on while the
/// backend was connecting.
fn bind(
    backend: &dyn MidiBackend,
    device: &str,
    sender: &UnboundedSender<SourceEvent>,
    connection: &SharedConnection,
    (current, generation): (&AtomicU64, u64),
) -> Result<bool, MidiError> {
    let tx = sender.clone();
    let conn = backend.connect(
        device,
        Box::new(move |timestamp_us, bytes| {
            if let Some(event) = normalize(timestamp_us, bytes) {
                let _ = tx.send(event);
            }
        }),
    )?;

    let name = conn.device().to_string();
    {
        let mut slot = lock(connection);
        if current.load(Ordering::SeqCst) != generation {
            drop(slot);
            debug!("Discarding stale connection to {}", name);
            conn.close();
            return Ok(false);
        }
        if let Some(previous) = slot.replace(conn) {
            previous.close();
        }
    }

    info!("Active MIDI device: {}", name);
    let _ = sender.send(SourceEvent::Device { name });
    Ok(true)
}

/// Map raw bytes to a source event
pub(crate) fn normalize(timestamp_us: u64, bytes: &[u8]) -> Option<SourceEvent> {
    let message = MidiMessage::parse(bytes)?;
    Some(match message {
        MidiMessage::TimingClock => SourceEvent::Pulse { timestamp_us },
        MidiMessage::Start => SourceEvent::Start,
        MidiMessage::Stop => SourceEvent::Stop,
        other => SourceEvent::Message(other),
    })
}
