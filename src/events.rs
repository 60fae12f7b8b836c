//! Event queue between background notification sources and the owning
//! thread.
//!
//! Background threads (USB poller, keyspace listener) only ever *send*
//! [`Event`]s. The thread that owns the device registry drains the queue once
//! per tick with [`EventQueue::tick`]; duplicates that arrived since the
//! previous tick are coalesced, so a burst of notifications causes a single
//! reaction on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::Result;

/// Notification from a background source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "event", content = "id", rename_all = "snake_case")]
pub enum Event {
    /// A USB device appeared (sysfs device name).
    UsbAttached(String),
    /// A USB device went away (sysfs device name).
    UsbDetached(String),
    /// A store key was modified (key name without the keyspace prefix).
    KeyChanged(String),
}

impl Event {
    /// True for hardware attach/detach edges.
    pub const fn is_usb(&self) -> bool {
        matches!(self, Self::UsbAttached(_) | Self::UsbDetached(_))
    }
}

/// Sending half handed to background sources.
pub type EventSender = Sender<Event>;

/// Single-consumer queue drained once per tick.
pub struct EventQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// A new sender for a background source.
    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    /// Drain everything queued since the last tick.
    ///
    /// Events keep their first-arrival order; repeats are dropped.
    pub fn tick(&self) -> Vec<Event> {
        let mut events: Vec<Event> = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            if events.contains(&event) {
                trace!(?event, "Coalescing duplicate event");
                continue;
            }
            events.push(event);
        }
        if !events.is_empty() {
            debug!(count = events.len(), "Drained events");
        }
        events
    }
}

/// A background thread with a cooperative stop flag.
///
/// Dropping the task stops and joins it.
pub struct BackgroundTask {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawn `body` on a named thread. `body` must return once the flag it
    /// receives is set.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))?;
        debug!(task = name, "Background task started");
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(task = %self.name, "Background task panicked");
            } else {
                debug!(task = %self.name, "Background task stopped");
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.stop();
    }
}
