//! USB attach/detach polling.
//!
//! Watches the sysfs USB device directory and emits edge events when the
//! set of device entries changes. Interface entries (`1-1:1.0`) are ignored.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{BackgroundTask, Event, EventSender};

const STOP_CHECK: Duration = Duration::from_millis(50);

/// Device entries currently present under `root`.
pub fn scan_usb(root: &Path) -> io::Result<BTreeSet<String>> {
    let mut devices = BTreeSet::new();
    for entry in std::fs::read_dir(root)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if !name.contains(':') {
            devices.insert(name);
        }
    }
    Ok(devices)
}

/// Edge events turning `previous` into `current`.
pub fn diff_usb(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Vec<Event> {
    let attached = current
        .difference(previous)
        .map(|name| Event::UsbAttached(name.clone()));
    let detached = previous
        .difference(current)
        .map(|name| Event::UsbDetached(name.clone()));
    attached.chain(detached).collect()
}

fn scan_or_empty(root: &Path) -> BTreeSet<String> {
    scan_usb(root).unwrap_or_else(|e| {
        debug!(root = %root.display(), error = %e, "USB scan failed");
        BTreeSet::new()
    })
}

/// Background poller for USB topology changes.
pub struct UsbPoller {
    task: BackgroundTask,
}

impl UsbPoller {
    /// Start polling `root` every `interval`.
    pub fn spawn(root: PathBuf, interval: Duration, sender: EventSender) -> Result<Self> {
        if !root.is_dir() {
            warn!(root = %root.display(), "USB device directory missing, hotplug disabled");
        }
        let mut known = scan_or_empty(&root);
        info!(root = %root.display(), devices = known.len(), "Watching USB devices");

        let task = BackgroundTask::spawn("enn-usb", move |stop| {
            let mut last_scan = Instant::now();
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(STOP_CHECK.min(interval));
                if last_scan.elapsed() < interval {
                    continue;
                }
                last_scan = Instant::now();

                let current = scan_or_empty(&root);
                for event in diff_usb(&known, &current) {
                    debug!(?event, "USB change");
                    if sender.send(event).is_err() {
                        return;
                    }
                }
                known = current;
            }
        })?;

        Ok(Self { task })
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }
}
