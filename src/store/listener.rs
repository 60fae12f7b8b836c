//! Keyspace notification listener.
//!
//! Subscribes to `__keyspace@0__:*` on a dedicated connection and forwards
//! the name of every touched key to the event queue as
//! [`Event::KeyChanged`].

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::redis_store::connect;
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::events::{BackgroundTask, Event, EventSender};

/// Pattern subscribed to for database 0.
pub const KEYSPACE_PATTERN: &str = "__keyspace@0__:*";

const KEYSPACE_PREFIX: &str = "__keyspace@0__:";

/// How long one blocking read waits before the stop flag is checked again.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Key name carried by a keyspace channel, if `channel` is one.
pub fn keyspace_key(channel: &str) -> Option<&str> {
    channel.strip_prefix(KEYSPACE_PREFIX)
}

/// Background keyspace subscriber.
pub struct KeyspaceListener {
    task: BackgroundTask,
}

impl KeyspaceListener {
    /// Connect and start listening.
    ///
    /// The connection is opened before the thread starts so connection
    /// failures surface here.
    pub fn spawn(config: &ConnectionConfig, sender: EventSender) -> Result<Self> {
        let mut conn = connect(config)?;
        let store = config.to_string();

        let task = BackgroundTask::spawn("enn-keyspace", move |stop| {
            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.psubscribe(KEYSPACE_PATTERN) {
                warn!(error = %e, "Keyspace subscription failed");
                return;
            }
            if let Err(e) = pubsub.set_read_timeout(Some(READ_TIMEOUT)) {
                warn!(error = %e, "Could not set pubsub read timeout");
                return;
            }
            info!(store = %store, pattern = KEYSPACE_PATTERN, "Listening for key changes");

            while !stop.load(Ordering::SeqCst) {
                match pubsub.get_message() {
                    Ok(msg) => {
                        let channel = msg.get_channel_name();
                        let Some(key) = keyspace_key(channel) else {
                            continue;
                        };
                        trace!(key, "Key changed");
                        if sender.send(Event::KeyChanged(key.to_string())).is_err() {
                            debug!("Event queue closed, stopping keyspace listener");
                            break;
                        }
                    }
                    Err(e) if e.is_timeout() => {}
                    Err(e) => {
                        warn!(error = %e, "Keyspace listener lost its connection");
                        break;
                    }
                }
            }
            let _ = pubsub.punsubscribe(KEYSPACE_PATTERN);
        })?;

        Ok(Self { task })
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Unsubscribe and join the listener thread.
    pub fn stop(&mut self) {
        self.task.stop();
    }
}
