//! Netcomm channels.
//!
//! A netcomm channel is a named, typed mailbox holding the latest value and
//! its timestamp. Inbound channels are written by external callers and read
//! by `Core::NetcommIn`; outbound channels are written by `Core::NetcommOut`
//! and reported to listeners, or read directly by a successor net's
//! `Core::InterNetIn`.
//!
//! ## Reporting
//!
//! [`NetcommReporter`] is polled after every cycle. At most once per report
//! interval (net logical time) it collects outbound channels whose value
//! changed since the last delivered batch and submits one job to the
//! notification executor: every listener receives all `value_changed` calls
//! of the batch, then exactly one `update_performed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rpi_common::value::{Value, ValueType};
use tracing::{debug, warn};

use crate::error::NetError;

use super::net::NetControl;

/// Who writes a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDirection {
    /// Written from outside the net.
    Inbound,
    /// Written by the net.
    Outbound,
}

/// Latest-value mailbox.
#[derive(Debug)]
pub struct NetcommChannel {
    key: String,
    ty: ValueType,
    direction: ChannelDirection,
    latest: Mutex<Option<(Value, f64)>>,
    killed: AtomicBool,
}

impl NetcommChannel {
    /// Create an empty channel.
    pub fn new(key: &str, ty: ValueType, direction: ChannelDirection) -> Self {
        Self {
            key: key.to_string(),
            ty,
            direction,
            latest: Mutex::new(None),
            killed: AtomicBool::new(false),
        }
    }

    /// Channel key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    /// Direction.
    pub fn direction(&self) -> ChannelDirection {
        self.direction
    }

    /// Store a value with its timestamp [s].
    ///
    /// # Errors
    /// `ChannelKilled` once the owning net is unloaded, `Value` on a type
    /// mismatch.
    pub fn write(&self, value: Value, timestamp: f64) -> Result<(), NetError> {
        if self.is_killed() {
            return Err(NetError::ChannelKilled(self.key.clone()));
        }
        self.ty.check(&value)?;
        *self.latest.lock() = Some((value, timestamp));
        Ok(())
    }

    /// Parse the canonical string encoding and store it.
    pub fn write_encoded(&self, encoded: &str, timestamp: f64) -> Result<(), NetError> {
        let value = Value::parse(self.ty, encoded)?;
        self.write(value, timestamp)
    }

    /// Latest value and timestamp. Still readable after the channel is killed.
    pub fn latest(&self) -> Option<(Value, f64)> {
        self.latest.lock().clone()
    }

    /// Latest value only.
    pub fn value(&self) -> Option<Value> {
        self.latest.lock().as_ref().map(|(v, _)| v.clone())
    }

    /// Refuse further writes.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    /// Whether the channel was killed.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

/// Key → channel map of one net.
///
/// Cloning shares the channels: a successor linked against a clone holds the
/// very same channel objects.
#[derive(Debug, Clone, Default)]
pub struct NetcommTable {
    channels: HashMap<String, Arc<NetcommChannel>>,
}

impl NetcommTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and insert a channel. Returns `None` if the key is taken.
    pub fn create(
        &mut self,
        key: &str,
        ty: ValueType,
        direction: ChannelDirection,
    ) -> Option<Arc<NetcommChannel>> {
        if self.channels.contains_key(key) {
            return None;
        }
        let channel = Arc::new(NetcommChannel::new(key, ty, direction));
        self.channels.insert(key.to_string(), Arc::clone(&channel));
        Some(channel)
    }

    /// Channel by key.
    pub fn get(&self, key: &str) -> Option<&Arc<NetcommChannel>> {
        self.channels.get(key)
    }

    /// Channel keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Outbound channels sorted by key.
    pub(crate) fn outbound(&self) -> Vec<Arc<NetcommChannel>> {
        let mut out: Vec<_> = self
            .channels
            .values()
            .filter(|c| c.direction == ChannelDirection::Outbound)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Kill every channel.
    pub fn kill_all(&self) {
        for channel in self.channels.values() {
            channel.kill();
        }
    }
}

/// Rate-limited, change-detecting netcomm reporter of one net.
#[derive(Debug)]
pub(crate) struct NetcommReporter {
    channels: Vec<Arc<NetcommChannel>>,
    interval: f64,
    last_poll: Option<f64>,
    last_sent: HashMap<String, Value>,
}

impl NetcommReporter {
    pub(crate) fn new(table: &NetcommTable, interval: f64) -> Self {
        Self {
            channels: table.outbound(),
            interval,
            last_poll: None,
            last_sent: HashMap::new(),
        }
    }

    /// Report changed outbound values if the interval elapsed (or `force`).
    pub(crate) fn poll(&mut self, time: f64, control: &NetControl, force: bool) {
        if self.channels.is_empty() {
            return;
        }
        if !force {
            if let Some(last) = self.last_poll {
                if time - last < self.interval {
                    return;
                }
            }
        }
        self.last_poll = Some(time);

        let changes: Vec<(String, Value, f64)> = self
            .channels
            .iter()
            .filter_map(|c| {
                let (value, ts) = c.latest()?;
                (self.last_sent.get(c.key()) != Some(&value))
                    .then(|| (c.key().to_string(), value, ts))
            })
            .collect();
        if changes.is_empty() {
            return;
        }

        let listeners = control.listeners();
        if listeners.is_empty() {
            self.remember(changes);
            return;
        }

        let net = control.id_arc();
        let batch = changes.clone();
        let count = batch.len();
        let submitted = control.executor().submit(move || {
            for listener in &listeners {
                for (key, value, ts) in &batch {
                    listener.value_changed(&net, key, value, *ts);
                }
                listener.update_performed(&net);
            }
        });
        if submitted {
            debug!(net = control.id(), changes = count, "netcomm batch submitted");
            self.remember(changes);
        } else {
            warn!(net = control.id(), changes = count, "notification queue full, netcomm batch dropped");
        }
    }

    fn remember(&mut self, changes: Vec<(String, Value, f64)>) {
        for (key, value, _) in changes {
            self.last_sent.insert(key, value);
        }
    }
}
