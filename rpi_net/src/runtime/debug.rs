//! Fixed-capacity history buffers.
//!
//! Used by debug-tagged connections (one sample per cycle over a configured
//! time span) and by `Core::History`.

use rpi_common::consts::MAX_HISTORY_SAMPLES;
use rpi_common::value::Value;

use super::port::{InBinding, OutSlot};

/// Ring buffer with a capacity fixed at link time.
///
/// Pushing into a full buffer overwrites the oldest element; pushes never
/// allocate after construction.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    head: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding up to `capacity` (at least 1) elements.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append, evicting the oldest element when full.
    pub fn push(&mut self, item: T) {
        if self.buf.len() < self.capacity {
            self.buf.push(item);
        } else {
            self.buf[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Element `offset` steps back from the newest (0 = newest).
    pub fn back(&self, offset: usize) -> Option<&T> {
        let len = self.buf.len();
        if offset >= len {
            return None;
        }
        // Index of the newest element is one before `head` once full.
        let newest = (self.head + len - 1) % len;
        self.buf.get((newest + len - offset) % len)
    }

    /// Elements from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (tail, front) = self.buf.split_at(self.head);
        front.iter().chain(tail.iter())
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Samples needed to cover `span` seconds at one sample per cycle.
///
/// Rejects spans that are not positive and finite, and spans needing more
/// than [`MAX_HISTORY_SAMPLES`].
pub fn span_samples(span: f64, cycle_time: f64) -> Result<usize, String> {
    if !(span.is_finite() && span > 0.0) {
        return Err(format!("{span} is not a positive number of seconds"));
    }
    let samples = (span / cycle_time).ceil();
    if samples > MAX_HISTORY_SAMPLES as f64 {
        return Err(format!(
            "{span} s needs {samples} samples, at most {MAX_HISTORY_SAMPLES} are kept"
        ));
    }
    Ok((samples as usize).max(1))
}

/// Offset back from the newest sample (0 = newest) for a lookup `age`
/// seconds into a history spanning `max_age` seconds with `len` samples.
///
/// The sample index counted from the newest (1 = newest) is
/// `floor(age / max_age · (len − 1)) + 1` with the ratio clamped to `[0, 1]`:
/// `age <= 0` yields the newest sample and `age >= max_age` the oldest.
pub fn history_offset(len: usize, age: f64, max_age: f64) -> Option<usize> {
    if len == 0 || age.is_nan() {
        return None;
    }
    if max_age <= 0.0 {
        return Some(0);
    }
    let ratio = (age / max_age).clamp(0.0, 1.0);
    let index = (ratio * (len - 1) as f64).floor() as usize + 1;
    Some(index.clamp(1, len) - 1)
}

/// Samples one in-port every cycle for debugging.
#[derive(Debug, Clone)]
pub struct DebugProbe {
    port: String,
    binding: InBinding,
    samples: RingBuffer<(f64, Option<Value>)>,
}

impl DebugProbe {
    pub(crate) fn new(port: String, binding: InBinding, capacity: usize) -> Self {
        Self {
            port,
            binding,
            samples: RingBuffer::new(capacity),
        }
    }

    /// Path of the sampled in-port (`root/prim.port`).
    pub fn port(&self) -> &str {
        &self.port
    }

    /// `(net time, value)` samples, oldest first.
    pub fn samples(&self) -> &RingBuffer<(f64, Option<Value>)> {
        &self.samples
    }

    pub(crate) fn sample(&mut self, slots: &[OutSlot], cycle: u64, time: f64) {
        let value = self.binding.resolve(slots, cycle).cloned();
        self.samples.push((time, value));
    }
}
