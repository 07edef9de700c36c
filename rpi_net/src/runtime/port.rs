//! Runtime port storage and the per-phase I/O view handed to behaviors.
//!
//! Every leaf out-port of a linked net owns one [`OutSlot`] in the net's slot
//! arena. In-ports are [`InBinding`]s: a handle to the feeding slot plus an
//! optional parameter fallback. A slot remembers the cycle in which it was
//! written, and reads only see values written in the reader's current cycle.

use rpi_common::value::Value;

/// Handle of an out-port slot in a net's slot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) usize);

/// Value storage of one leaf out-port.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutSlot {
    pub(crate) value: Option<Value>,
    /// Cycle the value is valid in.
    pub(crate) cycle: u64,
}

impl OutSlot {
    /// Value if it was written for `cycle`.
    #[inline]
    pub(crate) fn fresh(&self, cycle: u64) -> Option<&Value> {
        if self.cycle == cycle {
            self.value.as_ref()
        } else {
            None
        }
    }
}

/// Resolved in-port of a linked primitive.
#[derive(Debug, Clone, Default)]
pub(crate) struct InBinding {
    pub(crate) source: Option<SlotId>,
    /// Parameter default used when the source is absent or stale.
    pub(crate) fallback: Option<Value>,
}

impl InBinding {
    #[inline]
    pub(crate) fn resolve<'a>(&'a self, slots: &'a [OutSlot], cycle: u64) -> Option<&'a Value> {
        self.source
            .and_then(|s| slots[s.0].fresh(cycle))
            .or(self.fallback.as_ref())
    }
}

/// Timing context of the phase being executed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleInfo {
    /// Net cycle counter. Zero before the first `update_data`.
    pub cycle: u64,
    /// Logical net time [s].
    pub time: f64,
    /// Fixed cycle time [s].
    pub cycle_time: f64,
    /// Whether `cancel()` was requested for the net.
    pub cancel_requested: bool,
}

/// Port access for one primitive during one phase.
///
/// In-ports and out-ports are addressed by their index in the primitive
/// type's declaration order.
pub struct PortIo<'a> {
    slots: &'a mut [OutSlot],
    inputs: &'a [InBinding],
    outputs: &'a [SlotId],
    info: CycleInfo,
}

impl<'a> PortIo<'a> {
    pub(crate) fn new(
        slots: &'a mut [OutSlot],
        inputs: &'a [InBinding],
        outputs: &'a [SlotId],
        info: CycleInfo,
    ) -> Self {
        Self {
            slots,
            inputs,
            outputs,
            info,
        }
    }

    /// Timing of the current phase.
    pub fn info(&self) -> &CycleInfo {
        &self.info
    }

    /// Value of in-port `input` for the current cycle.
    ///
    /// Returns the parameter fallback when the source is unconnected, absent
    /// or was written in another cycle; `None` if there is no fallback.
    #[inline]
    pub fn read(&self, input: usize) -> Option<&Value> {
        self.inputs
            .get(input)
            .and_then(|b| b.resolve(self.slots, self.info.cycle))
    }

    /// Numeric view of [`read`](Self::read).
    pub fn read_f64(&self, input: usize) -> Option<f64> {
        self.read(input).and_then(Value::as_f64)
    }

    /// Boolean view of [`read`](Self::read).
    pub fn read_bool(&self, input: usize) -> Option<bool> {
        self.read(input).and_then(Value::as_bool)
    }

    /// Write out-port `output`, valid for the current cycle.
    #[inline]
    pub fn write(&mut self, output: usize, value: impl Into<Value>) {
        let cycle = self.info.cycle;
        self.store(output, Some(value.into()), cycle);
    }

    /// Write out-port `output`, valid from the next cycle on.
    ///
    /// Used in `read_sensor`, which runs before the cycle counter advances.
    pub fn write_next(&mut self, output: usize, value: impl Into<Value>) {
        let cycle = self.info.cycle + 1;
        self.store(output, Some(value.into()), cycle);
    }

    /// Mark out-port `output` absent for the current cycle.
    pub fn clear(&mut self, output: usize) {
        let cycle = self.info.cycle;
        self.store(output, None, cycle);
    }

    fn store(&mut self, output: usize, value: Option<Value>, cycle: u64) {
        if let Some(slot) = self.outputs.get(output) {
            let s = &mut self.slots[slot.0];
            s.value = value;
            s.cycle = cycle;
        }
    }
}
