//! Engine-defined dataflow primitives: one-cycle delay, constants, the
//! cancel flag and time-indexed history.

use rpi_common::value::{Value, ValueType};

use crate::error::LinkError;
use crate::runtime::debug::{history_offset, span_samples, RingBuffer};
use crate::runtime::linker::LinkContext;
use crate::runtime::port::PortIo;
use crate::runtime::registry::{Behavior, PrimitiveSpec};

/// `Core::Pre` type name.
pub const PRE: &str = "Core::Pre";
/// `Core::Constant` type name.
pub const CONSTANT: &str = "Core::Constant";
/// `Core::Cancel` type name.
pub const CANCEL: &str = "Core::Cancel";
/// `Core::History` type name.
pub const HISTORY: &str = "Core::History";

// ─── Pre ────────────────────────────────────────────────────────────

/// Republishes the previous cycle's input.
#[derive(Debug, Default)]
pub struct Pre {
    snapshot: Option<Value>,
}

impl Pre {
    fn create() -> Box<dyn Behavior> {
        Box::new(Self::default())
    }

    /// Declaration: `inValue` → `outValue`.
    pub fn spec() -> PrimitiveSpec {
        PrimitiveSpec::new(PRE, Pre::create)
            .input("inValue", ValueType::Any)
            .output("outValue", ValueType::Any)
    }
}

impl Behavior for Pre {
    fn update_data(&mut self, io: &mut PortIo<'_>) {
        if let Some(value) = self.snapshot.take() {
            io.write(0, value);
        }
    }

    // Sampled after every update of this cycle. Sensor primitives of the
    // next cycle already stamp their slots ahead, so read_sensor is too late.
    fn write_actuator(&mut self, io: &mut PortIo<'_>) {
        self.snapshot = io.read(0).cloned();
    }

    fn delays_input(&self) -> bool {
        true
    }
}

// ─── Constant ───────────────────────────────────────────────────────

/// Emits parameter `Value` every cycle.
#[derive(Debug, Default)]
pub struct Constant {
    value: Option<Value>,
}

impl Constant {
    fn create() -> Box<dyn Behavior> {
        Box::new(Self::default())
    }

    /// Declaration: parameter `Value` → `outValue`.
    pub fn spec() -> PrimitiveSpec {
        PrimitiveSpec::new(CONSTANT, Constant::create)
            .output("outValue", ValueType::Any)
            .param("Value", ValueType::Any)
    }
}

impl Behavior for Constant {
    fn check_parameters(&mut self, ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        self.value = ctx.param("Value").cloned();
        Ok(())
    }

    fn update_data(&mut self, io: &mut PortIo<'_>) {
        if let Some(value) = &self.value {
            io.write(0, value.clone());
        }
    }
}

// ─── Cancel ─────────────────────────────────────────────────────────

/// Exposes whether the net was asked to cancel.
#[derive(Debug, Default)]
pub struct Cancel;

impl Cancel {
    fn create() -> Box<dyn Behavior> {
        Box::new(Self)
    }

    /// Declaration: `outCancel`.
    pub fn spec() -> PrimitiveSpec {
        PrimitiveSpec::new(CANCEL, Cancel::create).output("outCancel", ValueType::Bool)
    }
}

impl Behavior for Cancel {
    fn update_data(&mut self, io: &mut PortIo<'_>) {
        let cancel = io.info().cancel_requested;
        io.write(0, cancel);
    }
}

// ─── History ────────────────────────────────────────────────────────

/// Returns the input as it was `inAge` seconds ago.
///
/// Keeps one sample per cycle over `MaxAge` seconds. The lookup rounds
/// through [`history_offset`]: ages at or below zero give the current
/// sample, ages at or beyond `MaxAge` the oldest one kept.
#[derive(Debug)]
pub struct History {
    max_age: f64,
    samples: RingBuffer<Value>,
}

impl Default for History {
    fn default() -> Self {
        Self {
            max_age: 0.0,
            samples: RingBuffer::new(1),
        }
    }
}

impl History {
    fn create() -> Box<dyn Behavior> {
        Box::new(Self::default())
    }

    /// Declaration: `inValue`, `inAge` (falls back to `Age`) → `outValue`.
    pub fn spec() -> PrimitiveSpec {
        PrimitiveSpec::new(HISTORY, History::create)
            .input("inValue", ValueType::Any)
            .input_with_fallback("inAge", ValueType::Double, "Age")
            .output("outValue", ValueType::Any)
            .param("MaxAge", ValueType::Double)
            .param_with_default("Age", ValueType::Double, 0.0)
    }
}

impl Behavior for History {
    fn check_parameters(&mut self, ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        let max_age = ctx.param_f64("MaxAge")?;
        let capacity = span_samples(max_age, ctx.cycle_time())
            .map_err(|reason| ctx.invalid("MaxAge", reason))?
            + 1;
        self.max_age = max_age;
        self.samples = RingBuffer::new(capacity);
        Ok(())
    }

    fn update_data(&mut self, io: &mut PortIo<'_>) {
        if let Some(value) = io.read(0) {
            self.samples.push(value.clone());
        }
        let age = io.read_f64(1).unwrap_or(0.0);
        let sample = history_offset(self.samples.len(), age, self.max_age)
            .and_then(|offset| self.samples.back(offset))
            .cloned();
        if let Some(value) = sample {
            io.write(0, value);
        }
    }
}
