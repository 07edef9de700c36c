//! Netcomm primitives: the bridge between a net and its channels.

use std::sync::Arc;

use rpi_common::value::ValueType;
use tracing::warn;

use crate::error::{LinkError, NetError};
use crate::runtime::linker::LinkContext;
use crate::runtime::netcomm::{ChannelDirection, NetcommChannel};
use crate::runtime::port::PortIo;
use crate::runtime::registry::{Behavior, PrimitiveSpec};

/// `Core::NetcommIn` type name.
pub const NETCOMM_IN: &str = "Core::NetcommIn";
/// `Core::NetcommOut` type name.
pub const NETCOMM_OUT: &str = "Core::NetcommOut";
/// `Core::InterNetIn` type name.
pub const INTER_NET_IN: &str = "Core::InterNetIn";

fn channel_type(ctx: &LinkContext<'_>) -> Result<ValueType, LinkError> {
    let name = ctx.param_str("Type")?;
    name.parse::<ValueType>()
        .map_err(|e| ctx.invalid("Type", e.to_string()))
}

fn channel_key<'c>(ctx: &'c LinkContext<'_>) -> Result<&'c str, LinkError> {
    let key = ctx.param_str("Key")?;
    if key.is_empty() {
        return Err(ctx.invalid("Key", "must not be empty"));
    }
    Ok(key)
}

/// Publishes the latest externally written value of an inbound channel.
#[derive(Debug, Default)]
pub struct NetcommIn {
    channel: Option<Arc<NetcommChannel>>,
}

impl NetcommIn {
    fn create() -> Box<dyn Behavior> {
        Box::new(Self::default())
    }

    /// Declaration: parameters `Key`, `Type` → `outValue`, `outTimestamp`.
    pub fn spec() -> PrimitiveSpec {
        PrimitiveSpec::new(NETCOMM_IN, NetcommIn::create)
            .output("outValue", ValueType::Any)
            .output("outTimestamp", ValueType::Double)
            .param("Key", ValueType::String)
            .param_with_default("Type", ValueType::String, "double")
    }
}

impl Behavior for NetcommIn {
    fn check_parameters(&mut self, ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        let ty = channel_type(ctx)?;
        let key = channel_key(ctx)?.to_string();
        self.channel = Some(ctx.create_channel(&key, ty, ChannelDirection::Inbound)?);
        Ok(())
    }

    fn read_sensor(&mut self, io: &mut PortIo<'_>) {
        if let Some((value, ts)) = self.channel.as_ref().and_then(|c| c.latest()) {
            io.write_next(0, value);
            io.write_next(1, ts);
        }
    }

    fn update_data(&mut self, _io: &mut PortIo<'_>) {}
}

/// Writes its input to an outbound channel in the actuator phase.
///
/// Sources of a concrete type must match the channel `Type` at link time.
/// Values from `any` sources are checked per write; a rejected write keeps
/// the previous channel value and is logged once.
#[derive(Debug, Default)]
pub struct NetcommOut {
    channel: Option<Arc<NetcommChannel>>,
    warned: bool,
}

impl NetcommOut {
    fn create() -> Box<dyn Behavior> {
        Box::new(Self::default())
    }

    /// Declaration: `inValue`, parameters `Key`, `Type`.
    pub fn spec() -> PrimitiveSpec {
        PrimitiveSpec::new(NETCOMM_OUT, NetcommOut::create)
            .input("inValue", ValueType::Any)
            .param("Key", ValueType::String)
            .param_with_default("Type", ValueType::String, "double")
    }
}

impl Behavior for NetcommOut {
    fn check_parameters(&mut self, ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        let ty = channel_type(ctx)?;
        let key = channel_key(ctx)?.to_string();
        self.channel = Some(ctx.create_channel(&key, ty, ChannelDirection::Outbound)?);
        Ok(())
    }

    fn update_data(&mut self, _io: &mut PortIo<'_>) {}

    fn write_actuator(&mut self, io: &mut PortIo<'_>) {
        let (Some(channel), Some(value)) = (&self.channel, io.read(0)) else {
            return;
        };
        if let Err(e) = channel.write(value.clone(), io.info().time) {
            if !self.warned && !matches!(e, NetError::ChannelKilled(_)) {
                self.warned = true;
                warn!(channel = channel.key(), error = %e, "netcomm write rejected");
            }
        }
    }

    fn input_type(&self, index: usize) -> Option<ValueType> {
        self.channel
            .as_ref()
            .filter(|_| index == 0)
            .map(|c| c.value_type())
    }
}

/// Reads a predecessor net's channel, resolved once at link time.
#[derive(Debug, Default)]
pub struct InterNetIn {
    channel: Option<Arc<NetcommChannel>>,
}

impl InterNetIn {
    fn create() -> Box<dyn Behavior> {
        Box::new(Self::default())
    }

    /// Declaration: parameters `RemoteNet`, `RemoteKey` → `outValue`.
    pub fn spec() -> PrimitiveSpec {
        PrimitiveSpec::new(INTER_NET_IN, InterNetIn::create)
            .output("outValue", ValueType::Any)
            .param("RemoteNet", ValueType::String)
            .param("RemoteKey", ValueType::String)
    }
}

impl Behavior for InterNetIn {
    fn check_parameters(&mut self, ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        let net = ctx.param_str("RemoteNet")?.to_string();
        let key = ctx.param_str("RemoteKey")?.to_string();
        self.channel = Some(ctx.remote_channel(&net, &key)?);
        Ok(())
    }

    fn read_sensor(&mut self, io: &mut PortIo<'_>) {
        if let Some(value) = self.channel.as_ref().and_then(|c| c.value()) {
            io.write_next(0, value);
        }
    }

    fn update_data(&mut self, _io: &mut PortIo<'_>) {}
}
