//! Installers that create a channel, attach one device per node and apply
//! helper-level attribute overrides.
//!
//! Helper attributes are applied to each created object as instance
//! overrides, so they win over registry defaults. String values are parsed
//! by the attribute's declared kind (`"100Mbps"` for a `DataRate`).

use tracing::debug;

use crate::attribute::{AttributeKind, AttributeValue, Configurable, ObjectType};
use crate::error::{SimError, SimResult};
use crate::simulation::Simulator;

use super::channel::MediumKind;
use super::id::{ChannelId, DeviceId, NodeId};

/// Devices created by one install, in node order, plus their channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub channel: ChannelId,
    pub devices: Vec<DeviceId>,
}

impl Installed {
    pub fn device(&self, i: usize) -> Option<DeviceId> {
        self.devices.get(i).copied()
    }
}

#[derive(Debug, Clone, Default)]
struct HelperAttributes {
    device: Vec<(String, AttributeValue)>,
    channel: Vec<(String, AttributeValue)>,
}

impl HelperAttributes {
    fn push(
        list: &mut Vec<(String, AttributeValue)>,
        object_type: ObjectType,
        name: &str,
        value: AttributeValue,
    ) -> SimResult<()> {
        let spec = object_type.attribute(name)?;
        let value = match value {
            AttributeValue::String(text) if spec.kind != AttributeKind::String => {
                AttributeValue::parse(spec.kind, &text)?
            }
            value => value,
        };
        // `install` applies these after creating objects; they must not fail there.
        object_type.check(name, &value)?;
        list.retain(|(n, _)| n != name);
        list.push((name.to_string(), value));
        Ok(())
    }

    fn install(&self, sim: &mut Simulator, kind: MediumKind, nodes: &[NodeId]) -> SimResult<Installed> {
        for node in nodes {
            sim.node(*node)?;
        }
        if let Some(capacity) = kind.capacity() {
            if nodes.len() > capacity {
                return Err(SimError::CapacityExceeded {
                    channel: ChannelId::new(sim.channels().len()),
                    capacity,
                });
            }
        }

        let channel = sim.create_channel(kind)?;
        for (name, value) in &self.channel {
            sim.channel_mut(channel)?.set_attribute(name, value.clone())?;
        }
        let mut devices = Vec::with_capacity(nodes.len());
        for node in nodes {
            let device = sim.attach_device(*node, channel)?;
            for (name, value) in &self.device {
                sim.device_mut(device)?.set_attribute(name, value.clone())?;
            }
            devices.push(device);
        }
        debug!(%channel, %kind, devices = devices.len(), "installed");
        Ok(Installed { channel, devices })
    }
}

/// Builds point-to-point links between pairs of nodes.
#[derive(Debug, Clone, Default)]
pub struct PointToPointHelper {
    attributes: HelperAttributes,
}

impl PointToPointHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_device_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> SimResult<&mut Self> {
        HelperAttributes::push(
            &mut self.attributes.device,
            ObjectType::PointToPointNetDevice,
            name,
            value.into(),
        )?;
        Ok(self)
    }

    pub fn set_channel_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> SimResult<&mut Self> {
        HelperAttributes::push(
            &mut self.attributes.channel,
            ObjectType::PointToPointChannel,
            name,
            value.into(),
        )?;
        Ok(self)
    }

    /// Link `a` and `b` with a new channel; devices are returned `[a, b]`.
    pub fn install(&self, sim: &mut Simulator, a: NodeId, b: NodeId) -> SimResult<Installed> {
        self.attributes.install(sim, MediumKind::PointToPoint, &[a, b])
    }

    /// Install over an explicit node list; more than two nodes fails with
    /// `CapacityExceeded` before anything is created.
    pub fn install_all(&self, sim: &mut Simulator, nodes: &[NodeId]) -> SimResult<Installed> {
        self.attributes.install(sim, MediumKind::PointToPoint, nodes)
    }
}

/// Builds a shared CSMA segment over any number of nodes.
#[derive(Debug, Clone, Default)]
pub struct CsmaHelper {
    attributes: HelperAttributes,
}

impl CsmaHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_device_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> SimResult<&mut Self> {
        HelperAttributes::push(
            &mut self.attributes.device,
            ObjectType::CsmaNetDevice,
            name,
            value.into(),
        )?;
        Ok(self)
    }

    pub fn set_channel_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> SimResult<&mut Self> {
        HelperAttributes::push(
            &mut self.attributes.channel,
            ObjectType::CsmaChannel,
            name,
            value.into(),
        )?;
        Ok(self)
    }

    pub fn install(&self, sim: &mut Simulator, nodes: &[NodeId]) -> SimResult<Installed> {
        self.attributes.install(sim, MediumKind::Csma, nodes)
    }
}
