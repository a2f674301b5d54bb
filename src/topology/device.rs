//! Network devices: a node's interface onto a channel.

use std::fmt;
use std::net::Ipv4Addr;

use crate::attribute::{AttributeRegistry, AttributeValue, Configurable, ObjectType};
use crate::error::{SimError, SimResult};
use crate::packet::Packet;
use crate::rate::DataRate;
use crate::simulation::Simulator;
use crate::time::TimeDelta;

use super::channel::MediumKind;
use super::id::{ChannelId, DeviceId, NodeId};

/// Transmit state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceState {
    Idle,
    Transmitting,
}

/// Traffic counters of one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
}

/// An IPv4 address bound to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Ipv4Interface {
    pub device: DeviceId,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Interface {
    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(prefix_mask(self.prefix_len))
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & prefix_mask(self.prefix_len))
    }
}

impl fmt::Display for Ipv4Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} on {}", self.address, self.prefix_len, self.device)
    }
}

pub(crate) fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

/// A packet handed to a receive callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The receiving device.
    pub to: DeviceId,
    /// The sending device.
    pub from: DeviceId,
    pub packet: Packet,
}

/// Invoked on the receiving device when a packet arrives.
pub type ReceiveCallback = Box<dyn FnMut(&mut Simulator, &Delivery) -> SimResult<()>>;

/// Capability shared by every device variant: read and override the data
/// rate without knowing the concrete medium.
pub trait RateConfigurable {
    fn data_rate(&self) -> DataRate;
    fn set_data_rate(&mut self, rate: DataRate) -> SimResult<()>;
}

/// A network interface attached to one node and at most one channel.
pub struct Device {
    id: DeviceId,
    node: NodeId,
    /// Position in the owning node's device list.
    index: usize,
    kind: MediumKind,
    channel: Option<ChannelId>,
    data_rate: DataRate,
    mtu: u64,
    state: DeviceState,
    stats: DeviceStats,
    addresses: Vec<Ipv4Interface>,
    pub(crate) receive: Option<ReceiveCallback>,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        node: NodeId,
        index: usize,
        kind: MediumKind,
        config: &AttributeRegistry,
    ) -> SimResult<Self> {
        let object_type = kind.device_type();
        Ok(Device {
            id,
            node,
            index,
            kind,
            channel: None,
            data_rate: config.default_of(object_type, "DataRate")?,
            mtu: config.default_of(object_type, "Mtu")?,
            state: DeviceState::Idle,
            stats: DeviceStats::default(),
            addresses: Vec::new(),
            receive: None,
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Index within the owning node's device list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> MediumKind {
        self.kind
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn mtu(&self) -> u64 {
        self.mtu
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state == DeviceState::Transmitting
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn addresses(&self) -> &[Ipv4Interface] {
        &self.addresses
    }

    pub fn has_receive_callback(&self) -> bool {
        self.receive.is_some()
    }

    pub(crate) fn set_channel(&mut self, channel: ChannelId) {
        self.channel = Some(channel);
    }

    pub(crate) fn add_address(&mut self, interface: Ipv4Interface) {
        self.addresses.push(interface);
    }

    /// Check that `packet` can be sent now, without changing anything.
    ///
    /// Returns the channel it goes out on and its transmission time. The
    /// data rate is read now, so an override only affects sends started
    /// after it.
    pub(crate) fn check_transmission(&self, packet: &Packet) -> SimResult<(ChannelId, TimeDelta)> {
        if self.is_busy() {
            return Err(SimError::DeviceBusy(self.id));
        }
        let channel = self.channel.ok_or(SimError::DeviceNotAttached(self.id))?;
        if packet.size() as u64 > self.mtu {
            return Err(SimError::PacketTooLarge {
                device: self.id,
                size: packet.size(),
                mtu: self.mtu,
            });
        }
        Ok((channel, self.data_rate.tx_time(packet.size())?))
    }

    /// Idle → Transmitting for `packet`; returns the transmission time.
    pub(crate) fn begin_transmission(&mut self, packet: &Packet) -> SimResult<TimeDelta> {
        let (_, tx_time) = self.check_transmission(packet)?;
        self.state = DeviceState::Transmitting;
        self.stats.tx_packets += 1;
        self.stats.tx_bytes += packet.size() as u64;
        Ok(tx_time)
    }

    /// Transmitting → Idle.
    pub(crate) fn end_transmission(&mut self) {
        self.state = DeviceState::Idle;
    }

    pub(crate) fn record_reception(&mut self, packet: &Packet) {
        self.stats.rx_packets += 1;
        self.stats.rx_bytes += packet.size() as u64;
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("channel", &self.channel)
            .field("data_rate", &self.data_rate)
            .field("mtu", &self.mtu)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .field("addresses", &self.addresses)
            .field("receive", &self.receive.is_some())
            .finish()
    }
}

impl RateConfigurable for Device {
    fn data_rate(&self) -> DataRate {
        self.data_rate
    }

    fn set_data_rate(&mut self, rate: DataRate) -> SimResult<()> {
        AttributeValue::DataRate(rate).validate()?;
        self.data_rate = rate;
        Ok(())
    }
}

impl Configurable for Device {
    fn object_type(&self) -> ObjectType {
        self.kind.device_type()
    }

    fn attribute(&self, name: &str) -> SimResult<AttributeValue> {
        let spec = self.object_type().attribute(name)?;
        match spec.name {
            "DataRate" => Ok(self.data_rate.into()),
            "Mtu" => Ok(self.mtu.into()),
            _ => Err(SimError::UnknownAttribute {
                type_name: self.object_type().name().to_string(),
                attribute: name.to_string(),
            }),
        }
    }

    fn set_attribute(&mut self, name: &str, value: AttributeValue) -> SimResult<()> {
        let spec = self.object_type().check(name, &value)?;
        match (spec.name, value) {
            ("DataRate", AttributeValue::DataRate(rate)) => self.set_data_rate(rate),
            ("Mtu", AttributeValue::UInteger(mtu)) => {
                self.mtu = mtu;
                Ok(())
            }
            (_, value) => Err(SimError::TypeMismatch {
                attribute: format!("{}::{}", self.object_type(), name),
                expected: spec.kind,
                found: value.kind(),
            }),
        }
    }
}
