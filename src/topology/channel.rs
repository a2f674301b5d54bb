//! Channels: transmission media with a propagation delay.

use std::fmt;

use tracing::trace;

use crate::attribute::{AttributeRegistry, AttributeValue, Configurable, ObjectType};
use crate::error::{SimError, SimResult};
use crate::event::EventId;
use crate::packet::Packet;
use crate::scheduler::Scheduler;
use crate::simulation::Simulator;
use crate::time::{TimeDelta, VirtualTime};

use super::id::{ChannelId, DeviceId};

/// The medium variant of a channel and its devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MediumKind {
    /// Exactly two devices; each transmission reaches the single peer.
    PointToPoint,
    /// Shared bus; each transmission reaches every other device.
    Csma,
}

impl MediumKind {
    /// Maximum number of attached devices, `None` if unbounded.
    pub fn capacity(self) -> Option<usize> {
        match self {
            MediumKind::PointToPoint => Some(2),
            MediumKind::Csma => None,
        }
    }

    pub fn channel_type(self) -> ObjectType {
        match self {
            MediumKind::PointToPoint => ObjectType::PointToPointChannel,
            MediumKind::Csma => ObjectType::CsmaChannel,
        }
    }

    pub fn device_type(self) -> ObjectType {
        match self {
            MediumKind::PointToPoint => ObjectType::PointToPointNetDevice,
            MediumKind::Csma => ObjectType::CsmaNetDevice,
        }
    }
}

impl fmt::Display for MediumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediumKind::PointToPoint => f.write_str("point-to-point"),
            MediumKind::Csma => f.write_str("csma"),
        }
    }
}

/// Capability shared by every channel variant: read and override the
/// propagation delay without knowing the concrete medium.
pub trait DelayConfigurable {
    fn delay(&self) -> TimeDelta;
    fn set_delay(&mut self, delay: TimeDelta) -> SimResult<()>;
}

/// A transmission medium and the devices attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    id: ChannelId,
    kind: MediumKind,
    delay: TimeDelta,
    devices: Vec<DeviceId>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, kind: MediumKind, config: &AttributeRegistry) -> SimResult<Self> {
        Ok(Channel {
            id,
            kind,
            delay: config.default_of(kind.channel_type(), "Delay")?,
            devices: Vec::new(),
        })
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn kind(&self) -> MediumKind {
        self.kind
    }

    /// Attached devices in attach order.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn is_full(&self) -> bool {
        self.kind
            .capacity()
            .is_some_and(|cap| self.devices.len() >= cap)
    }

    /// Attach a device; returns its slot index.
    ///
    /// Fails with `CapacityExceeded` once the medium is full.
    pub(crate) fn attach(&mut self, device: DeviceId) -> SimResult<usize> {
        if let Some(capacity) = self.kind.capacity() {
            if self.devices.len() >= capacity {
                return Err(SimError::CapacityExceeded {
                    channel: self.id,
                    capacity,
                });
            }
        }
        self.devices.push(device);
        Ok(self.devices.len() - 1)
    }

    /// Every attached device except `from`.
    pub fn peers(&self, from: DeviceId) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().copied().filter(move |d| *d != from)
    }

    /// When a transmission finishing at `finish` reaches the peers.
    pub fn arrival(&self, finish: VirtualTime) -> SimResult<VirtualTime> {
        finish.checked_add(self.delay)
    }

    /// Schedule a "packet arrives" event on every peer of `from` at
    /// `finish + delay`.
    ///
    /// The delay is read now, so a later change to it leaves packets
    /// already in flight untouched.
    pub(crate) fn transmit(
        &self,
        scheduler: &mut Scheduler<Simulator>,
        from: DeviceId,
        packet: &Packet,
        finish: VirtualTime,
    ) -> SimResult<Vec<EventId>> {
        let arrival = self.arrival(finish)?;
        self.peers(from)
            .map(|to| {
                trace!(channel = %self.id, %from, %to, %arrival, "propagating");
                let packet = packet.clone();
                scheduler.schedule_at(arrival, move |sim: &mut Simulator| {
                    sim.deliver(from, to, packet)
                })
            })
            .collect()
    }
}

impl DelayConfigurable for Channel {
    fn delay(&self) -> TimeDelta {
        self.delay
    }

    fn set_delay(&mut self, delay: TimeDelta) -> SimResult<()> {
        AttributeValue::Time(delay).validate()?;
        self.delay = delay;
        Ok(())
    }
}

impl Configurable for Channel {
    fn object_type(&self) -> ObjectType {
        self.kind.channel_type()
    }

    fn attribute(&self, name: &str) -> SimResult<AttributeValue> {
        let spec = self.object_type().attribute(name)?;
        match spec.name {
            "Delay" => Ok(self.delay.into()),
            _ => Err(SimError::UnknownAttribute {
                type_name: self.object_type().name().to_string(),
                attribute: name.to_string(),
            }),
        }
    }

    fn set_attribute(&mut self, name: &str, value: AttributeValue) -> SimResult<()> {
        let spec = self.object_type().check(name, &value)?;
        match (spec.name, value) {
            ("Delay", AttributeValue::Time(delay)) => self.set_delay(delay),
            (_, value) => Err(SimError::TypeMismatch {
                attribute: format!("{}::{}", self.object_type(), name),
                expected: spec.kind,
                found: value.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(kind: MediumKind) -> Channel {
        Channel::new(ChannelId::new(0), kind, &AttributeRegistry::new()).unwrap()
    }

    #[test]
    fn test_point_to_point_capacity() {
        let mut ch = channel(MediumKind::PointToPoint);
        assert_eq!(ch.attach(DeviceId::new(0)).unwrap(), 0);
        assert_eq!(ch.attach(DeviceId::new(1)).unwrap(), 1);
        assert!(ch.is_full());
        assert_eq!(
            ch.attach(DeviceId::new(2)).unwrap_err(),
            SimError::CapacityExceeded {
                channel: ChannelId::new(0),
                capacity: 2
            }
        );
        assert_eq!(ch.devices().len(), 2);
    }

    #[test]
    fn test_csma_is_unbounded() {
        let mut ch = channel(MediumKind::Csma);
        for i in 0..16 {
            ch.attach(DeviceId::new(i)).unwrap();
        }
        assert!(!ch.is_full());
        let peers: Vec<_> = ch.peers(DeviceId::new(3)).collect();
        assert_eq!(peers.len(), 15);
        assert!(!peers.contains(&DeviceId::new(3)));
    }

    #[test]
    fn test_delay_from_registry_default() {
        let mut config = AttributeRegistry::new();
        config
            .set_default("PointToPointChannel", "Delay", TimeDelta::from_millis(2))
            .unwrap();
        let ch = Channel::new(ChannelId::new(0), MediumKind::PointToPoint, &config).unwrap();
        assert_eq!(ch.delay(), TimeDelta::from_millis(2));

        let csma = Channel::new(ChannelId::new(1), MediumKind::Csma, &config).unwrap();
        assert_eq!(csma.delay(), TimeDelta::ZERO);
    }

    #[test]
    fn test_configurable_delay() {
        let mut ch = channel(MediumKind::PointToPoint);
        ch.set_attribute_str("Delay", "5ms").unwrap();
        assert_eq!(ch.get::<TimeDelta>("Delay").unwrap(), TimeDelta::from_millis(5));
        assert!(matches!(
            ch.set_attribute("Delay", AttributeValue::UInteger(5)),
            Err(SimError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ch.set_attribute("DataRate", AttributeValue::UInteger(5)),
            Err(SimError::UnknownAttribute { .. })
        ));
        assert!(ch.set_delay(TimeDelta::from_nanos(-1)).is_err());
    }
}
