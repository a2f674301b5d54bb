//! The simulator: owner of the clock, the topology and the configuration.
//!
//! Every piece of simulation state lives in one `Simulator` value and is
//! reached through `&mut self`; event actions receive that same `&mut`
//! from the run loop. Execution is single-threaded. Exactly one action
//! runs at a time, and "waiting" is always a scheduled future event.

use tracing::{debug, info, trace};

use crate::attribute::{AttributeRegistry, AttributeType, AttributeValue, Configurable};
use crate::config::ConfigPath;
use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId};
use crate::packet::Packet;
use crate::scheduler::{self, EventContext, Scheduler};
use crate::time::{TimeDelta, VirtualTime};
use crate::trace::{self as devtrace, TraceEntry, TraceKind};
use crate::topology::{Channel, ChannelId, Delivery, Device, DeviceId, MediumKind, Node, NodeId};

/// An object a configuration path resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Device(DeviceId),
    Channel(ChannelId),
}

/// Top-level simulation driver and topology owner.
pub struct Simulator {
    scheduler: Scheduler<Simulator>,
    config: AttributeRegistry,
    nodes: Vec<Node>,
    devices: Vec<Device>,
    channels: Vec<Channel>,
    trace: Vec<TraceEntry>,
}

impl EventContext for Simulator {
    fn scheduler(&self) -> &Scheduler<Self> {
        &self.scheduler
    }

    fn scheduler_mut(&mut self) -> &mut Scheduler<Self> {
        &mut self.scheduler
    }
}

impl Simulator {
    /// Create a simulator at time zero with the given configuration
    /// context.
    pub fn new(config: AttributeRegistry) -> Self {
        Simulator {
            scheduler: Scheduler::new(),
            config,
            nodes: Vec::new(),
            devices: Vec::new(),
            channels: Vec::new(),
            trace: Vec::new(),
        }
    }

    // ── Configuration context ─────────────────────────────────────

    pub fn config(&self) -> &AttributeRegistry {
        &self.config
    }

    /// Adjust type defaults; only objects created afterwards see the change.
    pub fn config_mut(&mut self) -> &mut AttributeRegistry {
        &mut self.config
    }

    // ── Clock and scheduling ──────────────────────────────────────

    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.scheduler.now()
    }

    /// Schedule `action` `delay` from now. Negative delays fail with
    /// `InvalidDelay`.
    pub fn schedule<F>(&mut self, delay: TimeDelta, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) -> SimResult<()> + 'static,
    {
        self.scheduler.schedule(delay, action)
    }

    pub fn schedule_now<F>(&mut self, action: F) -> EventId
    where
        F: FnOnce(&mut Simulator) -> SimResult<()> + 'static,
    {
        self.scheduler.schedule_now(action)
    }

    pub fn schedule_at<F>(&mut self, at: VirtualTime, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Simulator) -> SimResult<()> + 'static,
    {
        self.scheduler.schedule_at(at, action)
    }

    /// Run `action` once, at the next `destroy`.
    pub fn schedule_destroy<F>(&mut self, action: F) -> EventId
    where
        F: FnOnce(&mut Simulator) -> SimResult<()> + 'static,
    {
        self.scheduler.schedule_destroy(action)
    }

    /// Make a pending event inert; `false` if it already ran.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.scheduler.is_pending(id)
    }

    pub fn delay_left(&self, id: EventId) -> Option<TimeDelta> {
        self.scheduler.delay_left(id)
    }

    /// Stop the current run before the next event.
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    /// Schedule a stop `delay` from now.
    pub fn stop_after(&mut self, delay: TimeDelta) -> SimResult<EventId> {
        self.scheduler.schedule(delay, |sim: &mut Simulator| {
            sim.stop();
            Ok(())
        })
    }

    pub fn events_processed(&self) -> u64 {
        self.scheduler.events_processed()
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    /// Run until the queue is empty or `stop` is called.
    ///
    /// An error returned by any action aborts the run and is returned.
    pub fn run(&mut self) -> SimResult<u64> {
        info!(now = %self.now(), pending = self.pending_count(), "run start");
        let processed = scheduler::run(self)?;
        info!(now = %self.now(), processed, "run end");
        Ok(processed)
    }

    /// Run every event at or before `limit`.
    pub fn run_until(&mut self, limit: VirtualTime) -> SimResult<u64> {
        scheduler::run_until(self, limit)
    }

    /// Execute exactly one event.
    pub fn step(&mut self) -> SimResult<Option<Event>> {
        scheduler::step(self)
    }

    /// End the current run: run destroy actions, release all pending
    /// events, rewind the clock to zero and return every device to idle.
    ///
    /// Topology, configuration defaults and the trace survive, so building
    /// may continue and `run` may be called again.
    pub fn destroy(&mut self) -> SimResult<()> {
        scheduler::destroy(self)?;
        for device in &mut self.devices {
            device.end_transmission();
        }
        debug!(
            nodes = self.nodes.len(),
            devices = self.devices.len(),
            channels = self.channels.len(),
            "simulator destroyed, topology kept"
        );
        Ok(())
    }

    // ── Topology ──────────────────────────────────────────────────

    pub fn create_node(&mut self) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::new(id));
        debug!(node = %id, "node created");
        id
    }

    pub fn create_nodes(&mut self, count: usize) -> Vec<NodeId> {
        (0..count).map(|_| self.create_node()).collect()
    }

    /// Create a channel whose attributes are the current type defaults.
    pub fn create_channel(&mut self, kind: MediumKind) -> SimResult<ChannelId> {
        let id = ChannelId::new(self.channels.len());
        let channel = Channel::new(id, kind, &self.config)?;
        self.channels.push(channel);
        debug!(channel = %id, %kind, "channel created");
        Ok(id)
    }

    /// Create a device on `node` and attach it to `channel`.
    ///
    /// The device takes the current type defaults for the channel's
    /// medium. Fails with `CapacityExceeded` without creating anything
    /// when the channel is full.
    pub fn attach_device(&mut self, node: NodeId, channel: ChannelId) -> SimResult<DeviceId> {
        let node_ref = self.nodes.get(node.index()).ok_or(SimError::UnknownNode(node))?;
        let channel_ref = self
            .channels
            .get(channel.index())
            .ok_or(SimError::UnknownChannel(channel))?;
        if let Some(capacity) = channel_ref.kind().capacity() {
            if channel_ref.is_full() {
                return Err(SimError::CapacityExceeded { channel, capacity });
            }
        }

        let id = DeviceId::new(self.devices.len());
        let index = node_ref.devices().len();
        let mut device = Device::new(id, node, index, channel_ref.kind(), &self.config)?;
        self.channels[channel.index()].attach(id)?;
        device.set_channel(channel);
        self.nodes[node.index()].add_device(id);
        self.devices.push(device);
        debug!(device = %id, %node, %channel, index, "device attached");
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> SimResult<&Node> {
        self.nodes.get(id.index()).ok_or(SimError::UnknownNode(id))
    }

    pub fn device(&self, id: DeviceId) -> SimResult<&Device> {
        self.devices.get(id.index()).ok_or(SimError::UnknownDevice(id))
    }

    pub fn device_mut(&mut self, id: DeviceId) -> SimResult<&mut Device> {
        self.devices.get_mut(id.index()).ok_or(SimError::UnknownDevice(id))
    }

    pub fn channel(&self, id: ChannelId) -> SimResult<&Channel> {
        self.channels.get(id.index()).ok_or(SimError::UnknownChannel(id))
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> SimResult<&mut Channel> {
        self.channels
            .get_mut(id.index())
            .ok_or(SimError::UnknownChannel(id))
    }

    /// The `index`-th device of `node`.
    pub fn device_at(&self, node: NodeId, index: usize) -> SimResult<DeviceId> {
        self.node(node)?
            .device(index)
            .ok_or_else(|| SimError::UnknownPath(ConfigPath::device(node.index(), index).to_string()))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Register the callback invoked when a packet arrives at `device`,
    /// replacing any previous one.
    pub fn set_receive_callback<F>(&mut self, device: DeviceId, callback: F) -> SimResult<()>
    where
        F: FnMut(&mut Simulator, &Delivery) -> SimResult<()> + 'static,
    {
        self.device_mut(device)?.receive = Some(Box::new(callback));
        Ok(())
    }

    // ── Traffic ───────────────────────────────────────────────────

    /// Start transmitting `packet` on `device`.
    ///
    /// Schedules the device's "transmission complete" at `now + tx` and
    /// hands the packet to the channel with that finish time. Returns the
    /// handle of the completion event. Fails with `DeviceBusy` while a
    /// previous transmission is in progress.
    pub fn send(&mut self, device: DeviceId, packet: Packet) -> SimResult<EventId> {
        let now = self.now();
        // Every fallible step runs before the device or queue is touched.
        let (channel, tx_time) = self.device(device)?.check_transmission(&packet)?;
        let finish = now.checked_add(tx_time)?;
        self.channel(channel)?.arrival(finish)?;

        self.device_mut(device)?.begin_transmission(&packet)?;
        trace!(%device, size = packet.size(), %tx_time, "tx start");
        self.record(device, TraceKind::TxStart, packet.size());

        let size = packet.size();
        let done = self
            .scheduler
            .schedule_at(finish, move |sim: &mut Simulator| {
                sim.complete_transmission(device, size)
            })?;
        let channel = self
            .channels
            .get(channel.index())
            .ok_or(SimError::UnknownChannel(channel))?;
        channel.transmit(&mut self.scheduler, device, &packet, finish)?;
        Ok(done)
    }

    fn complete_transmission(&mut self, device: DeviceId, size: usize) -> SimResult<()> {
        self.device_mut(device)?.end_transmission();
        trace!(%device, size, "tx complete");
        self.record(device, TraceKind::TxComplete, size);
        Ok(())
    }

    /// "Packet arrives" on `to`: count it, trace it, invoke the receive
    /// callback if any.
    pub(crate) fn deliver(&mut self, from: DeviceId, to: DeviceId, packet: Packet) -> SimResult<()> {
        let device = self.device_mut(to)?;
        device.record_reception(&packet);
        let callback = device.receive.take();
        trace!(%from, %to, size = packet.size(), "rx");
        self.record(to, TraceKind::Rx { from }, packet.size());

        let Some(mut callback) = callback else {
            return Ok(());
        };
        let delivery = Delivery { to, from, packet };
        let result = callback(self, &delivery);
        // Keep a callback the handler installed for itself.
        let device = self.device_mut(to)?;
        if device.receive.is_none() {
            device.receive = Some(callback);
        }
        result
    }

    // ── Path-based attribute access ───────────────────────────────

    fn resolve(&self, path: &ConfigPath) -> Vec<Target> {
        match *path {
            ConfigPath::Device { node, device, .. } => self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| node.matches(*i))
                .flat_map(|(_, n)| {
                    n.devices()
                        .iter()
                        .enumerate()
                        .filter(move |(j, _)| device.matches(*j))
                        .map(|(_, d)| *d)
                })
                .filter(|d| path.admits(self.devices[d.index()].object_type()))
                .map(Target::Device)
                .collect(),
            ConfigPath::Channel { channel, .. } => self
                .channels
                .iter()
                .filter(|c| channel.matches(c.id().index()) && path.admits(c.object_type()))
                .map(|c| Target::Channel(c.id()))
                .collect(),
        }
    }

    fn target(&self, target: Target) -> &dyn Configurable {
        match target {
            Target::Device(d) => &self.devices[d.index()],
            Target::Channel(c) => &self.channels[c.index()],
        }
    }

    fn target_mut(&mut self, target: Target) -> &mut dyn Configurable {
        match target {
            Target::Device(d) => &mut self.devices[d.index()],
            Target::Channel(c) => &mut self.channels[c.index()],
        }
    }

    fn apply<F>(&mut self, path: &ConfigPath, attr: &str, mut apply: F) -> SimResult<usize>
    where
        F: FnMut(&mut dyn Configurable) -> SimResult<()>,
    {
        let targets = self.resolve(path);
        if targets.is_empty() {
            return Err(SimError::UnknownPath(path.to_string()));
        }
        for target in &targets {
            apply(self.target_mut(*target))?;
        }
        debug!(%path, attribute = attr, matched = targets.len(), "attribute set");
        Ok(targets.len())
    }

    /// Override `attr` on every object `path` matches, effective
    /// immediately. Returns how many objects were changed.
    ///
    /// `value` must have the attribute's declared kind.
    pub fn set(&mut self, path: &str, attr: &str, value: impl Into<AttributeValue>) -> SimResult<usize> {
        let path: ConfigPath = path.parse()?;
        let value = value.into();
        self.apply(&path, attr, |obj| obj.set_attribute(attr, value.clone()))
    }

    /// Like [`Simulator::set`], parsing `text` by the declared kind.
    pub fn set_str(&mut self, path: &str, attr: &str, text: &str) -> SimResult<usize> {
        let path: ConfigPath = path.parse()?;
        self.apply(&path, attr, |obj| obj.set_attribute_str(attr, text))
    }

    /// `set` with the attribute name as the last path segment:
    /// `/NodeList/1/DeviceList/0/$PointToPointNetDevice/DataRate`.
    pub fn set_path(&mut self, full_path: &str, value: impl Into<AttributeValue>) -> SimResult<usize> {
        let (object, attr) = ConfigPath::split_attribute(full_path)?;
        let value = value.into();
        self.apply(&object, attr, |obj| obj.set_attribute(attr, value.clone()))
    }

    /// Read `attr` from the single object `path` names.
    pub fn get(&self, path: &str, attr: &str) -> SimResult<AttributeValue> {
        let parsed: ConfigPath = path.parse()?;
        match self.resolve(&parsed).as_slice() {
            [] => Err(SimError::UnknownPath(parsed.to_string())),
            [target] => self.target(*target).attribute(attr),
            _ => Err(SimError::InvalidPath {
                path: path.to_string(),
                reason: "matches more than one object",
            }),
        }
    }

    /// Typed [`Simulator::get`]; `TypeMismatch` if `T` is not the
    /// attribute's kind.
    pub fn get_as<T: AttributeType>(&self, path: &str, attr: &str) -> SimResult<T> {
        let value = self.get(path, attr)?;
        T::from_value(&value).ok_or_else(|| SimError::TypeMismatch {
            attribute: format!("{}/{}", path, attr),
            expected: value.kind(),
            found: T::KIND,
        })
    }

    // ── Trace ─────────────────────────────────────────────────────

    fn record(&mut self, device: DeviceId, kind: TraceKind, size: usize) {
        self.trace.push(TraceEntry {
            time: self.scheduler.now(),
            device,
            kind,
            size,
        });
    }

    /// Every traced device event so far, in dispatch order.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Deterministic fingerprint of the trace.
    pub fn fingerprint(&self) -> u64 {
        devtrace::fingerprint(&self.trace)
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(AttributeRegistry::new())
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("scheduler", &self.scheduler)
            .field("nodes", &self.nodes.len())
            .field("devices", &self.devices.len())
            .field("channels", &self.channels.len())
            .field("trace", &self.trace.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::DataRate;
    use crate::topology::RateConfigurable;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_schedule_and_run() {
        let mut sim = Simulator::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (delay, tag) in [(30, "c"), (10, "a"), (20, "b")] {
            let log = Rc::clone(&log);
            sim.schedule(TimeDelta::from_millis(delay), move |sim: &mut Simulator| {
                log.borrow_mut().push((sim.now(), tag));
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(sim.run().unwrap(), 3);
        assert_eq!(
            *log.borrow(),
            vec![
                (VirtualTime::from_millis(10), "a"),
                (VirtualTime::from_millis(20), "b"),
                (VirtualTime::from_millis(30), "c"),
            ]
        );
    }

    #[test]
    fn test_stop_after() {
        let mut sim = Simulator::default();
        sim.stop_after(TimeDelta::from_secs(1)).unwrap();
        sim.schedule(TimeDelta::from_secs(5), |_: &mut Simulator| Ok(())).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.now(), VirtualTime::from_secs(1));
        assert_eq!(sim.pending_count(), 1);
    }

    #[test]
    fn test_destroy_keeps_topology_and_defaults() {
        let mut sim = Simulator::default();
        sim.config_mut()
            .set_default("PointToPointNetDevice", "DataRate", DataRate::from_mbps(10))
            .unwrap();
        let n = sim.create_nodes(2);
        let ch = sim.create_channel(MediumKind::PointToPoint).unwrap();
        let a = sim.attach_device(n[0], ch).unwrap();
        sim.attach_device(n[1], ch).unwrap();
        sim.send(a, Packet::zeroed(100)).unwrap();
        sim.run_until(VirtualTime::from_nanos(1)).unwrap();
        assert!(sim.device(a).unwrap().is_busy());

        sim.destroy().unwrap();
        assert_eq!(sim.now(), VirtualTime::ZERO);
        assert_eq!(sim.pending_count(), 0);
        assert!(!sim.device(a).unwrap().is_busy());
        assert_eq!(sim.nodes().len(), 2);

        let c = sim.create_node();
        let ch2 = sim.create_channel(MediumKind::PointToPoint).unwrap();
        let d = sim.attach_device(c, ch2).unwrap();
        assert_eq!(sim.device(d).unwrap().data_rate(), DataRate::from_mbps(10));
    }

    #[test]
    fn test_unknown_ids() {
        let mut sim = Simulator::default();
        assert_eq!(
            sim.attach_device(NodeId::new(0), ChannelId::new(0)).unwrap_err(),
            SimError::UnknownNode(NodeId::new(0))
        );
        let n = sim.create_node();
        assert_eq!(
            sim.attach_device(n, ChannelId::new(4)).unwrap_err(),
            SimError::UnknownChannel(ChannelId::new(4))
        );
        assert!(matches!(
            sim.send(DeviceId::new(9), Packet::zeroed(1)),
            Err(SimError::UnknownDevice(_))
        ));
    }
}
