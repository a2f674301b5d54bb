//! # Helios Net: Discrete-Event Network Simulation
//!
//! A single-threaded simulation kernel for packet networks. Nothing runs
//! in wall-clock time: a virtual clock jumps from one scheduled event to
//! the next, and every side effect is an event action.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────┐
//! │            Simulator              │ ← owns everything below
//! │  ┌──────────────┐ ┌────────────┐  │
//! │  │  Scheduler   │ │  Registry  │  │ ← events / type defaults
//! │  └──────────────┘ └────────────┘  │
//! │  ┌──────┐ ┌────────┐ ┌─────────┐  │
//! │  │ Node │─│ Device │─│ Channel │  │ ← topology, addressed by id
//! │  └──────┘ └────────┘ └─────────┘  │
//! │  ┌──────────────┐                 │
//! │  │    Trace     │                 │ ← tx/rx record, fingerprint
//! │  └──────────────┘                 │
//! └───────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use helios_net::{DataRate, Packet, PointToPointHelper, Simulator, TimeDelta, VirtualTime};
//!
//! let mut sim = Simulator::default();
//! let nodes = sim.create_nodes(2);
//! let mut p2p = PointToPointHelper::new();
//! p2p.set_device_attribute("DataRate", DataRate::from_mbps(10)).unwrap();
//! p2p.set_channel_attribute("Delay", TimeDelta::from_millis(2)).unwrap();
//! let link = p2p.install(&mut sim, nodes[0], nodes[1]).unwrap();
//!
//! sim.send(link.devices[0], Packet::zeroed(1250)).unwrap();
//! sim.run().unwrap();
//! assert_eq!(sim.now(), VirtualTime::from_millis(3));
//! ```

pub mod attribute;
pub mod config;
pub mod error;
pub mod event;
pub mod packet;
pub mod rate;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod topology;
pub mod trace;

// Re-exports for convenience.
pub use attribute::{
    AttributeKind, AttributeRegistry, AttributeType, AttributeValue, Configurable, ObjectType,
};
pub use config::{ConfigPath, Selector};
pub use error::{SimError, SimResult};
pub use event::{Event, EventId, EventIdGen};
pub use packet::Packet;
pub use rate::DataRate;
pub use scheduler::{EventContext, Scheduler};
pub use simulation::Simulator;
pub use time::{TimeDelta, VirtualTime};
pub use topology::{
    Channel, ChannelId, CsmaHelper, DelayConfigurable, Delivery, Device, DeviceId, DeviceState,
    DeviceStats, Installed, Ipv4AddressHelper, Ipv4Interface, MediumKind, Node, NodeId,
    PointToPointHelper, RateConfigurable,
};
pub use trace::{TraceEntry, TraceKind};
