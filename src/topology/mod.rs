//! Topology objects: nodes, devices, channels, and the helpers that wire
//! them together.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`], [`DeviceId`], [`ChannelId`] |
//! | [`node`] | [`Node`] |
//! | [`device`] | [`Device`], [`RateConfigurable`], receive callbacks |
//! | [`channel`] | [`Channel`], [`MediumKind`], [`DelayConfigurable`] |
//! | [`helper`] | [`PointToPointHelper`], [`CsmaHelper`] |
//! | [`address`] | [`Ipv4AddressHelper`] |
//!
//! All objects are owned by [`crate::Simulator`] and addressed by id.

pub mod address;
pub mod channel;
pub mod device;
pub mod helper;
pub mod id;
pub mod node;

pub use address::Ipv4AddressHelper;
pub use channel::{Channel, DelayConfigurable, MediumKind};
pub use device::{
    Delivery, Device, DeviceState, DeviceStats, Ipv4Interface, RateConfigurable, ReceiveCallback,
};
pub use helper::{CsmaHelper, Installed, PointToPointHelper};
pub use id::{ChannelId, DeviceId, NodeId};
pub use node::Node;
