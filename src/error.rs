//! Structured error types for helios-net.
//!
//! All fallible public APIs return `Result<T, SimError>`. Every variant
//! is a local, synchronous failure reported at the call that caused it;
//! nothing is retried and no configuration error is masked.

use thiserror::Error;

use crate::attribute::AttributeKind;
use crate::time::TimeDelta;
use crate::topology::{ChannelId, DeviceId, NodeId};

/// The top-level error type for the simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    // ── Scheduling errors ─────────────────────────────────

    /// A negative delay was passed to the scheduler.
    #[error("cannot schedule with negative delay {delay}")]
    InvalidDelay { delay: TimeDelta },

    /// Virtual time arithmetic overflowed.
    #[error("virtual time overflow")]
    TimeOverflow,

    // ── Attribute errors ──────────────────────────────────

    /// A value's kind disagrees with the attribute's declared kind.
    #[error("attribute {attribute} expects {expected}, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: AttributeKind,
        found: AttributeKind,
    },

    /// No object type with this name is registered.
    #[error("unknown object type {0}")]
    UnknownType(String),

    /// The object type does not declare this attribute.
    #[error("type {type_name} has no attribute {attribute}")]
    UnknownAttribute { type_name: String, attribute: String },

    /// A textual value could not be parsed as the expected kind.
    #[error("invalid {kind} value {value:?}")]
    InvalidValue { kind: &'static str, value: String },

    /// A configuration path resolved to no object.
    #[error("path {0} matches no object")]
    UnknownPath(String),

    /// A configuration path is syntactically malformed.
    #[error("malformed path {path}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    // ── Topology errors ───────────────────────────────────

    /// Attaching another device would exceed the medium's capacity.
    #[error("channel {channel} is full ({capacity} devices)")]
    CapacityExceeded { channel: ChannelId, capacity: usize },

    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("device {0} does not exist")]
    UnknownDevice(DeviceId),

    #[error("channel {0} does not exist")]
    UnknownChannel(ChannelId),

    /// The address pool of the current network is used up.
    #[error("no host addresses left in {network}/{prefix}")]
    AddressExhausted {
        network: std::net::Ipv4Addr,
        prefix: u8,
    },

    // ── Device errors ─────────────────────────────────────

    /// `send` was called while the device is still transmitting.
    #[error("device {0} is busy transmitting")]
    DeviceBusy(DeviceId),

    /// `send` was called on a device with no channel.
    #[error("device {0} is not attached to a channel")]
    DeviceNotAttached(DeviceId),

    /// The packet is larger than the device MTU.
    #[error("packet of {size} bytes exceeds MTU {mtu} on device {device}")]
    PacketTooLarge {
        device: DeviceId,
        size: usize,
        mtu: u64,
    },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
