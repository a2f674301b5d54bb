//! Device-level trace of transmissions and receptions.
//!
//! `Simulator` appends one entry per transmit start, transmit completion
//! and reception. The trace backs test assertions and a deterministic
//! fingerprint: two runs of the same scenario must produce the same one.

use std::fmt;

use crate::time::VirtualTime;
use crate::topology::DeviceId;

/// What happened on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum TraceKind {
    /// The device started clocking a packet onto its channel.
    TxStart,
    /// The last bit left the device; it is idle again.
    TxComplete,
    /// A packet from `from` arrived.
    Rx { from: DeviceId },
}

/// A single traced device event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceEntry {
    pub time: VirtualTime,
    pub device: DeviceId,
    pub kind: TraceKind,
    /// Packet size in bytes.
    pub size: usize,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TraceKind::TxStart => write!(f, "[{} {}] tx-start {}B", self.time, self.device, self.size),
            TraceKind::TxComplete => {
                write!(f, "[{} {}] tx-complete {}B", self.time, self.device, self.size)
            }
            TraceKind::Rx { from } => {
                write!(f, "[{} {}] rx {}B from {}", self.time, self.device, self.size, from)
            }
        }
    }
}

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// Order-sensitive fingerprint of a trace.
pub fn fingerprint(entries: &[TraceEntry]) -> u64 {
    entries.iter().fold(0xcbf29ce484222325, |h, e| {
        let kind = match e.kind {
            TraceKind::TxStart => 1,
            TraceKind::TxComplete => 2,
            TraceKind::Rx { from } => 3 + ((from.index() as u64) << 8),
        };
        let h = hash_combine(h, e.time.nanos());
        let h = hash_combine(h, e.device.index() as u64);
        let h = hash_combine(h, kind);
        hash_combine(h, e.size as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(t: u64, kind: TraceKind) -> TraceEntry {
        TraceEntry {
            time: VirtualTime::from_millis(t),
            device: DeviceId::new(1),
            kind,
            size: 100,
        }
    }

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        let a = entry(1, TraceKind::TxStart);
        let b = entry(2, TraceKind::TxComplete);
        assert_eq!(fingerprint(&[a, b]), fingerprint(&[a, b]));
        assert_ne!(fingerprint(&[a, b]), fingerprint(&[b, a]));
    }

    #[test]
    fn test_display() {
        let e = entry(3, TraceKind::Rx { from: DeviceId::new(0) });
        assert_eq!(e.to_string(), "[+3ms D1] rx 100B from D0");
    }
}
