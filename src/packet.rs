//! Immutable packets carried between devices.

use std::fmt;

use bytes::Bytes;

/// An immutable byte-bearing unit.
///
/// Cloning is cheap (reference-counted payload), so a broadcast delivers
/// the same buffer to every receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    payload: Bytes,
}

impl Packet {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Packet {
            payload: payload.into(),
        }
    }

    /// A zero-filled packet of `size` bytes.
    pub fn zeroed(size: usize) -> Self {
        Packet {
            payload: Bytes::from(vec![0u8; size]),
        }
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Size in bits, the unit data rates are expressed in.
    #[inline]
    pub fn bits(&self) -> u64 {
        self.payload.len() as u64 * 8
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl From<&'static str> for Packet {
    fn from(text: &'static str) -> Self {
        Packet::new(Bytes::from_static(text.as_bytes()))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet({} bytes)", self.size())
    }
}
