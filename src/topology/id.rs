//! Lightweight, ordered, copyable identifiers for topology objects.
//!
//! Each is a dense index in creation order, which is also the index used
//! by configuration paths (`/NodeList/<n>`, `/ChannelList/<c>`).

use std::fmt;

macro_rules! topology_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub fn new(index: usize) -> Self {
                $name(index)
            }

            /// Position in creation order.
            #[inline]
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

topology_id!(
    /// A simulated node.
    NodeId,
    "N"
);
topology_id!(
    /// A network device, unique across all nodes.
    DeviceId,
    "D"
);
topology_id!(
    /// A transmission medium.
    ChannelId,
    "C"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(NodeId::new(3).to_string(), "N3");
        assert_eq!(DeviceId::new(0).to_string(), "D0");
        assert_eq!(ChannelId::new(12).to_string(), "C12");
    }

    #[test]
    fn test_ordering_follows_index() {
        assert!(NodeId::new(1) < NodeId::new(2));
        assert_eq!(ChannelId::new(5).index(), 5);
    }
}
