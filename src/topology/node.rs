//! Nodes: identities that own an ordered list of devices.

use super::id::{DeviceId, NodeId};

/// A simulated host or router.
///
/// Owns nothing but the attach-ordered list of its devices; position in
/// that list is the `DeviceList` index used by configuration paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    devices: Vec<DeviceId>,
}

impl Node {
    pub(crate) fn new(id: NodeId) -> Self {
        Node {
            id,
            devices: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// The device at `index` in attach order.
    pub fn device(&self, index: usize) -> Option<DeviceId> {
        self.devices.get(index).copied()
    }

    /// Record a new device; returns its per-node index.
    pub(crate) fn add_device(&mut self, device: DeviceId) -> usize {
        self.devices.push(device);
        self.devices.len() - 1
    }
}
