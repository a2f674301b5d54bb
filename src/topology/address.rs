//! Sequential IPv4 address assignment for device sets.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::simulation::Simulator;

use super::device::{prefix_mask, Ipv4Interface};
use super::id::DeviceId;

/// Hands out host addresses from one network at a time.
///
/// `set_base` picks the network and mask; `assign` gives each device the
/// next free host address; `new_network` moves on to the next network of
/// the same size.
#[derive(Debug, Clone)]
pub struct Ipv4AddressHelper {
    network: u32,
    prefix_len: u8,
    first_host: u32,
    next_host: u32,
}

impl Ipv4AddressHelper {
    /// A helper with no base; call [`Ipv4AddressHelper::set_base`] first.
    pub fn new() -> Self {
        Ipv4AddressHelper {
            network: 0,
            prefix_len: 0,
            first_host: 1,
            next_host: 1,
        }
    }

    /// Select `network`/`mask`, starting at the first usable host: `.1`,
    /// or `.0` on a /31 or /32.
    pub fn set_base(&mut self, network: Ipv4Addr, mask: Ipv4Addr) -> SimResult<()> {
        let (first, _) = host_range(mask_prefix(mask)?);
        self.set_base_from(network, mask, first)
    }

    /// Select `network`/`mask`, starting at host number `first_host`.
    pub fn set_base_from(&mut self, network: Ipv4Addr, mask: Ipv4Addr, first_host: u32) -> SimResult<()> {
        let prefix_len = mask_prefix(mask)?;
        let (first, last) = host_range(prefix_len);
        if first_host < first || first_host > last {
            return Err(SimError::InvalidValue {
                kind: "Ipv4Host",
                value: first_host.to_string(),
            });
        }
        self.network = u32::from(network) & prefix_mask(prefix_len);
        self.prefix_len = prefix_len;
        self.first_host = first_host;
        self.next_host = first_host;
        debug!(network = %Ipv4Addr::from(self.network), prefix_len, "address base set");
        Ok(())
    }

    /// Advance to the next network of the same size, restarting hosts.
    pub fn new_network(&mut self) -> SimResult<Ipv4Addr> {
        let block = 1u64 << (32 - u32::from(self.prefix_len));
        let next = u64::from(self.network) + block;
        let next = u32::try_from(next).map_err(|_| self.exhausted())?;
        self.network = next;
        self.next_host = self.first_host;
        Ok(Ipv4Addr::from(next))
    }

    /// The address the next `assign` would hand out.
    pub fn peek(&self) -> SimResult<Ipv4Addr> {
        let (_, last) = host_range(self.prefix_len);
        if self.next_host > last {
            return Err(self.exhausted());
        }
        Ok(Ipv4Addr::from(self.network | self.next_host))
    }

    fn exhausted(&self) -> SimError {
        SimError::AddressExhausted {
            network: Ipv4Addr::from(self.network),
            prefix: self.prefix_len,
        }
    }

    /// Give each device the next host address, in order.
    ///
    /// All-or-nothing: if the network runs out part way through, no device
    /// is changed.
    pub fn assign(&mut self, sim: &mut Simulator, devices: &[DeviceId]) -> SimResult<Vec<Ipv4Interface>> {
        let (_, last) = host_range(self.prefix_len);
        let needed = devices.len() as u64;
        if u64::from(self.next_host) + needed > u64::from(last) + 1 {
            return Err(self.exhausted());
        }
        for device in devices {
            sim.device(*device)?;
        }

        let mut interfaces = Vec::with_capacity(devices.len());
        for device in devices {
            let interface = Ipv4Interface {
                device: *device,
                address: Ipv4Addr::from(self.network | self.next_host),
                prefix_len: self.prefix_len,
            };
            self.next_host += 1;
            sim.device_mut(*device)?.add_address(interface);
            debug!(%interface, "address assigned");
            interfaces.push(interface);
        }
        Ok(interfaces)
    }
}

impl Default for Ipv4AddressHelper {
    fn default() -> Self {
        Self::new()
    }
}

fn mask_prefix(mask: Ipv4Addr) -> SimResult<u8> {
    let bits = u32::from(mask);
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(SimError::InvalidValue {
            kind: "Ipv4Mask",
            value: mask.to_string(),
        });
    }
    Ok(bits.leading_ones() as u8)
}

/// First and last assignable host numbers. The all-zeros and all-ones
/// host parts are reserved, except on /31 point-to-point links and /32
/// single hosts where every address is usable.
fn host_range(prefix_len: u8) -> (u32, u32) {
    match prefix_len {
        32 => (0, 0),
        31 => (0, 1),
        n => (1, !prefix_mask(n) - 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_range() {
        assert_eq!(host_range(24), (1, 254));
        assert_eq!(host_range(30), (1, 2));
        assert_eq!(host_range(16), (1, 65_534));
        assert_eq!(host_range(31), (0, 1));
        assert_eq!(host_range(32), (0, 0));
        assert_eq!(host_range(0), (1, u32::MAX - 1));
    }

    fn hosts_of(prefix: Ipv4Addr, count: usize) -> SimResult<Vec<Ipv4Addr>> {
        let mut helper = Ipv4AddressHelper::new();
        helper.set_base(Ipv4Addr::new(10, 0, 0, 0), prefix)?;
        (0..count)
            .map(|_| {
                let addr = helper.peek()?;
                helper.next_host += 1;
                Ok(addr)
            })
            .collect()
    }

    #[test]
    fn test_narrow_prefixes_stay_inside_the_network() {
        assert_eq!(
            hosts_of(Ipv4Addr::new(255, 255, 255, 254), 2).unwrap(),
            vec![Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1)]
        );
        assert!(matches!(
            hosts_of(Ipv4Addr::new(255, 255, 255, 254), 3),
            Err(SimError::AddressExhausted { prefix: 31, .. })
        ));
        assert_eq!(
            hosts_of(Ipv4Addr::new(255, 255, 255, 255), 1).unwrap(),
            vec![Ipv4Addr::new(10, 0, 0, 0)]
        );
        assert!(hosts_of(Ipv4Addr::new(255, 255, 255, 255), 2).is_err());
        assert_eq!(
            hosts_of(Ipv4Addr::new(255, 255, 255, 252), 2).unwrap(),
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[test]
    fn test_rejects_non_contiguous_mask() {
        let mut helper = Ipv4AddressHelper::new();
        assert!(helper
            .set_base(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 255, 0))
            .is_err());
    }

    #[test]
    fn test_new_network_moves_by_block() {
        let mut helper = Ipv4AddressHelper::new();
        helper
            .set_base(Ipv4Addr::new(192, 168, 20, 0), Ipv4Addr::new(255, 255, 255, 0))
            .unwrap();
        assert_eq!(helper.peek().unwrap(), Ipv4Addr::new(192, 168, 20, 1));
        assert_eq!(helper.new_network().unwrap(), Ipv4Addr::new(192, 168, 21, 0));
        assert_eq!(helper.peek().unwrap(), Ipv4Addr::new(192, 168, 21, 1));
    }

    #[test]
    fn test_base_masks_host_bits() {
        let mut helper = Ipv4AddressHelper::new();
        helper
            .set_base_from(Ipv4Addr::new(10, 1, 1, 77), Ipv4Addr::new(255, 255, 255, 0), 10)
            .unwrap();
        assert_eq!(helper.peek().unwrap(), Ipv4Addr::new(10, 1, 1, 10));
    }
}
