//! The canonical, direction-agnostic 5-tuple flow key.

use std::net::IpAddr;

use crate::hash::jenkins_mix_bytes;
use crate::types::Direction;

/// A 5-tuple ordered so both directions of a bidirectional flow hash to the same key.
///
/// `addr_low <= addr_high`; if equal, `port_low <= port_high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub addr_low: IpAddr,
    pub addr_high: IpAddr,
    pub port_low: u16,
    pub port_high: u16,
    pub l4proto: u8,
}

impl FlowKey {
    /// Builds the canonical key for a packet's `(src, dst)` 4-tuple plus L4 protocol, and reports
    /// which side of the canonical key the packet's source landed on.
    pub fn canonicalize(
        src_addr: IpAddr,
        src_port: u16,
        dst_addr: IpAddr,
        dst_port: u16,
        l4proto: u8,
    ) -> (FlowKey, Direction) {
        if (src_addr, src_port) <= (dst_addr, dst_port) {
            (
                FlowKey {
                    addr_low: src_addr,
                    addr_high: dst_addr,
                    port_low: src_port,
                    port_high: dst_port,
                    l4proto,
                },
                Direction::Low,
            )
        } else {
            (
                FlowKey {
                    addr_low: dst_addr,
                    addr_high: src_addr,
                    port_low: dst_port,
                    port_high: src_port,
                    l4proto,
                },
                Direction::High,
            )
        }
    }

    /// Hashes the key with the same avalanche mix used by reassembly source lookup, so the high
    /// bits can select a flow-table partition and the low bits a bucket within it.
    pub fn hash(&self) -> u32 {
        let mut bytes = Vec::with_capacity(37);
        match self.addr_low {
            IpAddr::V4(a) => bytes.extend_from_slice(&a.octets()),
            IpAddr::V6(a) => bytes.extend_from_slice(&a.octets()),
        }
        match self.addr_high {
            IpAddr::V4(a) => bytes.extend_from_slice(&a.octets()),
            IpAddr::V6(a) => bytes.extend_from_slice(&a.octets()),
        }
        bytes.extend_from_slice(&self.port_low.to_be_bytes());
        bytes.extend_from_slice(&self.port_high.to_be_bytes());
        bytes.push(self.l4proto);
        jenkins_mix_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalisation_is_direction_agnostic() {
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        let (k1, d1) = FlowKey::canonicalize(a, 1000, b, 80, 6);
        let (k2, d2) = FlowKey::canonicalize(b, 80, a, 1000, 6);
        assert_eq!(k1, k2);
        assert_ne!(d1, d2);
    }
}
