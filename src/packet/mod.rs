//! Types for parsing packet-level network protocols.
//!
//! The structure of this module is adapted from `retina_core::protocols::packet`, but headers
//! are read from a borrowed `&[u8]` rather than a DPDK `Mbuf`: the packet-buffer lifetime is the
//! dissection call, per the specification's input contract, not a mempool allocation.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod udp;

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacketParseError {
    #[error("buffer too short for a fixed header")]
    Truncated,
    #[error("unsupported protocol version or header variant")]
    InvalidProtocol,
}
