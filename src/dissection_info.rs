//! The nested per-layer result handed back by every dissection entrypoint.

use std::net::IpAddr;

use crate::types::{Direction, FieldStore, L7Protocol};

#[derive(Debug, Clone, Default)]
pub struct L2Info {
    pub ether_type: Option<u16>,
    pub length: usize,
}

#[derive(Debug, Clone, Default)]
pub struct L3Info {
    pub version: Option<u8>,
    pub src: Option<IpAddr>,
    pub dst: Option<IpAddr>,
    pub length: usize,
    pub payload_length: usize,
    /// Set to `Some` only on the fragment that completed a datagram; the caller owns this
    /// buffer, matching `Status::IpDataRebuilt`'s contract.
    pub refrag_pkt: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct L4Info {
    pub protocol: Option<u8>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub length: usize,
    pub payload_length: usize,
    pub direction: Option<Direction>,
    /// Bytes released by TCP reordering for this segment, if any (may span multiple buffered
    /// segments once a gap closes).
    pub resegmented_pkt: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct L7Info {
    pub protocol: L7Protocol,
    pub fields: FieldStore,
}

impl Default for L7Info {
    fn default() -> Self {
        L7Info { protocol: L7Protocol::Pending, fields: FieldStore::new() }
    }
}

/// The full, layer-by-layer result of one dissection call. Populated up to the last layer that
/// successfully parsed, even when an error status is returned for a deeper layer.
#[derive(Debug, Clone, Default)]
pub struct DissectionInfo {
    pub l2: L2Info,
    pub l3: L3Info,
    pub l4: L4Info,
    pub l7: L7Info,
}
