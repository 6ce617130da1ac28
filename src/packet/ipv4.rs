//! IPv4 header.
//!
//! Field names and accessor set are adapted from `retina_core::protocols::packet::ipv4::Ipv4`;
//! unlike the teacher, header values are read directly from the borrowed buffer with
//! `u16::from_be_bytes` rather than cast through a `#[repr(C, packed)]` struct over a DPDK mbuf,
//! since this crate has no mbuf to cast over.

use super::PacketParseError;
use std::net::Ipv4Addr;

/// IPv4 EtherType.
pub const IPV4_PROTOCOL: usize = 0x0800;
/// Flag: "Don't fragment".
pub const IPV4_DF: u16 = 0x4000;
/// Flag: "More fragments".
pub const IPV4_MF: u16 = 0x2000;
/// Fragment offset mask, in the 13 low bits of the flags/offset field.
const IPV4_FRAG_OFFSET_MASK: u16 = 0x1FFF;

const FIXED_HEADER_LEN: usize = 20;

/// A parsed (options not decoded) IPv4 header plus a reference to its payload.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4<'a> {
    version_ihl: u8,
    dscp_ecn: u8,
    total_length: u16,
    identification: u16,
    flags_to_fragment_offset: u16,
    ttl: u8,
    protocol: u8,
    checksum: u16,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    /// The raw fixed header bytes, used to clone a copy into a reassembly flow.
    raw_header: &'a [u8],
    payload: &'a [u8],
}

impl<'a> Ipv4<'a> {
    /// Parses an IPv4 header from the start of `buf`. `buf` must contain the full datagram
    /// (header + payload); the payload is truncated to `total_length - ihl*4` bytes, clipped to
    /// what is actually present.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketParseError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(PacketParseError::Truncated);
        }
        let version_ihl = buf[0];
        if version_ihl >> 4 != 4 {
            return Err(PacketParseError::InvalidProtocol);
        }
        let ihl = ((version_ihl & 0x0f) as usize) * 4;
        if ihl < FIXED_HEADER_LEN || buf.len() < ihl {
            return Err(PacketParseError::Truncated);
        }
        let total_length = u16::from_be_bytes([buf[2], buf[3]]);
        let identification = u16::from_be_bytes([buf[4], buf[5]]);
        let flags_to_fragment_offset = u16::from_be_bytes([buf[6], buf[7]]);
        let ttl = buf[8];
        let protocol = buf[9];
        let checksum = u16::from_be_bytes([buf[10], buf[11]]);
        let src = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
        let dst = Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]);

        let payload_end = std::cmp::min(buf.len(), total_length as usize);
        let payload = if ihl <= payload_end { &buf[ihl..payload_end] } else { &buf[ihl..ihl] };

        Ok(Ipv4 {
            version_ihl,
            dscp_ecn: buf[1],
            total_length,
            identification,
            flags_to_fragment_offset,
            ttl,
            protocol,
            checksum,
            src,
            dst,
            raw_header: &buf[..ihl],
            payload,
        })
    }

    #[inline]
    pub fn ihl(&self) -> u8 {
        self.version_ihl & 0x0f
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.ihl() as usize * 4
    }

    #[inline]
    pub fn dscp_ecn(&self) -> u8 {
        self.dscp_ecn
    }

    #[inline]
    pub fn total_length(&self) -> u16 {
        self.total_length
    }

    #[inline]
    pub fn identification(&self) -> u16 {
        self.identification
    }

    #[inline]
    pub fn df(&self) -> bool {
        self.flags_to_fragment_offset & IPV4_DF != 0
    }

    #[inline]
    pub fn mf(&self) -> bool {
        self.flags_to_fragment_offset & IPV4_MF != 0
    }

    /// Fragment offset, in units of 8 bytes (as carried on the wire).
    #[inline]
    pub fn fragment_offset_units(&self) -> u16 {
        self.flags_to_fragment_offset & IPV4_FRAG_OFFSET_MASK
    }

    /// Fragment offset in bytes.
    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        self.fragment_offset_units() * 8
    }

    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.mf() || self.fragment_offset_units() != 0
    }

    #[inline]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[inline]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    #[inline]
    pub fn src(&self) -> Ipv4Addr {
        self.src
    }

    #[inline]
    pub fn dst(&self) -> Ipv4Addr {
        self.dst
    }

    #[inline]
    pub fn raw_header(&self) -> &'a [u8] {
        self.raw_header
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}
