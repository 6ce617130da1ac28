//! IPv6 fixed header, plus enough extension-header walking to locate a Fragment header.

use super::PacketParseError;
use std::net::Ipv6Addr;

/// IPv6 EtherType.
pub const IPV6_PROTOCOL: usize = 0x86DD;

const FIXED_HEADER_LEN: usize = 40;
const FRAGMENT_HEADER_LEN: usize = 8;

const HOP_BY_HOP: u8 = 0;
const ROUTING: u8 = 43;
const FRAGMENT: u8 = 44;
const DESTINATION_OPTIONS: u8 = 60;
const AUTHENTICATION: u8 = 51;
pub const ESP: u8 = 50;

#[derive(Debug, Clone, Copy)]
pub struct Ipv6<'a> {
    traffic_class: u8,
    flow_label: u32,
    payload_length: u16,
    next_header: u8,
    hop_limit: u8,
    src: Ipv6Addr,
    dst: Ipv6Addr,
    raw_header: &'a [u8],
    /// Everything after the 40-byte fixed header, including any extension headers.
    rest: &'a [u8],
}

/// Extracted from an IPv6 Fragment extension header (RFC 8200 §4.5).
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Fragment {
    pub next_header: u8,
    pub identification: u32,
    pub fragment_offset: u16,
    pub more_fragments: bool,
}

impl<'a> Ipv6<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketParseError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(PacketParseError::Truncated);
        }
        let version = buf[0] >> 4;
        if version != 6 {
            return Err(PacketParseError::InvalidProtocol);
        }
        let traffic_class = ((buf[0] & 0x0f) << 4) | (buf[1] >> 4);
        let flow_label = (((buf[1] & 0x0f) as u32) << 16)
            | ((buf[2] as u32) << 8)
            | (buf[3] as u32);
        let payload_length = u16::from_be_bytes([buf[4], buf[5]]);
        let next_header = buf[6];
        let hop_limit = buf[7];
        let src = Ipv6Addr::from(<[u8; 16]>::try_from(&buf[8..24]).unwrap());
        let dst = Ipv6Addr::from(<[u8; 16]>::try_from(&buf[24..40]).unwrap());

        let rest_end = std::cmp::min(buf.len(), FIXED_HEADER_LEN + payload_length as usize);
        let rest = if rest_end >= FIXED_HEADER_LEN {
            &buf[FIXED_HEADER_LEN..rest_end]
        } else {
            &buf[FIXED_HEADER_LEN..FIXED_HEADER_LEN]
        };

        Ok(Ipv6 {
            traffic_class,
            flow_label,
            payload_length,
            next_header,
            hop_limit,
            src,
            dst,
            raw_header: &buf[..FIXED_HEADER_LEN],
            rest,
        })
    }

    #[inline]
    pub fn traffic_class(&self) -> u8 {
        self.traffic_class
    }

    #[inline]
    pub fn flow_label(&self) -> u32 {
        self.flow_label
    }

    #[inline]
    pub fn payload_length(&self) -> u16 {
        self.payload_length
    }

    #[inline]
    pub fn next_header(&self) -> u8 {
        self.next_header
    }

    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    #[inline]
    pub fn src(&self) -> Ipv6Addr {
        self.src
    }

    #[inline]
    pub fn dst(&self) -> Ipv6Addr {
        self.dst
    }

    #[inline]
    pub fn raw_header(&self) -> &'a [u8] {
        self.raw_header
    }

    /// Walks the extension header chain looking for a Fragment header.
    ///
    /// Returns `Ok(None)` if the chain contains no Fragment header (the datagram is not
    /// fragmented). Returns `Err` if the chain is truncated or malformed, matching the
    /// specification's `ERROR_IPV6_HDR_PARSING` status.
    pub fn find_fragment_header(
        &self,
    ) -> Result<Option<(Ipv6Fragment, &'a [u8])>, PacketParseError> {
        let mut next = self.next_header;
        let mut rest = self.rest;
        loop {
            match next {
                HOP_BY_HOP | ROUTING | DESTINATION_OPTIONS => {
                    if rest.len() < 2 {
                        return Err(PacketParseError::Truncated);
                    }
                    let hdr_ext_len = rest[1] as usize;
                    let total = (hdr_ext_len + 1) * 8;
                    if rest.len() < total {
                        return Err(PacketParseError::Truncated);
                    }
                    next = rest[0];
                    rest = &rest[total..];
                }
                FRAGMENT => {
                    if rest.len() < FRAGMENT_HEADER_LEN {
                        return Err(PacketParseError::Truncated);
                    }
                    let frag_next_header = rest[0];
                    let offset_and_flags = u16::from_be_bytes([rest[2], rest[3]]);
                    let identification = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]);
                    let fragment_offset = (offset_and_flags >> 3) * 8;
                    let more_fragments = offset_and_flags & 0x1 != 0;
                    let payload = &rest[FRAGMENT_HEADER_LEN..];
                    return Ok(Some((
                        Ipv6Fragment {
                            next_header: frag_next_header,
                            identification,
                            fragment_offset,
                            more_fragments,
                        },
                        payload,
                    )));
                }
                AUTHENTICATION => {
                    if rest.len() < 2 {
                        return Err(PacketParseError::Truncated);
                    }
                    let total = (rest[1] as usize + 2) * 4;
                    if rest.len() < total {
                        return Err(PacketParseError::Truncated);
                    }
                    next = rest[0];
                    rest = &rest[total..];
                }
                _ => return Ok(None),
            }
        }
    }

    /// Returns the upper-layer payload when the datagram is *not* fragmented (no Fragment
    /// extension header present), along with the resolved next-header (transport) protocol.
    pub fn unfragmented_payload(&self) -> Result<(u8, &'a [u8]), PacketParseError> {
        let mut next = self.next_header;
        let mut rest = self.rest;
        loop {
            match next {
                HOP_BY_HOP | ROUTING | DESTINATION_OPTIONS => {
                    if rest.len() < 2 {
                        return Err(PacketParseError::Truncated);
                    }
                    let total = (rest[1] as usize + 1) * 8;
                    if rest.len() < total {
                        return Err(PacketParseError::Truncated);
                    }
                    next = rest[0];
                    rest = &rest[total..];
                }
                AUTHENTICATION => {
                    if rest.len() < 2 {
                        return Err(PacketParseError::Truncated);
                    }
                    let total = (rest[1] as usize + 2) * 4;
                    if rest.len() < total {
                        return Err(PacketParseError::Truncated);
                    }
                    next = rest[0];
                    rest = &rest[total..];
                }
                FRAGMENT => return Err(PacketParseError::InvalidProtocol),
                _ => return Ok((next, rest)),
            }
        }
    }
}
