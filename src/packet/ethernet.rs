//! Ethernet framing: just enough to strip the frame header and hand off the EtherType payload.
//!
//! Adapted from `retina_core::protocols::packet::ethernet::Ethernet`; single 802.1Q tags are
//! unwrapped, QinQ (802.1ad) double-tagging is not, matching the teacher's own scope.

use super::PacketParseError;

const VLAN_802_1Q: u16 = 0x8100;
const VLAN_802_1AD: u16 = 0x88a8;

const HDR_SIZE: usize = 14;
const TAG_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct Ethernet<'a> {
    dst: [u8; 6],
    src: [u8; 6],
    ether_type: u16,
    payload: &'a [u8],
}

impl<'a> Ethernet<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketParseError> {
        if buf.len() < HDR_SIZE {
            return Err(PacketParseError::Truncated);
        }
        let outer_type = u16::from_be_bytes([buf[12], buf[13]]);
        let (ether_type, header_len) = match outer_type {
            VLAN_802_1Q => {
                if buf.len() < HDR_SIZE + TAG_SIZE {
                    return Err(PacketParseError::Truncated);
                }
                let inner = u16::from_be_bytes([buf[HDR_SIZE + 2], buf[HDR_SIZE + 3]]);
                (inner, HDR_SIZE + TAG_SIZE)
            }
            VLAN_802_1AD => return Err(PacketParseError::InvalidProtocol),
            other => (other, HDR_SIZE),
        };

        Ok(Ethernet {
            dst: buf[0..6].try_into().unwrap(),
            src: buf[6..12].try_into().unwrap(),
            ether_type,
            payload: &buf[header_len..],
        })
    }

    #[inline]
    pub fn dst(&self) -> [u8; 6] {
        self.dst
    }

    #[inline]
    pub fn src(&self) -> [u8; 6] {
        self.src
    }

    #[inline]
    pub fn ether_type(&self) -> u16 {
        self.ether_type
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}
