//! UDP header.

use super::PacketParseError;

/// UDP assigned protocol number.
pub const UDP_PROTOCOL: u8 = 17;

const FIXED_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct Udp<'a> {
    src_port: u16,
    dst_port: u16,
    length: u16,
    checksum: u16,
    payload: &'a [u8],
}

impl<'a> Udp<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketParseError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(PacketParseError::Truncated);
        }
        let length = u16::from_be_bytes([buf[4], buf[5]]);
        let payload_end = std::cmp::min(buf.len(), length as usize);
        let payload = if payload_end >= FIXED_HEADER_LEN {
            &buf[FIXED_HEADER_LEN..payload_end]
        } else {
            &buf[FIXED_HEADER_LEN..FIXED_HEADER_LEN]
        };
        Ok(Udp {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
            length,
            checksum: u16::from_be_bytes([buf[6], buf[7]]),
            payload,
        })
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    #[inline]
    pub fn length(&self) -> u16 {
        self.length
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}
