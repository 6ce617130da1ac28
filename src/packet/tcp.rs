//! TCP header.
//!
//! Field and flag-constant names are adapted from `retina_core::protocols::packet::tcp::Tcp`.

use super::PacketParseError;

/// TCP assigned protocol number.
pub const TCP_PROTOCOL: u8 = 6;

// TCP flags.
pub const CWR: u8 = 0b1000_0000;
pub const ECE: u8 = 0b0100_0000;
pub const URG: u8 = 0b0010_0000;
pub const ACK: u8 = 0b0001_0000;
pub const PSH: u8 = 0b0000_1000;
pub const RST: u8 = 0b0000_0100;
pub const SYN: u8 = 0b0000_0010;
pub const FIN: u8 = 0b0000_0001;

const FIXED_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct Tcp<'a> {
    src_port: u16,
    dst_port: u16,
    seq_no: u32,
    ack_no: u32,
    data_offset: u8,
    flags: u8,
    window: u16,
    checksum: u16,
    urgent_pointer: u16,
    payload: &'a [u8],
}

impl<'a> Tcp<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketParseError> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(PacketParseError::Truncated);
        }
        let data_offset = (buf[12] & 0xf0) >> 4;
        let header_len = data_offset as usize * 4;
        if header_len < FIXED_HEADER_LEN || buf.len() < header_len {
            return Err(PacketParseError::Truncated);
        }
        Ok(Tcp {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
            seq_no: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ack_no: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            data_offset,
            flags: buf[13],
            window: u16::from_be_bytes([buf[14], buf[15]]),
            checksum: u16::from_be_bytes([buf[16], buf[17]]),
            urgent_pointer: u16::from_be_bytes([buf[18], buf[19]]),
            payload: &buf[header_len..],
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
    pub fn seq_no(&self) -> u32 {
        self.seq_no
    }

    #[inline]
    pub fn ack_no(&self) -> u32 {
        self.ack_no
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        self.data_offset as usize * 4
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    #[inline]
    pub fn window(&self) -> u16 {
        self.window
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    #[inline]
    pub fn urgent_pointer(&self) -> u16 {
        self.urgent_pointer
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}
