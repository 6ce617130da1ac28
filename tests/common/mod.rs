//! Packet builders shared by the integration tests. Mirrors the minimal, hand-rolled builders
//! used in the unit tests of `packet`/`reassembly`, generalized enough to cover TCP as well as
//! UDP and IPv4 fragments.

pub fn ipv4_udp_packet(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + 8 + payload.len()];
    buf[0] = 0x45;
    let total_length = buf.len() as u16;
    buf[2..4].copy_from_slice(&total_length.to_be_bytes());
    buf[8] = 64;
    buf[9] = 17; // UDP
    buf[12..16].copy_from_slice(&src);
    buf[16..20].copy_from_slice(&dst);
    buf[20..22].copy_from_slice(&src_port.to_be_bytes());
    buf[22..24].copy_from_slice(&dst_port.to_be_bytes());
    let udp_len = (8 + payload.len()) as u16;
    buf[24..26].copy_from_slice(&udp_len.to_be_bytes());
    buf[28..].copy_from_slice(payload);
    buf
}

pub fn ipv4_fragment(
    id: u16,
    src: [u8; 4],
    dst: [u8; 4],
    protocol: u8,
    offset_bytes: u16,
    more: bool,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + payload.len()];
    buf[0] = 0x45;
    let total_length = (20 + payload.len()) as u16;
    buf[2..4].copy_from_slice(&total_length.to_be_bytes());
    buf[4..6].copy_from_slice(&id.to_be_bytes());
    let mut flags_offset = offset_bytes / 8;
    if more {
        flags_offset |= 0x2000;
    }
    buf[6..8].copy_from_slice(&flags_offset.to_be_bytes());
    buf[8] = 64;
    buf[9] = protocol;
    buf[12..16].copy_from_slice(&src);
    buf[16..20].copy_from_slice(&dst);
    buf[20..].copy_from_slice(payload);
    buf
}

/// A raw (no options) TCP segment wrapped in an IPv4 header.
pub fn ipv4_tcp_segment(
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
    flags: u8,
    seq: u32,
    ack: u32,
    payload: &[u8],
) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + 20 + payload.len()];
    buf[0] = 0x45;
    let total_length = buf.len() as u16;
    buf[2..4].copy_from_slice(&total_length.to_be_bytes());
    buf[8] = 64;
    buf[9] = 6; // TCP
    buf[12..16].copy_from_slice(&src);
    buf[16..20].copy_from_slice(&dst);

    let tcp = &mut buf[20..];
    tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
    tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
    tcp[4..8].copy_from_slice(&seq.to_be_bytes());
    tcp[8..12].copy_from_slice(&ack.to_be_bytes());
    tcp[12] = 5 << 4; // data offset: 5 words, no options
    tcp[13] = flags;
    tcp[14..16].copy_from_slice(&1024u16.to_be_bytes()); // window
    tcp[20..].copy_from_slice(payload);
    buf
}
