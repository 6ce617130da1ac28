//! End-to-end IPv4 fragmentation through the full dissection pipeline.

mod common;

use peafowl_core::config::EngineConfig;
use peafowl_core::state::Engine;
use peafowl_core::status::Status;

#[test]
fn three_fragments_out_of_order_reach_l7_as_one_dns_query() {
    let engine = Engine::new(EngineConfig::default());

    let mut dns_payload = vec![0u8; 12];
    dns_payload[5] = 1;
    dns_payload.extend_from_slice(&[7]);
    dns_payload.extend_from_slice(b"example");
    dns_payload.extend_from_slice(&[3]);
    dns_payload.extend_from_slice(b"com");
    dns_payload.push(0);

    let mut udp_header = vec![0u8; 8];
    let udp_len = (8 + dns_payload.len()) as u16;
    udp_header[0..2].copy_from_slice(&40000u16.to_be_bytes());
    udp_header[2..4].copy_from_slice(&53u16.to_be_bytes());
    udp_header[4..6].copy_from_slice(&udp_len.to_be_bytes());
    let mut full_payload = udp_header;
    full_payload.extend_from_slice(&dns_payload);
    // pad so the datagram splits into three fragments of realistic size.
    full_payload.resize(full_payload.len() + 2960, 0xAB);

    let src = [10, 0, 0, 1];
    let dst = [10, 0, 0, 2];
    let frag1 = common::ipv4_fragment(99, src, dst, 17, 0, true, &full_payload[0..1480]);
    let frag2 = common::ipv4_fragment(99, src, dst, 17, 1480, true, &full_payload[1480..2960]);
    let frag3 = common::ipv4_fragment(99, src, dst, 17, 2960, false, &full_payload[2960..]);

    let (status, _) = engine.dissect_from_l3(&frag3, 0);
    assert_eq!(status, Status::IpFragment);
    let (status, _) = engine.dissect_from_l3(&frag1, 0);
    assert_eq!(status, Status::IpFragment);

    let (status, info) = engine.dissect_from_l3(&frag2, 0);
    assert_eq!(status, Status::Ok);
    assert!(info.l3.refrag_pkt.is_some());
    assert_eq!(info.l4.dst_port, Some(53));
    assert!(matches!(info.l7.protocol, peafowl_core::types::L7Protocol::Dns));
}

#[test]
fn overlapping_fragment_attack_keeps_first_seen_bytes() {
    let engine = Engine::new(EngineConfig::default());
    let src = [1, 1, 1, 1];
    let dst = [2, 2, 2, 2];

    let first_payload = vec![0xAAu8; 980];
    let frag1 = common::ipv4_fragment(7, src, dst, 17, 0, true, &first_payload);
    let (status, _) = engine.dissect_from_l3(&frag1, 0);
    assert_eq!(status, Status::IpFragment);

    let attacker_payload = vec![0xBBu8; 1000];
    let frag2 = common::ipv4_fragment(7, src, dst, 17, 500, false, &attacker_payload);
    let (status, info) = engine.dissect_from_l3(&frag2, 0);
    assert_eq!(status, Status::Ok);
    let datagram = info.l3.refrag_pkt.expect("completed datagram");
    let payload = &datagram[20..];
    assert!(payload[500..980].iter().all(|&b| b == 0xAA));
    assert!(payload[980..1500].iter().all(|&b| b == 0xBB));
}

#[test]
fn fragment_below_minimum_mtu_is_discarded_without_status_ok() {
    let engine = Engine::new(EngineConfig::default());
    let frag = common::ipv4_fragment(1, [1, 1, 1, 1], [2, 2, 2, 2], 17, 0, true, &[0u8; 10]);
    let (status, _) = engine.dissect_from_l3(&frag, 0);
    assert_eq!(status, Status::IpFragment);
}
