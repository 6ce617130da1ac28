//! End-to-end L7 dispatch: trial-budget fallback to `Unknown`, and correct protocol pinning.

mod common;

use peafowl_core::config::EngineConfig;
use peafowl_core::state::Engine;
use peafowl_core::status::Status;
use peafowl_core::types::L7Protocol;

#[test]
fn garbage_udp_on_the_dns_port_falls_back_to_unknown_after_trial_budget() {
    let mut config = EngineConfig::default();
    config.max_dissector_trials = 2;
    let engine = Engine::new(config);

    // Shorter than a DNS header: every trial reports `MoreData` rather than ruling the
    // candidate out immediately, so identification stays `Pending` until the trial budget runs
    // out on the same flow.
    let garbage = [0u8; 4];
    let pkt = common::ipv4_udp_packet([10, 0, 0, 1], [10, 0, 0, 2], 40000, 53, &garbage);

    let (status, info) = engine.dissect_from_l3(&pkt, 0);
    assert_eq!(status, Status::Ok);
    assert!(!matches!(info.l7.protocol, L7Protocol::Unknown));

    let (status, info) = engine.dissect_from_l3(&pkt, 0);
    assert_eq!(status, Status::Ok);
    assert!(matches!(info.l7.protocol, L7Protocol::Unknown));
}

#[test]
fn dns_query_over_udp_is_identified_on_the_first_packet() {
    let engine = Engine::new(EngineConfig::default());

    let mut dns_payload = vec![0u8; 12];
    dns_payload[5] = 1;
    dns_payload.extend_from_slice(&[7]);
    dns_payload.extend_from_slice(b"example");
    dns_payload.extend_from_slice(&[3]);
    dns_payload.extend_from_slice(b"com");
    dns_payload.push(0);

    let pkt = common::ipv4_udp_packet([10, 0, 0, 1], [10, 0, 0, 2], 40000, 53, &dns_payload);
    let (status, info) = engine.dissect_from_l3(&pkt, 0);
    assert_eq!(status, Status::Ok);
    assert!(matches!(info.l7.protocol, L7Protocol::Dns));
}
