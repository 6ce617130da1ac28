//! End-to-end flow table eviction and the flow-cleaner callback.

mod common;

use std::sync::{Arc, Mutex};

use peafowl_core::config::EngineConfig;
use peafowl_core::state::Engine;
use peafowl_core::status::Status;

#[test]
fn full_table_evicts_lru_flow_and_invokes_cleaner() {
    let mut config = EngineConfig::default();
    config.partitions = 1;
    config.max_active_flows = 2;
    config.ipv4_defrag = None;
    config.ipv6_defrag = None;

    let mut engine = Engine::new(config);
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let evicted_clone = Arc::clone(&evicted);
    engine.set_flow_cleaner(move |flow| evicted_clone.lock().unwrap().push(flow.key));

    let pkt = |src_port: u16| common::ipv4_udp_packet([10, 0, 0, 1], [10, 0, 0, 2], src_port, 9999, b"x");

    let (status, _) = engine.dissect_from_l3(&pkt(1), 0);
    assert_eq!(status, Status::Ok);
    let (status, _) = engine.dissect_from_l3(&pkt(2), 0);
    assert_eq!(status, Status::Ok);
    assert_eq!(engine.active_flow_count(), 2);

    // A third distinct flow forces an eviction since the table holds at most 2.
    let (status, _) = engine.dissect_from_l3(&pkt(3), 0);
    assert_eq!(status, Status::Ok);
    assert_eq!(engine.active_flow_count(), 2);
    assert_eq!(evicted.lock().unwrap().len(), 1);
}

#[test]
fn strict_mode_rejects_new_flows_once_full() {
    let mut config = EngineConfig::default();
    config.partitions = 1;
    config.max_active_flows = 1;
    config.strict = true;
    config.ipv4_defrag = None;
    config.ipv6_defrag = None;

    let engine = Engine::new(config);
    let pkt = |src_port: u16| common::ipv4_udp_packet([10, 0, 0, 1], [10, 0, 0, 2], src_port, 9999, b"x");

    let (status, _) = engine.dissect_from_l3(&pkt(1), 0);
    assert_eq!(status, Status::Ok);
    let (status, _) = engine.dissect_from_l3(&pkt(2), 0);
    assert_eq!(status, Status::ErrorMaxFlows);
}
