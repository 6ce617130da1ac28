//! The state root: the top-level coordinator holding configuration and handles to every other
//! component, and exposing the dissection entrypoints.

use std::net::IpAddr;

use crate::config::EngineConfig;
use crate::dissect::Dispatcher;
use crate::dissection_info::DissectionInfo;
use crate::error::DissectError;
use crate::flowtable::{FlowKey, FlowRecord, FlowTable};
use crate::packet::ethernet::Ethernet;
use crate::packet::ipv4::Ipv4;
use crate::packet::ipv6::Ipv6;
use crate::packet::tcp::{self, Tcp};
use crate::packet::udp::{self, Udp};
use crate::reassembly::ipv4::Completion as Ipv4Completion;
use crate::reassembly::ipv6::Completion as Ipv6Completion;
use crate::reassembly::{Ipv4Reassembly, Ipv6Reassembly};
use crate::status::Status;
use crate::tcp_reorder::{SegmentOutcome, TcpState};
use crate::types::Direction;

/// Link-layer framing present ahead of the IP header, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datalink {
    Ethernet,
    /// No link layer; `pkt` starts directly at the IP header.
    Raw,
}

const IPSEC_AH: u8 = 51;
const IPSEC_ESP: u8 = 50;

/// Holds every long-lived piece of engine state and exposes the three dissection entrypoints.
/// Safe to share across threads: every component it owns is internally synchronized at the
/// granularity the specification calls for (one lock per reassembly handle, one lock per flow
/// table partition).
pub struct Engine {
    config: EngineConfig,
    ipv4_reassembly: Option<Ipv4Reassembly>,
    ipv6_reassembly: Option<Ipv6Reassembly>,
    flow_table: FlowTable,
    dispatcher: Dispatcher,
    flow_cleaner: Option<Box<dyn Fn(FlowRecord) + Send + Sync>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let ipv4_reassembly = config.ipv4_defrag.as_ref().map(|c| {
            let handle = Ipv4Reassembly::new(c.table_size);
            handle.set_per_source_limit(c.per_host_limit);
            handle.set_total_limit(c.total_limit);
            handle.set_timeout(c.timeout_s as u64);
            handle
        });
        let ipv6_reassembly = config.ipv6_defrag.as_ref().map(|c| {
            let handle = Ipv6Reassembly::new(c.table_size);
            handle.set_per_source_limit(c.per_host_limit);
            handle.set_total_limit(c.total_limit);
            handle.set_timeout(c.timeout_s as u64);
            handle
        });
        let flow_table = FlowTable::new(&config);
        let dispatcher = Dispatcher::with_builtins(&config);
        Engine {
            config,
            ipv4_reassembly,
            ipv6_reassembly,
            flow_table,
            dispatcher,
            flow_cleaner: None,
        }
    }

    /// Registers a callback invoked with every flow record evicted to make room for a new one.
    /// Lets a caller release any extracted-field or dissector memory it retained a reference to.
    pub fn set_flow_cleaner(&mut self, cleaner: impl Fn(FlowRecord) + Send + Sync + 'static) {
        self.flow_cleaner = Some(Box::new(cleaner));
    }

    pub fn active_flow_count(&self) -> usize {
        self.flow_table.active_count()
    }

    /// Strips link-layer framing, then dissects from L3.
    pub fn dissect_from_l2(&self, pkt: &[u8], now: u64, datalink: Datalink) -> (Status, DissectionInfo) {
        let mut info = DissectionInfo::default();
        let l3_payload = match datalink {
            Datalink::Raw => pkt,
            Datalink::Ethernet => match Ethernet::parse(pkt) {
                Ok(eth) => {
                    info.l2.ether_type = Some(eth.ether_type());
                    info.l2.length = pkt.len() - eth.payload().len();
                    eth.payload()
                }
                Err(_) => return (DissectError::L2Parse.into(), info),
            },
        };
        let (status, l3_info) = self.dissect_from_l3(l3_payload, now);
        (status, merge(info, l3_info))
    }

    /// Decodes the IP header (v4 or v6), reassembling if the datagram is fragmented, then
    /// recurses into L4 for complete datagrams.
    pub fn dissect_from_l3(&self, pkt: &[u8], now: u64) -> (Status, DissectionInfo) {
        let mut info = DissectionInfo::default();
        if pkt.is_empty() {
            return (Status::ErrorL3Parsing, info);
        }
        match pkt[0] >> 4 {
            4 => self.dissect_ipv4(pkt, now, &mut info),
            6 => self.dissect_ipv6(pkt, now, &mut info),
            _ => (DissectError::WrongIpVersion.into(), info),
        }
    }

    fn dissect_ipv4(&self, pkt: &[u8], now: u64, info: &mut DissectionInfo) -> (Status, DissectionInfo) {
        let v4 = match Ipv4::parse(pkt) {
            Ok(v4) => v4,
            Err(_) => return (DissectError::L3Parse.into(), info.clone()),
        };
        info.l3.version = Some(4);
        info.l3.src = Some(IpAddr::V4(v4.src()));
        info.l3.dst = Some(IpAddr::V4(v4.dst()));
        info.l3.length = v4.total_length() as usize;
        info.l3.payload_length = v4.payload().len();

        if v4.protocol() == IPSEC_AH || v4.protocol() == IPSEC_ESP {
            return (DissectError::IpsecNotSupported.into(), info.clone());
        }

        if !v4.is_fragment() {
            let status = self.dissect_from_l4(
                IpAddr::V4(v4.src()),
                IpAddr::V4(v4.dst()),
                v4.protocol(),
                v4.payload(),
                now,
                info,
            );
            return (status, info.clone());
        }

        let Some(reassembly) = &self.ipv4_reassembly else {
            return (Status::IpFragment, info.clone());
        };
        match reassembly.process_fragment(&v4, now) {
            Ipv4Completion::Incomplete | Ipv4Completion::Discarded => {
                (Status::IpFragment, info.clone())
            }
            Ipv4Completion::Completed(datagram) => {
                info.l3.refrag_pkt = Some(datagram.clone());
                let rebuilt = Ipv4::parse(&datagram).expect("reassembled datagram must reparse");
                let status = self.dissect_from_l4(
                    IpAddr::V4(rebuilt.src()),
                    IpAddr::V4(rebuilt.dst()),
                    rebuilt.protocol(),
                    rebuilt.payload(),
                    now,
                    info,
                );
                (status, info.clone())
            }
        }
    }

    fn dissect_ipv6(&self, pkt: &[u8], now: u64, info: &mut DissectionInfo) -> (Status, DissectionInfo) {
        let v6 = match Ipv6::parse(pkt) {
            Ok(v6) => v6,
            Err(_) => return (DissectError::L3Parse.into(), info.clone()),
        };
        info.l3.version = Some(6);
        info.l3.src = Some(IpAddr::V6(v6.src()));
        info.l3.dst = Some(IpAddr::V6(v6.dst()));
        info.l3.payload_length = v6.payload_length() as usize;
        info.l3.length = 40 + v6.payload_length() as usize;

        let fragment = match v6.find_fragment_header() {
            Ok(f) => f,
            Err(_) => return (DissectError::Ipv6HeaderParse.into(), info.clone()),
        };

        match fragment {
            None => {
                let (next_header, payload) = match v6.unfragmented_payload() {
                    Ok(v) => v,
                    Err(_) => return (DissectError::Ipv6HeaderParse.into(), info.clone()),
                };
                if next_header == IPSEC_AH || next_header == IPSEC_ESP {
                    return (DissectError::IpsecNotSupported.into(), info.clone());
                }
                let status = self.dissect_from_l4(
                    IpAddr::V6(v6.src()),
                    IpAddr::V6(v6.dst()),
                    next_header,
                    payload,
                    now,
                    info,
                );
                (status, info.clone())
            }
            Some((frag, payload)) => {
                let Some(reassembly) = &self.ipv6_reassembly else {
                    return (Status::IpFragment, info.clone());
                };
                match reassembly.process_fragment(&v6, &frag, payload, now) {
                    Ipv6Completion::Incomplete | Ipv6Completion::Discarded => {
                        (Status::IpFragment, info.clone())
                    }
                    Ipv6Completion::Completed(datagram) => {
                        info.l3.refrag_pkt = Some(datagram.clone());
                        let rebuilt = Ipv6::parse(&datagram).expect("reassembled datagram must reparse");
                        let (next_header, payload) = rebuilt
                            .unfragmented_payload()
                            .expect("reassembled datagram carries no further fragment header");
                        let status = self.dissect_from_l4(
                            IpAddr::V6(rebuilt.src()),
                            IpAddr::V6(rebuilt.dst()),
                            next_header,
                            payload,
                            now,
                            info,
                        );
                        (status, info.clone())
                    }
                }
            }
        }
    }

    /// Decodes the L4 header, looks up (or creates) the owning flow, runs TCP reordering if
    /// applicable, and dispatches L7. Writes into `info` and returns the resulting status.
    fn dissect_from_l4(
        &self,
        src: IpAddr,
        dst: IpAddr,
        protocol: u8,
        payload: &[u8],
        now: u64,
        info: &mut DissectionInfo,
    ) -> Status {
        let (src_port, dst_port, l4_payload, tcp_flags_seq) = match protocol {
            tcp::TCP_PROTOCOL => match Tcp::parse(payload) {
                Ok(segment) => {
                    info.l4.protocol = Some(protocol);
                    info.l4.src_port = Some(segment.src_port());
                    info.l4.dst_port = Some(segment.dst_port());
                    info.l4.length = payload.len();
                    info.l4.payload_length = segment.payload().len();
                    let flags_seq = Some((segment.flags(), segment.seq_no()));
                    (segment.src_port(), segment.dst_port(), segment.payload(), flags_seq)
                }
                Err(_) => return DissectError::L4Parse.into(),
            },
            udp::UDP_PROTOCOL => match Udp::parse(payload) {
                Ok(datagram) => {
                    info.l4.protocol = Some(protocol);
                    info.l4.src_port = Some(datagram.src_port());
                    info.l4.dst_port = Some(datagram.dst_port());
                    info.l4.length = payload.len();
                    info.l4.payload_length = datagram.payload().len();
                    (datagram.src_port(), datagram.dst_port(), datagram.payload(), None)
                }
                Err(_) => return DissectError::L4Parse.into(),
            },
            _ => return DissectError::L4Parse.into(),
        };

        let mut evict_key = None;
        let mut status = Status::Ok;

        let result = self.flow_table.with_flow(
            src,
            src_port,
            dst,
            dst_port,
            protocol,
            now,
            &mut |evicted| {
                if let Some(cleaner) = &self.flow_cleaner {
                    cleaner(evicted);
                }
            },
            |flow, direction, _is_new| {
                info.l4.direction = Some(direction);

                let to_dispatch: Option<Vec<u8>> = if let Some((flags, seq)) = tcp_flags_seq {
                    if self.config.tcp_reordering {
                        let tcp_state = flow.tcp.get_or_insert_with(TcpState::new);
                        match tcp_state.process_segment(direction, flags, seq, l4_payload) {
                            SegmentOutcome::Terminated => {
                                status = Status::TcpConnectionTerminated;
                                evict_key = Some(flow.key);
                                None
                            }
                            SegmentOutcome::Buffered(segment_status) => {
                                status = segment_status;
                                None
                            }
                            SegmentOutcome::Deliver(bytes) => Some(bytes),
                        }
                    } else {
                        Some(l4_payload.to_vec())
                    }
                } else {
                    Some(l4_payload.to_vec())
                };

                if let Some(bytes) = to_dispatch {
                    info.l4.resegmented_pkt = if bytes == l4_payload { None } else { Some(bytes.clone()) };
                    self.dispatcher.dispatch(
                        &mut flow.l7,
                        protocol,
                        dst_port,
                        &bytes,
                        direction,
                        &mut flow.fields,
                    );
                }
                info.l7.protocol = flow.l7.identified;
                info.l7.fields = flow.fields.clone();
            },
        );

        if let Err(table_status) = result {
            return table_status;
        }
        if let Some(key) = evict_key {
            self.flow_table.evict(&key);
        }
        status
    }
}

fn merge(mut outer: DissectionInfo, inner: DissectionInfo) -> DissectionInfo {
    outer.l3 = inner.l3;
    outer.l4 = inner.l4;
    outer.l7 = inner.l7;
    outer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn udp_packet(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 20 + 8 + payload.len()];
        buf[0] = 0x45;
        let total_length = buf.len() as u16;
        buf[2..4].copy_from_slice(&total_length.to_be_bytes());
        buf[8] = 64;
        buf[9] = udp::UDP_PROTOCOL;
        buf[12..16].copy_from_slice(&src);
        buf[16..20].copy_from_slice(&dst);
        buf[20..22].copy_from_slice(&src_port.to_be_bytes());
        buf[22..24].copy_from_slice(&dst_port.to_be_bytes());
        let udp_len = (8 + payload.len()) as u16;
        buf[24..26].copy_from_slice(&udp_len.to_be_bytes());
        buf[28..].copy_from_slice(payload);
        buf
    }

    #[test]
    fn dissects_a_dns_query_over_udp() {
        let engine = Engine::new(EngineConfig::default());
        let mut dns_payload = vec![0u8; 12];
        dns_payload[5] = 1;
        dns_payload.extend_from_slice(&[7]);
        dns_payload.extend_from_slice(b"example");
        dns_payload.extend_from_slice(&[3]);
        dns_payload.extend_from_slice(b"com");
        dns_payload.push(0);

        let pkt = udp_packet([10, 0, 0, 1], [10, 0, 0, 2], 40000, 53, &dns_payload);
        let (status, info) = engine.dissect_from_l3(&pkt, 0);
        assert_eq!(status, Status::Ok);
        assert_eq!(info.l4.dst_port, Some(53));
        assert!(matches!(info.l7.protocol, crate::types::L7Protocol::Dns));
    }

    #[test]
    fn rejects_truncated_l3_header() {
        let engine = Engine::new(EngineConfig::default());
        let (status, _) = engine.dissect_from_l3(&[0x45, 0, 0], 0);
        assert_eq!(status, Status::ErrorL3Parsing);
    }
}
