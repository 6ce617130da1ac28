//! A minimal DNS query dissector.
//!
//! DNS has no in-band framing to probe the way HTTP's request line does, so identification
//! leans entirely on the 12-byte header's structural invariants (opcode/rcode ranges, a
//! plausible question count) plus the well-known port, adapted from the header-validity checks
//! in `retina_core::protocols::stream::dns::parser`.

use super::super::{Dissector, Verdict};
use crate::types::{dissector_ids, fields, Direction, FieldStore, FieldValue, L7Protocol, RequestedFields};

const HEADER_LEN: usize = 12;

pub struct DnsDissector;

impl Dissector for DnsDissector {
    fn id(&self) -> u16 {
        dissector_ids::DNS
    }

    fn protocol(&self) -> L7Protocol {
        L7Protocol::Dns
    }

    fn matches_port(&self, l4proto: u8, port: u16) -> bool {
        l4proto == crate::packet::udp::UDP_PROTOCOL && port == 53
    }

    fn dissect(
        &self,
        data: &[u8],
        _direction: Direction,
        field_store: &mut FieldStore,
        requested: &RequestedFields,
    ) -> Verdict {
        if data.len() < HEADER_LEN {
            return Verdict::MoreData;
        }

        let flags = u16::from_be_bytes([data[2], data[3]]);
        let opcode = (flags >> 11) & 0x0f;
        let rcode = flags & 0x0f;
        // Opcodes 3-15 and rcodes above 10 are unassigned/reserved; real traffic never sets them.
        if opcode > 2 || rcode > 10 {
            return Verdict::NoMatch;
        }

        let qdcount = u16::from_be_bytes([data[4], data[5]]);
        if qdcount == 0 || qdcount > 32 {
            return Verdict::NoMatch;
        }

        match parse_query_name(&data[HEADER_LEN..]) {
            Some(name) => {
                if requested.is_enabled(fields::DNS_QUERY_NAME) {
                    field_store.set(fields::DNS_QUERY_NAME, FieldValue::String(name));
                }
                Verdict::Match
            }
            None => Verdict::MoreData,
        }
    }
}

/// Decodes the first question's QNAME (sequence of length-prefixed labels, terminated by a
/// zero-length label). Does not follow compression pointers, since a query's first question
/// never needs one.
fn parse_query_name(buf: &[u8]) -> Option<String> {
    let mut labels = Vec::new();
    let mut pos = 0;
    loop {
        let len = *buf.get(pos)? as usize;
        if len == 0 {
            break;
        }
        if len & 0xc0 != 0 {
            return None; // compression pointer; not expected in the first question
        }
        let start = pos + 1;
        let end = start + len;
        labels.push(std::str::from_utf8(buf.get(start..end)?).ok()?.to_string());
        pos = end;
    }
    Some(labels.join("."))
}
