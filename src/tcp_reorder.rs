//! Per-flow, per-direction TCP stream reordering.
//!
//! Sequence numbers are tracked relative to each direction's `initial_seq` rather than compared
//! directly, which sidesteps 32-bit wraparound entirely for the bounded out-of-order windows this
//! engine buffers; [`wrapping_lt`] is exposed for the one place an absolute comparison is still
//! needed (recognising a retransmitted SYN).
//!
//! Overlap resolution when buffering out-of-order bytes reuses the same "existing bytes win"
//! policy as datagram reassembly ([`crate::reassembly::fragment`]).

use crate::packet::tcp;
use crate::reassembly::fragment::{self, Fragment};
use crate::status::Status;
use crate::types::Direction;

/// `true` if `a` precedes `b` in sequence-number space, accounting for 32-bit wraparound
/// (RFC 1323 §4.2's serial number arithmetic).
#[inline]
pub fn wrapping_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    SynSent,
    SynAcked,
    Established,
    FinWait,
    Closed,
}

#[derive(Debug, Clone)]
struct DirectionState {
    state: ConnState,
    initial_seq: Option<u32>,
    /// Next expected byte, relative to `initial_seq` (the SYN itself consumes sequence number 0,
    /// so the first data byte is at relative offset 1).
    expected_seq: u32,
    buffered: Vec<Fragment>,
    fin_seen: bool,
}

impl DirectionState {
    fn new() -> Self {
        DirectionState {
            state: ConnState::SynSent,
            initial_seq: None,
            expected_seq: 1,
            buffered: Vec::new(),
            fin_seen: false,
        }
    }
}

/// Outcome of feeding one TCP segment through reordering for one direction.
#[derive(Debug)]
pub enum SegmentOutcome {
    /// No bytes are ready for L7 yet (pure duplicate, or buffered out of order).
    Buffered(Status),
    /// `bytes` is a contiguous, in-order span ready for L7 dispatch.
    Deliver(Vec<u8>),
    /// `RST`, or both directions have now seen `FIN`.
    Terminated,
}

/// Per-flow TCP reordering state, one [`DirectionState`] per side of the connection.
#[derive(Debug, Clone)]
pub struct TcpState {
    directions: [DirectionState; 2],
}

impl TcpState {
    pub fn new() -> Self {
        TcpState { directions: [DirectionState::new(), DirectionState::new()] }
    }

    /// Feeds one segment. `direction` is the sender's side of the canonical flow key.
    pub fn process_segment(
        &mut self,
        direction: Direction,
        flags: u8,
        seq: u32,
        payload: &[u8],
    ) -> SegmentOutcome {
        if flags & tcp::RST != 0 {
            self.directions[0].state = ConnState::Closed;
            self.directions[1].state = ConnState::Closed;
            return SegmentOutcome::Terminated;
        }

        if flags & tcp::SYN != 0 {
            let idx = direction.index();
            if self.directions[idx].initial_seq.is_none() {
                self.directions[idx].initial_seq = Some(seq);
                self.directions[idx].expected_seq = 1;
            }
            if flags & tcp::ACK != 0 {
                self.directions[0].state = ConnState::Established;
                self.directions[1].state = ConnState::Established;
            } else {
                self.directions[idx].state = ConnState::SynSent;
            }
        }

        let dir = &mut self.directions[direction.index()];
        if dir.initial_seq.is_none() {
            // Mid-stream capture with no observed SYN: treat this segment's sequence number as
            // the baseline so reordering can still operate on later segments.
            dir.initial_seq = Some(seq);
            dir.expected_seq = 0;
            dir.state = ConnState::Established;
        }
        let rel_start = seq.wrapping_sub(dir.initial_seq.unwrap());
        let rel_end = rel_start + payload.len() as u32;

        let outcome = if rel_end <= dir.expected_seq {
            SegmentOutcome::Buffered(Status::Ok)
        } else if rel_start <= dir.expected_seq {
            let trim = (dir.expected_seq - rel_start) as usize;
            let mut delivered = payload[trim..].to_vec();
            dir.expected_seq = rel_end;
            drain_contiguous(dir, &mut delivered);
            SegmentOutcome::Deliver(delivered)
        } else {
            fragment::insert_fragment(&mut dir.buffered, payload, rel_start, rel_end);
            SegmentOutcome::Buffered(Status::TcpOutOfOrder)
        };

        if flags & tcp::FIN != 0 {
            let idx = direction.index();
            self.directions[idx].fin_seen = true;
            self.directions[idx].state = ConnState::FinWait;
            if self.directions[0].fin_seen && self.directions[1].fin_seen {
                self.directions[0].state = ConnState::Closed;
                self.directions[1].state = ConnState::Closed;
                return SegmentOutcome::Terminated;
            }
        }

        outcome
    }

    pub fn state(&self, direction: Direction) -> ConnState {
        self.directions[direction.index()].state
    }
}

impl Default for TcpState {
    fn default() -> Self {
        TcpState::new()
    }
}

/// Appends any buffered segments now contiguous with `expected_seq` onto `delivered`, advancing
/// `expected_seq` past each one in turn.
fn drain_contiguous(dir: &mut DirectionState, delivered: &mut Vec<u8>) {
    loop {
        let Some(pos) = dir.buffered.iter().position(|f| f.offset == dir.expected_seq) else {
            break;
        };
        let frag = dir.buffered.remove(pos);
        dir.expected_seq = frag.end;
        delivered.extend_from_slice(&frag.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_segments_deliver_once_contiguous() {
        let mut tcp = TcpState::new();
        tcp.directions[0].initial_seq = Some(1000);
        tcp.directions[0].expected_seq = 1;
        tcp.directions[0].state = ConnState::Established;

        let a = vec![1u8; 100];
        let b = vec![2u8; 100];
        let c = vec![3u8; 100];

        match tcp.process_segment(Direction::Low, 0, 1001, &a) {
            SegmentOutcome::Deliver(bytes) => assert_eq!(bytes, a),
            other => panic!("expected delivery, got {other:?}"),
        }
        match tcp.process_segment(Direction::Low, 0, 1201, &c) {
            SegmentOutcome::Buffered(Status::TcpOutOfOrder) => {}
            other => panic!("expected out-of-order, got {other:?}"),
        }
        match tcp.process_segment(Direction::Low, 0, 1101, &b) {
            SegmentOutcome::Deliver(bytes) => {
                let mut expected = b.clone();
                expected.extend_from_slice(&c);
                assert_eq!(bytes, expected);
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_segment_after_acceptance_advances_no_state() {
        let mut tcp = TcpState::new();
        tcp.directions[0].initial_seq = Some(1000);
        tcp.directions[0].expected_seq = 1;
        tcp.directions[0].state = ConnState::Established;

        let a = vec![9u8; 50];
        tcp.process_segment(Direction::Low, 0, 1001, &a);
        let before = tcp.directions[0].expected_seq;
        match tcp.process_segment(Direction::Low, 0, 1001, &a) {
            SegmentOutcome::Buffered(Status::Ok) => {}
            other => panic!("expected duplicate drop, got {other:?}"),
        }
        assert_eq!(tcp.directions[0].expected_seq, before);
    }

    #[test]
    fn rst_terminates_both_directions() {
        let mut tcp = TcpState::new();
        assert!(matches!(
            tcp.process_segment(Direction::Low, tcp::RST, 1000, &[]),
            SegmentOutcome::Terminated
        ));
        assert_eq!(tcp.state(Direction::Low), ConnState::Closed);
        assert_eq!(tcp.state(Direction::High), ConnState::Closed);
    }
}
