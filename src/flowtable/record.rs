//! The per-flow record stored in a flow table partition.

use crate::tcp_reorder::TcpState;
use crate::types::{FieldStore, L7Protocol};

use super::key::FlowKey;

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectionCounters {
    pub packets: u64,
    pub bytes: u64,
}

/// Per-flow L7 identification progress.
#[derive(Debug, Clone)]
pub struct L7State {
    /// Dissector ids still plausible; emptied on `MATCH` or exhaustion.
    pub candidates: Vec<u16>,
    pub identified: L7Protocol,
    /// Number of dispatch attempts made so far, counted toward `max_dissector_trials`.
    pub trials: usize,
}

impl Default for L7State {
    fn default() -> Self {
        L7State { candidates: Vec::new(), identified: L7Protocol::Pending, trials: 0 }
    }
}

/// Everything the engine tracks for one 5-tuple, for as long as the flow is active.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub key: FlowKey,
    pub created_at: u64,
    pub last_seen: u64,
    /// Indexed by [`crate::types::Direction`] (`Low` = 0, `High` = 1).
    pub counters: [DirectionCounters; 2],
    /// `Some` only once the flow's L4 protocol is confirmed TCP.
    pub tcp: Option<TcpState>,
    pub l7: L7State,
    pub fields: FieldStore,
}

impl FlowRecord {
    pub fn new(key: FlowKey, now: u64) -> Self {
        FlowRecord {
            key,
            created_at: now,
            last_seen: now,
            counters: [DirectionCounters::default(); 2],
            tcp: None,
            l7: L7State::default(),
            fields: FieldStore::new(),
        }
    }

    pub fn touch(&mut self, now: u64) {
        self.last_seen = now;
    }
}
