//! The partitioned, lock-sharded flow table.

mod key;
mod partition;
mod record;

pub use key::FlowKey;
pub use record::{DirectionCounters, FlowRecord, L7State};

use std::net::IpAddr;
use std::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::DissectError;
use crate::status::Status;
use crate::types::Direction;

use partition::Partition;

/// A partitioned hash table mapping canonical 5-tuples to [`FlowRecord`]s.
///
/// Each partition carries its own lock; a packet touches exactly one partition's lock for its
/// entire per-flow processing (flow lookup, TCP reorder, L7 dispatch), so different partitions
/// proceed fully in parallel and no intra-flow race is possible by construction.
pub struct FlowTable {
    partitions: Vec<Mutex<Partition>>,
}

impl FlowTable {
    pub fn new(config: &EngineConfig) -> Self {
        let partition_count = config.partitions.max(1);
        let per_partition = (config.max_active_flows / partition_count).max(1);
        let capacity_hint = (config.expected_flows / partition_count).max(1);
        let partitions = (0..partition_count)
            .map(|_| Mutex::new(Partition::new(per_partition, config.strict, capacity_hint)))
            .collect();
        FlowTable { partitions }
    }

    fn partition_index(&self, key_hash: u32) -> usize {
        (key_hash as usize) % self.partitions.len()
    }

    /// Looks up (or creates) the flow for a packet's 4-tuple plus L4 protocol, then invokes `f`
    /// with the flow record and the direction this packet took through the canonical key, while
    /// still holding the owning partition's lock.
    ///
    /// `cleaner` runs for any flow evicted to make room (never for the flow `f` operates on).
    pub fn with_flow<R>(
        &self,
        src_addr: IpAddr,
        src_port: u16,
        dst_addr: IpAddr,
        dst_port: u16,
        l4proto: u8,
        now: u64,
        cleaner: &mut dyn FnMut(FlowRecord),
        f: impl FnOnce(&mut FlowRecord, Direction, bool) -> R,
    ) -> Result<R, Status> {
        let (key, direction) = FlowKey::canonicalize(src_addr, src_port, dst_addr, dst_port, l4proto);
        let idx = self.partition_index(key.hash());
        let mut partition = self.partitions[idx].lock().unwrap();
        let (flow, is_new) = partition
            .lookup_or_create(key, now, cleaner)
            .map_err(|_| Status::from(DissectError::MaxFlows))?;
        Ok(f(flow, direction, is_new))
    }

    /// Removes a flow outright, e.g. on TCP termination. Returns it so the caller can run any
    /// cleanup (dissector teardown, field-store release) outside the partition lock.
    pub fn evict(&self, key: &FlowKey) -> Option<FlowRecord> {
        let idx = self.partition_index(key.hash());
        self.partitions[idx].lock().unwrap().remove(key)
    }

    /// Total active flows across all partitions.
    pub fn active_count(&self) -> usize {
        self.partitions.iter().map(|p| p.lock().unwrap().active_count()).sum()
    }
}
