//! One lock-sharded partition of the flow table.
//!
//! Backed by `hashlink::LinkedHashMap`, the same structure the teacher's `ConnTracker` uses for
//! its connection table: a regular hash map threaded with an insertion/access order list, giving
//! O(1) lookup, O(1) move-to-back on touch, and O(1) pop-front for LRU eviction. This subsumes
//! the specification's hand-rolled "bucket chain + LRU list" design — collision handling is the
//! underlying `HashMap`'s, not a manually probed chain, so `max_trials` (kept on
//! [`crate::config::EngineConfig`] for interface parity) has no effect here; see the design
//! ledger.

use hashlink::LinkedHashMap;

use super::key::FlowKey;
use super::record::FlowRecord;

/// Returned when a partition is full, `strict` eviction is configured, and no new flow can be
/// admitted.
#[derive(Debug, Clone, Copy)]
pub struct MaxFlowsError;

pub(crate) struct Partition {
    map: LinkedHashMap<FlowKey, FlowRecord>,
    max_active_flows: usize,
    strict: bool,
}

impl Partition {
    /// `capacity_hint` pre-sizes the backing map from `EngineConfig::expected_flows`; it is a
    /// sizing hint only, never a ceiling (that's `max_active_flows`).
    pub(crate) fn new(max_active_flows: usize, strict: bool, capacity_hint: usize) -> Self {
        Partition {
            map: LinkedHashMap::with_capacity(capacity_hint),
            max_active_flows: max_active_flows.max(1),
            strict,
        }
    }

    pub(crate) fn active_count(&self) -> usize {
        self.map.len()
    }

    /// Looks up `key`, touching it to the back of the LRU order on a hit, or creates it. On a
    /// miss with the partition full: evicts the LRU flow via `cleaner` in non-strict mode, or
    /// returns [`MaxFlowsError`] without admitting the new flow in strict mode.
    pub(crate) fn lookup_or_create(
        &mut self,
        key: FlowKey,
        now: u64,
        cleaner: &mut dyn FnMut(FlowRecord),
    ) -> Result<(&mut FlowRecord, bool), MaxFlowsError> {
        if self.map.contains_key(&key) {
            self.map.to_back(&key);
            let flow = self.map.get_mut(&key).expect("checked contains_key above");
            flow.touch(now);
            return Ok((flow, false));
        }

        if self.map.len() >= self.max_active_flows {
            if self.strict {
                return Err(MaxFlowsError);
            }
            if let Some((_, evicted)) = self.map.pop_front() {
                cleaner(evicted);
            }
        }

        self.map.insert(key, FlowRecord::new(key, now));
        let flow = self.map.get_mut(&key).expect("just inserted");
        Ok((flow, true))
    }

    pub(crate) fn remove(&mut self, key: &FlowKey) -> Option<FlowRecord> {
        self.map.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn key(port: u16) -> FlowKey {
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        FlowKey::canonicalize(a, port, b, 80, 6).0
    }

    #[test]
    fn evicts_lru_when_full_non_strict() {
        let mut partition = Partition::new(2, false, 2);
        let mut cleaned = Vec::new();
        let mut cleaner = |f: FlowRecord| cleaned.push(f.key);

        partition.lookup_or_create(key(1), 0, &mut cleaner).unwrap();
        partition.lookup_or_create(key(2), 0, &mut cleaner).unwrap();
        // Touch key(1) so key(2) becomes the LRU victim.
        partition.lookup_or_create(key(1), 1, &mut cleaner).unwrap();
        partition.lookup_or_create(key(3), 2, &mut cleaner).unwrap();

        assert_eq!(cleaned, vec![key(2)]);
        assert_eq!(partition.active_count(), 2);
    }

    #[test]
    fn strict_mode_rejects_when_full() {
        let mut partition = Partition::new(1, true, 1);
        let mut cleaner = |_: FlowRecord| {};
        partition.lookup_or_create(key(1), 0, &mut cleaner).unwrap();
        assert!(partition.lookup_or_create(key(2), 1, &mut cleaner).is_err());
    }
}
