//! Configuration options.
//!
//! Mirrors the options enumerated in the specification's external-interfaces section:
//! flow-table sizing and strictness, partition count, per-protocol accuracy and field
//! extraction, and the optional IPv4/IPv6 defragmentation and TCP reordering toggles.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{dissector_ids, Accuracy, FieldId};

/// Loads an [`EngineConfig`] from a TOML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> EngineConfig {
    let config_str = fs::read_to_string(path).expect("ERROR: File read failed");
    toml::from_str(&config_str).expect("Invalid config file")
}

/// Returns the default [`EngineConfig`]. Matches the defaults `peafowl_init()` uses in the
/// original source: one table partition, non-strict eviction, defragmentation and TCP
/// reordering both enabled.
pub fn default_config() -> EngineConfig {
    EngineConfig::default()
}

/* --------------------------------------------------------------------------------- */

/// Top-level engine configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Hint used to pre-size each partition's backing map. Defaults to `32_768`, divided evenly
    /// across partitions; an undersized hint just costs a few extra reallocations as flows fill
    /// in, it is never a hard ceiling (that's `max_active_flows`).
    pub expected_flows: usize,
    /// If `true`, a full flow table with no evictable flow reports
    /// [`Status::ErrorMaxFlows`](crate::status::Status::ErrorMaxFlows) instead of evicting.
    pub strict: bool,
    /// Number of lock-sharded partitions in the flow table. Defaults to `1`.
    pub partitions: usize,
    /// Maximum active flows per partition before eviction (or rejection, if `strict`) kicks in.
    pub max_active_flows: usize,
    /// Maximum linear-probe length within a partition's bucket before giving up. Defaults to `32`.
    pub max_trials: usize,
    /// Number of L7 dissector trials per flow before falling back to `UNKNOWN`.
    pub max_dissector_trials: usize,
    /// Whether TCP stream reordering is enabled.
    pub tcp_reordering: bool,
    /// Maximum out-of-order TCP segments buffered per flow direction before the flow is dropped.
    pub max_out_of_order_segments: usize,
    /// IPv4 defragmentation settings, or `None` to disable.
    pub ipv4_defrag: Option<DefragConfig>,
    /// IPv6 defragmentation settings, or `None` to disable.
    pub ipv6_defrag: Option<DefragConfig>,
    /// Dissector ids [`crate::dissect::Dispatcher::with_builtins`] registers. A built-in
    /// dissector whose id is absent here is never added to the candidate pool. Defaults to both
    /// built-ins (`dissector_ids::HTTP`, `dissector_ids::DNS`).
    pub l7_enabled: HashSet<u16>,
    /// Per-port overrides excluding one dissector id from that port's candidate set.
    pub l7_skip_ports: HashMap<u16, u16>,
    /// Per-protocol field-extraction accuracy; a protocol id absent from the map uses
    /// [`Accuracy::Low`].
    pub accuracy: HashMap<u16, Accuracy>,
    /// Per-field extraction toggle; a field id absent from the map is extracted by default.
    pub fields: HashMap<FieldId, bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            expected_flows: default_expected_flows(),
            strict: false,
            partitions: 1,
            max_active_flows: default_max_active_flows(),
            max_trials: default_max_trials(),
            max_dissector_trials: default_max_dissector_trials(),
            tcp_reordering: true,
            max_out_of_order_segments: default_max_out_of_order(),
            ipv4_defrag: Some(DefragConfig::default_v4()),
            ipv6_defrag: Some(DefragConfig::default_v6()),
            l7_enabled: default_l7_enabled(),
            l7_skip_ports: HashMap::new(),
            accuracy: HashMap::new(),
            fields: HashMap::new(),
        }
    }
}

fn default_l7_enabled() -> HashSet<u16> {
    HashSet::from([dissector_ids::HTTP, dissector_ids::DNS])
}

fn default_expected_flows() -> usize {
    32_768
}

fn default_max_active_flows() -> usize {
    1_000_000
}

fn default_max_trials() -> usize {
    32
}

fn default_max_dissector_trials() -> usize {
    10
}

fn default_max_out_of_order() -> usize {
    100
}

/// Per-IP-version fragment reassembly settings.
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct DefragConfig {
    /// Number of buckets in the reassembly source hash table.
    pub table_size: u16,
    /// Per-source memory ceiling, in bytes, before the oldest flow of that source is dropped.
    pub per_host_limit: u32,
    /// Global memory ceiling, in bytes, across all sources.
    pub total_limit: u32,
    /// Seconds an incomplete datagram may sit before its flow expires.
    pub timeout_s: u8,
}

impl DefragConfig {
    /// Matches `PFWL_IPv4_FRAGMENTATION_DEFAULT_*` in the original source.
    pub fn default_v4() -> Self {
        DefragConfig {
            table_size: 512,
            per_host_limit: 1024 * 1024,
            total_limit: 8 * 1024 * 1024,
            timeout_s: 30,
        }
    }

    /// Matches `PFWL_IPv6_FRAGMENTATION_DEFAULT_*` in the original source.
    pub fn default_v6() -> Self {
        DefragConfig {
            table_size: 512,
            per_host_limit: 1024 * 1024,
            total_limit: 8 * 1024 * 1024,
            timeout_s: 60,
        }
    }
}

impl Default for DefragConfig {
    fn default() -> Self {
        DefragConfig::default_v4()
    }
}
