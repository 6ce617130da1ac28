//! Shared scalar types: protocol identifiers, accuracy levels, and the sparse field store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifies an application-layer protocol a dissector can confirm.
///
/// Built-in dissectors populate [`L7Protocol::Http`] and [`L7Protocol::Dns`]; callers
/// registering their own dissectors use [`L7Protocol::Other`] with a stable numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum L7Protocol {
    /// No protocol confirmed yet; candidates are still being tried.
    Pending,
    /// No candidate matched within the trial budget.
    Unknown,
    Http,
    Dns,
    /// Any dissector not built into this crate, identified by a caller-assigned id.
    Other(u16),
}

/// Per-protocol identification accuracy knob.
///
/// `High` forces full field extraction even after a protocol has been confirmed; `Low` allows a
/// dissector to short-circuit once identification is firm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Accuracy {
    #[default]
    Low,
    High,
}

/// A field id is a small integer; dissectors agree out-of-band on which ids they populate.
pub type FieldId = u32;

/// A `(name, value)` pair, e.g. one HTTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub first: String,
    pub second: String,
}

/// The value carried by one extracted field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(i64),
    ArrayOfPair(Vec<Pair>),
    ArrayOfString(Vec<String>),
}

/// A sparse, per-protocol slot map of extracted fields, indexed by [`FieldId`].
///
/// Mirrors the specification's `{string | number | array-of-pair | array-of-string}` tagged
/// field with a `present` flag: a missing key in the map *is* "not present".
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    fields: HashMap<FieldId, FieldValue>,
}

impl FieldStore {
    pub fn new() -> Self {
        FieldStore::default()
    }

    pub fn present(&self, id: FieldId) -> bool {
        self.fields.contains_key(&id)
    }

    pub fn get(&self, id: FieldId) -> Option<&FieldValue> {
        self.fields.get(&id)
    }

    pub fn set(&mut self, id: FieldId, value: FieldValue) {
        self.fields.insert(id, value);
    }

    /// Appends to an array-of-pair field, creating it if absent.
    pub fn push_pair(&mut self, id: FieldId, pair: Pair) {
        match self.fields.entry(id).or_insert_with(|| FieldValue::ArrayOfPair(Vec::new())) {
            FieldValue::ArrayOfPair(v) => v.push(pair),
            _ => log::error!("field {id} already holds a non-pair-array value"),
        }
    }

    /// Appends to an array-of-string field, creating it if absent.
    pub fn push_string(&mut self, id: FieldId, s: String) {
        match self
            .fields
            .entry(id)
            .or_insert_with(|| FieldValue::ArrayOfString(Vec::new()))
        {
            FieldValue::ArrayOfString(v) => v.push(s),
            _ => log::error!("field {id} already holds a non-string-array value"),
        }
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &FieldValue)> {
        self.fields.iter()
    }
}

/// A sparse, default-permissive switch consulted by a dissector before it writes a field.
///
/// A [`FieldId`] absent from the underlying map is treated as requested, mirroring the rest of
/// this crate's sparse-map-means-"not set-to-something-unusual" convention; a caller narrows
/// extraction by explicitly setting the fields it does *not* want to `false` in
/// [`crate::config::EngineConfig::fields`].
#[derive(Debug, Clone, Default)]
pub struct RequestedFields(HashMap<FieldId, bool>);

impl RequestedFields {
    pub fn new(fields: HashMap<FieldId, bool>) -> Self {
        RequestedFields(fields)
    }

    pub fn is_enabled(&self, id: FieldId) -> bool {
        self.0.get(&id).copied().unwrap_or(true)
    }
}

/// Which side of a bidirectional flow sent the current packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The packet's source matches the flow key's `addr_low`/`port_low` side.
    Low,
    /// The packet's source matches the flow key's `addr_high`/`port_high` side.
    High,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Low => Direction::High,
            Direction::High => Direction::Low,
        }
    }

    /// Indexes a `[T; 2]` of per-direction state.
    pub fn index(self) -> usize {
        match self {
            Direction::Low => 0,
            Direction::High => 1,
        }
    }
}

/// Well-known field ids used by the built-in example dissectors.
pub mod fields {
    use super::FieldId;

    pub const HTTP_HEADERS: FieldId = 100;
    pub const HTTP_HOST: FieldId = 101;
    pub const DNS_QUERY_NAME: FieldId = 200;
}

/// Stable ids for the built-in dissectors, shared between their [`crate::dissect::Dissector::id`]
/// implementations and [`crate::config::EngineConfig`]'s default `l7_enabled` set.
pub mod dissector_ids {
    pub const HTTP: u16 = 1;
    pub const DNS: u16 = 2;
}
