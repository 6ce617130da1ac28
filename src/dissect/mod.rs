//! L7 protocol identification and field extraction.
//!
//! A flow's candidate set starts as every registered dissector plausible for its L4 protocol and
//! port, then shrinks as dissectors rule themselves out, mirroring the probe/parse split in the
//! teacher's `ConnParsable` trait (`probe` → plausibility, `parse` → extraction) collapsed into
//! one call per candidate per delivery, since this engine has no separate protocol-detection
//! pre-pass.

pub mod builtin;

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::flowtable::L7State;
use crate::types::{dissector_ids, Accuracy, Direction, FieldStore, L7Protocol, RequestedFields};

/// What a dissector reports after looking at one delivered byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Protocol confirmed; no further candidates are tried for this flow.
    Match,
    /// Not this protocol; drop from the candidate set.
    NoMatch,
    /// Inconclusive; keep as a candidate and wait for more bytes.
    MoreData,
}

/// One pluggable L7 protocol identifier.
pub trait Dissector: Send + Sync {
    /// Stable id, used as the `L7Protocol::Other` discriminant for non-built-in dissectors.
    fn id(&self) -> u16;
    fn protocol(&self) -> L7Protocol;
    /// Whether this dissector is plausible for a flow with this L4 protocol and (destination)
    /// port. The default accepts everything, matching protocols with no fixed port convention.
    fn matches_port(&self, l4proto: u8, port: u16) -> bool {
        let _ = (l4proto, port);
        true
    }
    /// Inspects one delivered, in-order byte span and reports a verdict. Implementations write
    /// extracted fields into `fields` as they become available, even before returning `Match`,
    /// gating each write on `requested` so a caller that only wants a subset of fields doesn't
    /// pay for extracting the rest.
    fn dissect(
        &self,
        data: &[u8],
        direction: Direction,
        fields: &mut FieldStore,
        requested: &RequestedFields,
    ) -> Verdict;
}

/// Owns the registered dissectors and drives the per-flow candidate/trial-budget state machine.
pub struct Dispatcher {
    dissectors: Vec<Box<dyn Dissector>>,
    max_trials: usize,
    skip_ports: HashMap<u16, u16>,
    accuracy: HashMap<u16, Accuracy>,
    requested_fields: RequestedFields,
}

impl Dispatcher {
    /// An empty dispatcher configured from `config`'s dispatch-wide knobs (trial budget, skip
    /// ports, accuracy, requested fields). Register dissectors with [`Dispatcher::register`].
    pub fn new(config: &EngineConfig) -> Self {
        Dispatcher {
            dissectors: Vec::new(),
            max_trials: config.max_dissector_trials,
            skip_ports: config.l7_skip_ports.clone(),
            accuracy: config.accuracy.clone(),
            requested_fields: RequestedFields::new(config.fields.clone()),
        }
    }

    /// A dispatcher pre-loaded with this crate's built-in HTTP and DNS dissectors, each added
    /// only if its id is present in `config.l7_enabled`.
    pub fn with_builtins(config: &EngineConfig) -> Self {
        let mut dispatcher = Dispatcher::new(config);
        if config.l7_enabled.contains(&dissector_ids::HTTP) {
            dispatcher.register(Box::new(builtin::http::HttpDissector));
        }
        if config.l7_enabled.contains(&dissector_ids::DNS) {
            dispatcher.register(Box::new(builtin::dns::DnsDissector));
        }
        dispatcher
    }

    pub fn register(&mut self, dissector: Box<dyn Dissector>) {
        self.dissectors.push(dissector);
    }

    fn accuracy_for(&self, id: u16) -> Accuracy {
        self.accuracy.get(&id).copied().unwrap_or_default()
    }

    /// Feeds one delivered, in-order byte span for `l4proto`/`port` (the server-side port, used
    /// to narrow the initial candidate set) through whichever dissectors remain candidates.
    ///
    /// Once a protocol is confirmed, a `Low`-accuracy match (the default) drops every candidate
    /// so later calls are a no-op; a `High`-accuracy match keeps the matched dissector as the
    /// sole candidate so it keeps extracting fields from subsequent data without re-entering the
    /// trial budget or being able to flip the flow back to `Unknown`.
    pub fn dispatch(
        &self,
        l7: &mut L7State,
        l4proto: u8,
        port: u16,
        data: &[u8],
        direction: Direction,
        fields: &mut FieldStore,
    ) {
        if matches!(l7.identified, L7Protocol::Unknown) {
            return;
        }
        if matches!(l7.identified, L7Protocol::Pending) && l7.trials == 0 && l7.candidates.is_empty() {
            l7.candidates = self
                .dissectors
                .iter()
                .filter(|d| d.matches_port(l4proto, port))
                .filter(|d| self.skip_ports.get(&port) != Some(&d.id()))
                .map(|d| d.id())
                .collect();
            // No dissector was ever plausible for this L4 protocol/port; there is no trial budget
            // to exhaust, so finalise immediately instead of leaving the flow `Pending` forever.
            if l7.candidates.is_empty() {
                l7.identified = L7Protocol::Unknown;
                return;
            }
        }
        if data.is_empty() || l7.candidates.is_empty() {
            return;
        }

        let already_identified = !matches!(l7.identified, L7Protocol::Pending);
        if !already_identified {
            l7.trials += 1;
        }

        let mut remaining = Vec::with_capacity(l7.candidates.len());
        for id in &l7.candidates {
            let Some(dissector) = self.dissectors.iter().find(|d| d.id() == *id) else {
                continue;
            };
            match dissector.dissect(data, direction, fields, &self.requested_fields) {
                Verdict::Match => {
                    l7.identified = dissector.protocol();
                    l7.candidates = match self.accuracy_for(*id) {
                        Accuracy::High => vec![*id],
                        Accuracy::Low => Vec::new(),
                    };
                    return;
                }
                Verdict::NoMatch => {}
                Verdict::MoreData => remaining.push(*id),
            }
        }
        l7.candidates = remaining;

        if !already_identified && (l7.candidates.is_empty() || l7.trials >= self.max_trials) {
            l7.identified = L7Protocol::Unknown;
            l7.candidates.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowtable::L7State;

    fn config_with_trials(max_dissector_trials: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.max_dissector_trials = max_dissector_trials;
        config
    }

    #[test]
    fn unmatched_candidates_become_unknown_after_trial_budget() {
        let dispatcher = Dispatcher::with_builtins(&config_with_trials(2));
        let mut l7 = L7State::default();
        let mut fields = FieldStore::new();
        // Shorter than a DNS header, so every trial reports `MoreData` rather than ruling the
        // candidate out on the first call.
        let garbage = [0u8; 4];

        dispatcher.dispatch(
            &mut l7,
            crate::packet::udp::UDP_PROTOCOL,
            53,
            &garbage,
            Direction::Low,
            &mut fields,
        );
        assert!(!matches!(l7.identified, L7Protocol::Unknown));
        dispatcher.dispatch(
            &mut l7,
            crate::packet::udp::UDP_PROTOCOL,
            53,
            &garbage,
            Direction::Low,
            &mut fields,
        );
        assert!(matches!(l7.identified, L7Protocol::Unknown));
    }

    #[test]
    fn once_identified_candidates_freeze_at_low_accuracy() {
        let dispatcher = Dispatcher::with_builtins(&config_with_trials(10));
        let mut l7 = L7State::default();
        let mut fields = FieldStore::new();
        let request = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        dispatcher.dispatch(&mut l7, 6, 80, request, Direction::Low, &mut fields);
        assert!(matches!(l7.identified, L7Protocol::Http));
        assert!(l7.candidates.is_empty());
        dispatcher.dispatch(&mut l7, 6, 80, request, Direction::Low, &mut fields);
        assert!(l7.candidates.is_empty());
    }

    #[test]
    fn high_accuracy_keeps_feeding_the_matched_dissector() {
        let mut config = config_with_trials(10);
        config.accuracy.insert(dissector_ids::HTTP, Accuracy::High);
        let dispatcher = Dispatcher::with_builtins(&config);
        let mut l7 = L7State::default();
        let mut fields = FieldStore::new();
        let request = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        dispatcher.dispatch(&mut l7, 6, 80, request, Direction::Low, &mut fields);
        assert!(matches!(l7.identified, L7Protocol::Http));
        assert_eq!(l7.candidates, vec![dissector_ids::HTTP]);

        // A later delivery keeps being fed to the matched dissector instead of being ignored.
        let another = b"GET /again HTTP/1.1\r\nHost: example.org\r\n\r\n";
        dispatcher.dispatch(&mut l7, 6, 80, another, Direction::Low, &mut fields);
        assert!(matches!(l7.identified, L7Protocol::Http));
        assert_eq!(
            fields.get(crate::types::fields::HTTP_HOST),
            Some(&crate::types::FieldValue::String("example.org".to_string()))
        );
    }

    #[test]
    fn l7_enabled_excludes_unlisted_builtins() {
        let mut config = EngineConfig::default();
        config.l7_enabled.remove(&dissector_ids::DNS);
        let dispatcher = Dispatcher::with_builtins(&config);
        let mut l7 = L7State::default();
        let mut fields = FieldStore::new();
        let query = [0u8; 12];

        dispatcher.dispatch(&mut l7, crate::packet::udp::UDP_PROTOCOL, 53, &query, Direction::Low, &mut fields);
        assert!(matches!(l7.identified, L7Protocol::Unknown));
    }
}
