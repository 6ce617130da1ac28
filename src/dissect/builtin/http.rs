//! A minimal HTTP/1.x request dissector.
//!
//! Adapted from the probe/parse split in `retina_core::protocols::stream::http::parser`: a quick
//! method-prefix check stands in for `probe`, and `httparse::Request::parse` stands in for
//! `parse`. Unlike the teacher, this dissector has no pipelined-transaction tracking — it
//! inspects one delivered byte span and reports a verdict, matching the specification's
//! stateless-per-candidate dispatch contract.

use httparse::{Request, EMPTY_HEADER};

use super::super::{Dissector, Verdict};
use crate::types::{dissector_ids, fields, Direction, FieldStore, FieldValue, L7Protocol, Pair, RequestedFields};

const NUM_HEADERS: usize = 32;

pub struct HttpDissector;

/// Request-line method prefixes long enough to rule out non-HTTP traffic early, adapted from the
/// same prefix table in the teacher's `probe`.
const METHOD_PREFIXES: &[&[u8]] =
    &[b"GET ", b"HEAD", b"POST", b"PUT ", b"PATC", b"DELE", b"OPTI", b"CONN", b"TRAC"];

impl Dissector for HttpDissector {
    fn id(&self) -> u16 {
        dissector_ids::HTTP
    }

    fn protocol(&self) -> L7Protocol {
        L7Protocol::Http
    }

    fn matches_port(&self, l4proto: u8, port: u16) -> bool {
        l4proto == crate::packet::tcp::TCP_PROTOCOL && port == 80
    }

    fn dissect(
        &self,
        data: &[u8],
        _direction: Direction,
        field_store: &mut FieldStore,
        requested: &RequestedFields,
    ) -> Verdict {
        if data.len() < 4 {
            return Verdict::MoreData;
        }
        if !METHOD_PREFIXES.iter().any(|p| data.starts_with(p)) {
            return Verdict::NoMatch;
        }

        let mut headers = [EMPTY_HEADER; NUM_HEADERS];
        let mut request = Request::new(&mut headers);
        match request.parse(data) {
            Ok(httparse::Status::Complete(_)) => {
                for header in request.headers.iter() {
                    if requested.is_enabled(fields::HTTP_HEADERS) {
                        let value = String::from_utf8_lossy(header.value).into_owned();
                        field_store.push_pair(
                            fields::HTTP_HEADERS,
                            Pair { first: header.name.to_string(), second: value },
                        );
                    }
                    if requested.is_enabled(fields::HTTP_HOST) && header.name.eq_ignore_ascii_case("host") {
                        let value = String::from_utf8_lossy(header.value).into_owned();
                        field_store.set(fields::HTTP_HOST, FieldValue::String(value));
                    }
                }
                Verdict::Match
            }
            Ok(httparse::Status::Partial) => Verdict::MoreData,
            Err(_) => Verdict::NoMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_complete_get_request_and_extracts_host() {
        let dissector = HttpDissector;
        let mut fields = FieldStore::new();
        let requested = RequestedFields::default();
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let verdict = dissector.dissect(request, Direction::Low, &mut fields, &requested);
        assert_eq!(verdict, Verdict::Match);
        assert_eq!(
            fields.get(fields::HTTP_HOST),
            Some(&FieldValue::String("example.com".to_string()))
        );
    }

    #[test]
    fn host_is_not_extracted_once_its_field_is_disabled() {
        let dissector = HttpDissector;
        let mut fields = FieldStore::new();
        let requested = RequestedFields::new(std::collections::HashMap::from([(fields::HTTP_HOST, false)]));
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let verdict = dissector.dissect(request, Direction::Low, &mut fields, &requested);
        assert_eq!(verdict, Verdict::Match);
        assert!(!fields.present(fields::HTTP_HOST));
    }

    #[test]
    fn rejects_non_http_prefix() {
        let dissector = HttpDissector;
        let mut fields = FieldStore::new();
        let requested = RequestedFields::default();
        let verdict = dissector.dissect(b"\x16\x03\x01\x00\xa5", Direction::Low, &mut fields, &requested);
        assert_eq!(verdict, Verdict::NoMatch);
    }

    #[test]
    fn waits_for_more_data_on_partial_request() {
        let dissector = HttpDissector;
        let mut fields = FieldStore::new();
        let requested = RequestedFields::default();
        let verdict =
            dissector.dissect(b"GET /index.html HTTP/1.1\r\nHost: ex", Direction::Low, &mut fields, &requested);
        assert_eq!(verdict, Verdict::MoreData);
    }
}
