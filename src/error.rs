//! Typed errors at the library boundary.
//!
//! Following this crate family's convention, `thiserror` types carry errors that are part of the
//! public status taxonomy (surfaced to callers via [`crate::status::Status`]). Internal plumbing
//! (arena/table access) has no fallible paths beyond programmer-error invariants, which panic via
//! `.expect()` rather than threading a `Result` nothing calls ever recovers from.

use thiserror::Error;

/// Errors produced while decoding a single packet layer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissectError {
    #[error("L2 framing could not be parsed")]
    L2Parse,
    #[error("L3 header could not be parsed")]
    L3Parse,
    #[error("L4 header could not be parsed")]
    L4Parse,
    #[error("packet is neither IPv4 nor IPv6")]
    WrongIpVersion,
    #[error("IPsec payloads are not supported")]
    IpsecNotSupported,
    #[error("IPv6 extension header chain could not be parsed")]
    Ipv6HeaderParse,
    #[error("maximum number of active flows has been reached")]
    MaxFlows,
}

impl From<DissectError> for crate::status::Status {
    fn from(e: DissectError) -> Self {
        use crate::status::Status;
        match e {
            DissectError::L2Parse => Status::ErrorL2Parsing,
            DissectError::L3Parse => Status::ErrorL3Parsing,
            DissectError::L4Parse => Status::ErrorL4Parsing,
            DissectError::WrongIpVersion => Status::ErrorWrongIpVersion,
            DissectError::IpsecNotSupported => Status::ErrorIpsecNotSupported,
            DissectError::Ipv6HeaderParse => Status::ErrorIpv6HdrParsing,
            DissectError::MaxFlows => Status::ErrorMaxFlows,
        }
    }
}
