//! Integer status codes returned alongside a [`DissectionInfo`](crate::dissection_info::DissectionInfo).
//!
//! Negative values are errors; zero and positive values report progress. Every dissection
//! entrypoint is total: it always returns a status and whatever [`DissectionInfo`] could be
//! populated up to the last layer that parsed successfully.

/// Status code returned by a dissection entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum Status {
    /// Dissection completed without anything noteworthy to report.
    Ok = 0,
    /// The packet is a fragment of a larger IP datagram; the caller should move on.
    IpFragment = 1,
    /// The packet completed a fragmented IP datagram. The caller owns the rebuilt buffer
    /// referenced from `DissectionInfo::l3::refrag_pkt`.
    IpDataRebuilt = 2,
    /// The TCP segment arrived out of order and was buffered pending earlier data.
    TcpOutOfOrder = 3,
    /// The TCP connection has terminated (RST, or both directions FIN'd).
    TcpConnectionTerminated = 4,
    /// L2 framing could not be parsed.
    ErrorL2Parsing = -1,
    /// L3 (IP) header could not be parsed.
    ErrorL3Parsing = -2,
    /// L4 (TCP/UDP) header could not be parsed.
    ErrorL4Parsing = -3,
    /// The packet is neither IPv4 nor IPv6.
    ErrorWrongIpVersion = -4,
    /// The packet carries IPsec, which this engine does not decrypt.
    ErrorIpsecNotSupported = -5,
    /// The IPv6 header chain could not be parsed.
    ErrorIpv6HdrParsing = -6,
    /// The flow table is full and no flow could be evicted to make room (strict mode, or no
    /// evictable flow in non-strict mode).
    ErrorMaxFlows = -7,
}

impl Status {
    /// Returns `true` if this status represents an error (negative code).
    #[inline]
    pub fn is_error(&self) -> bool {
        (*self as i8) < 0
    }

    /// Returns the raw integer status code, matching the wire contract in the specification.
    #[inline]
    pub fn code(&self) -> i8 {
        *self as i8
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Status::Ok => "everything is ok",
            Status::IpFragment => "received datagram is a fragment of a bigger datagram",
            Status::IpDataRebuilt => {
                "received datagram was the last fragment; the original has been recomposed"
            }
            Status::TcpOutOfOrder => "received TCP segment is out of order and was buffered",
            Status::TcpConnectionTerminated => "TCP connection is terminated",
            Status::ErrorL2Parsing => "L2 data is unsupported, truncated, or corrupted",
            Status::ErrorL3Parsing => "L3 data is unsupported, truncated, or corrupted",
            Status::ErrorL4Parsing => "L4 data is unsupported, truncated, or corrupted",
            Status::ErrorWrongIpVersion => "packet is neither IPv4 nor IPv6",
            Status::ErrorIpsecNotSupported => "packet is IPsec-encrypted, which is not supported",
            Status::ErrorIpv6HdrParsing => "IPv6 header chain could not be parsed",
            Status::ErrorMaxFlows => "maximum number of active flows has been reached",
        };
        write!(f, "{}", msg)
    }
}
