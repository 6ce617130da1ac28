//! Fragment reassembly: bounded-memory IPv4 and IPv6 datagram reconstruction.

mod arena;
pub(crate) mod fragment;
pub mod ipv4;
pub mod ipv6;

pub use ipv4::{Completion as Ipv4Completion, Ipv4Reassembly};
pub use ipv6::{Completion as Ipv6Completion, Ipv6Reassembly};
