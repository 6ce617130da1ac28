//! A deep packet inspection pipeline: IP fragment reassembly, a sharded flow table, TCP stream
//! reordering, and candidate-based L7 dissector dispatch.
//!
//! The entrypoint is [`state::Engine`], which owns every long-lived piece of state (reassembly
//! handles, the flow table, the dissector dispatcher) and exposes three dissection calls for
//! packets captured at increasing layers:
//!
//! - [`state::Engine::dissect_from_l2`] for frames that still carry link-layer framing
//! - [`state::Engine::dissect_from_l3`] for packets starting at the IP header
//!
//! Both recurse through IP reassembly, flow lookup, TCP reordering, and L7 dispatch, returning a
//! [`status::Status`] alongside a fully populated [`dissection_info::DissectionInfo`].
//!
//! ```no_run
//! use peafowl_core::config::EngineConfig;
//! use peafowl_core::state::{Datalink, Engine};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let (status, info) = engine.dissect_from_l2(&[], 0, Datalink::Ethernet);
//! println!("{:?} {:?}", status, info);
//! ```

pub mod config;
pub mod dissect;
pub mod dissection_info;
pub mod error;
pub mod flowtable;
mod hash;
pub mod packet;
pub mod reassembly;
pub mod state;
pub mod status;
mod tcp_reorder;
pub mod types;

pub use config::EngineConfig;
pub use state::{Datalink, Engine};
pub use status::Status;
