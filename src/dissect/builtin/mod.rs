//! Built-in example dissectors, enough to exercise the dispatcher end to end.

pub mod dns;
pub mod http;
