//! Transport-facing abstractions (inbound events, outgoing text, the transport port).

pub mod port;
pub mod timed;
pub mod types;
