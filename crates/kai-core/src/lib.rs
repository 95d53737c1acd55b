//! Core domain + application logic for the Kai group-chat agent.
//!
//! This crate is intentionally transport-agnostic. The messaging platform, the
//! conversational reply service and durable storage live behind ports (traits)
//! implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod event_log;
pub mod identity;
pub mod logging;
pub mod membership;
pub mod messaging;
pub mod moderation;
pub mod pipeline;
pub mod ports;
pub mod records;
pub mod reply_gate;
pub mod state;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
