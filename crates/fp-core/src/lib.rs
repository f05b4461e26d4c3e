//! Core domain + parsing logic for a FunPay web-interface client.
//!
//! This crate is intentionally transport-agnostic: it turns raw
//! HTML/JSON payloads into typed domain objects (taxonomy, chats,
//! messages, throttle verdicts) and keeps per-session state coherent.
//! The request layer lives behind a port (trait) implemented in an
//! adapter crate.

pub mod chat;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod markup;
pub mod phrases;
pub mod ports;
pub mod session;
pub mod taxonomy;
pub mod throttle;

pub use errors::{Error, Result};
