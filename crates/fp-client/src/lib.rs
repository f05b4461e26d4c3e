//! Request-layer adapter for the fp-core engine: a reqwest-backed
//! transport plus a high-level account facade.
//!
//! Everything stateful about parsing lives in `fp-core`; this crate
//! owns URLs, cookies, and payload assembly.

pub mod account;
pub mod http;

pub use account::{Account, RaiseOutcome, SendReply};
pub use http::HttpTransport;
