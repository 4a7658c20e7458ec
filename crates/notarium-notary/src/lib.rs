#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Notarium notary (v0).
//!
//! This crate is responsible for:
//! - the signed notarisation request/response protocol
//! - time-window checks against an injected clock
//! - uniqueness providers (double-spend detection), volatile and durable
//! - the notary service flow tying them together
//!
//! It does not verify contract rules and does not include networking.

pub mod error;
pub mod persistent;
pub mod request;
pub mod service;
pub mod time_window;
pub mod uniqueness;

pub use error::*;
pub use persistent::*;
pub use request::*;
pub use service::*;
pub use time_window::*;
pub use uniqueness::*;
