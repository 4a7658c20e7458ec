#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Notarium transaction model (v0).
//!
//! Responsibilities:
//! - Lay out transaction parts as ordered component groups
//! - Commit to them with a privacy-salted Merkle tree (the transaction id)
//! - Produce and verify tear-offs that reveal only selected groups
//!
//! Contract verification is not performed here; outputs and commands are
//! opaque payloads.

pub mod builder;
pub mod component_group;
pub mod error;
pub mod filtered;
pub mod merkle;
pub mod states;
pub mod wire;

pub use builder::*;
pub use component_group::*;
pub use error::*;
pub use filtered::*;
pub use merkle::*;
pub use states::*;
pub use wire::*;
