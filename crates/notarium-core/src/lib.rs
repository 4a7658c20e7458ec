#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Notarium core: canonical types, constants, hashing, nonces, keys and
//! signed node-identity documents.

pub mod constants;
pub mod crypto;
pub mod node_info;
pub mod nonce;
pub mod serialization;
pub mod time_window;
pub mod types;

pub use constants::*;
pub use crypto::*;
pub use node_info::*;
pub use nonce::*;
pub use serialization::*;
pub use time_window::*;
pub use types::*;
