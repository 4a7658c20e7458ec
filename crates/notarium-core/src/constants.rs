//! Protocol-wide constants for Notarium v0.

/// Protocol semantic version (v0).
pub const PROTOCOL_VERSION: u16 = 0;

/// Platform version advertised by this implementation in signatures and node info.
pub const PLATFORM_VERSION: u32 = 1;

/// Version of the canonical request serialization that signatures commit to.
///
/// Bumped whenever the Borsh layout of a signed request changes.
pub const SERIALIZATION_VERSION: u16 = 0;

/// Length in bytes of a 32-byte hash.
pub const HASH32_LEN: usize = 32;

/// Length in bytes of a privacy salt.
pub const PRIVACY_SALT_LEN: usize = 32;

/// Length in bytes of a compressed SEC1 secp256k1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Length in bytes of a fixed-size (r || s) ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;

/// Maximum nesting depth accepted for composite keys.
///
/// Bounds recursion when checking fulfilment of untrusted keys.
pub const MAX_COMPOSITE_DEPTH: usize = 8;

/// Domain separator for per-component nonces.
pub const DS_COMPONENT_NONCE: &[u8] = b"NOTARIUM::COMPONENT_NONCE::V0";

/// Domain separator for per-group nonces (empty-group placeholders).
pub const DS_GROUP_NONCE: &[u8] = b"NOTARIUM::GROUP_NONCE::V0";

/// Domain separator for component leaf hashes.
pub const DS_COMPONENT_LEAF: &[u8] = b"NOTARIUM::COMPONENT_LEAF::V0";

/// Domain separator for the root of an empty component group.
pub const DS_EMPTY_GROUP: &[u8] = b"NOTARIUM::EMPTY_GROUP::V0";

/// Domain separator for Merkle interior nodes.
pub const DS_MERKLE_NODE: &[u8] = b"NOTARIUM::MERKLE_NODE::V0";

/// Domain separator for signed notarisation requests.
pub const DS_NOTARISATION_REQUEST: &[u8] = b"NOTARIUM::NOTARISATION_REQUEST::V0";
