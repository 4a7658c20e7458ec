//! Keys, signatures and composite keys.
//!
//! Important: this crate does NOT implement novel cryptography. Signing and
//! verification are ECDSA over secp256k1 from the audited `k256` crate; this
//! module only fixes the wire shapes and the composite-key fulfilment rule.

use core::fmt;

use borsh::io::{Error as IoError, ErrorKind, Read};
use borsh::{BorshDeserialize, BorshSerialize};
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Errors produced by key handling and signature checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Key bytes do not decode to a usable key, or the key cannot verify.
    #[error("invalid key: {0}")]
    InvalidKey(&'static str),

    /// Signature bytes are malformed or do not verify.
    #[error("signature verification failed")]
    InvalidSignature,

    /// A composite key violated its structural rules.
    #[error("invalid composite key: {0}")]
    InvalidCompositeKey(&'static str),

    /// The signing keys do not satisfy the required key.
    #[error("insufficient signatures to fulfil the signing requirement")]
    InsufficientSignatures,
}

/// Compressed SEC1 secp256k1 public key.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Secp256k1Key(#[cfg_attr(feature = "serde", serde(with = "hex_key"))] pub [u8; PUBLIC_KEY_LEN]);

impl Secp256k1Key {
    /// Parse and validate a compressed SEC1 encoding.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let vk = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|_| CryptoError::InvalidKey("not a secp256k1 point"))?;
        Ok(Self::from_verifying_key(&vk))
    }

    fn from_verifying_key(vk: &VerifyingKey) -> Self {
        let point = vk.to_encoded_point(true);
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(point.as_bytes());
        Self(out)
    }

    /// Returns the compressed encoding.
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Verify `signature` over `msg`.
    pub fn verify(&self, msg: &[u8], signature: &DigitalSignature) -> Result<(), CryptoError> {
        let vk = VerifyingKey::from_sec1_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidKey("not a secp256k1 point"))?;
        let sig = Signature::from_slice(&signature.0).map_err(|_| CryptoError::InvalidSignature)?;
        vk.verify(msg, &sig).map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for Secp256k1Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secp256k1Key({})", hex::encode(self.0))
    }
}

impl fmt::Display for Secp256k1Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(feature = "serde")]
mod hex_key {
    use super::PUBLIC_KEY_LEN;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; PUBLIC_KEY_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; PUBLIC_KEY_LEN], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("public key must be 33 bytes"))
    }
}

/// A public key: either a single signing key or a threshold tree of keys.
///
/// Decoding is depth-bounded and every decoded composite key is checked, so
/// keys read off the wire obey the same rules as keys built with
/// `CompositeKey::new`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshSerialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PublicKey {
    /// A single secp256k1 key.
    Secp256k1(Secp256k1Key),
    /// A weighted threshold over child keys.
    Composite(CompositeKey),
}

impl PublicKey {
    /// Whether this key is a composite (multi-key) identity.
    pub fn is_composite(&self) -> bool {
        matches!(self, PublicKey::Composite(_))
    }

    /// Whether the given signing keys jointly satisfy this key.
    ///
    /// A single key is fulfilled by its own presence; a composite key by its
    /// threshold rule. Malformed composite keys are never fulfilled.
    pub fn is_fulfilled_by(&self, keys: &[PublicKey]) -> bool {
        if let PublicKey::Composite(ck) = self {
            if ck.check_validity().is_err() {
                return false;
            }
        }
        self.fulfilled_at_depth(keys, 0)
    }

    fn read_at_depth<R: Read>(reader: &mut R, depth: usize) -> borsh::io::Result<Self> {
        match u8::deserialize_reader(reader)? {
            0 => Ok(PublicKey::Secp256k1(Secp256k1Key::deserialize_reader(reader)?)),
            1 => Ok(PublicKey::Composite(CompositeKey::read_at_depth(reader, depth)?)),
            tag => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("unknown public key tag {tag}"),
            )),
        }
    }

    fn fulfilled_at_depth(&self, keys: &[PublicKey], depth: usize) -> bool {
        match self {
            PublicKey::Secp256k1(_) => keys.contains(self),
            PublicKey::Composite(ck) => ck.fulfilled_at_depth(keys, depth),
        }
    }

    /// All single keys reachable from this key, in tree order.
    pub fn leaf_keys(&self) -> Vec<Secp256k1Key> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<Secp256k1Key>) {
        match self {
            PublicKey::Secp256k1(k) => {
                if !out.contains(k) {
                    out.push(*k);
                }
            }
            PublicKey::Composite(ck) => {
                for child in &ck.children {
                    child.node.collect_leaves(out);
                }
            }
        }
    }

    /// Verify `signature` over `msg` with this key.
    ///
    /// Composite keys cannot verify a single raw signature.
    pub fn verify(&self, msg: &[u8], signature: &DigitalSignature) -> Result<(), CryptoError> {
        match self {
            PublicKey::Secp256k1(k) => k.verify(msg, signature),
            PublicKey::Composite(_) => Err(CryptoError::InvalidKey(
                "composite keys cannot verify a single signature",
            )),
        }
    }
}

impl BorshDeserialize for PublicKey {
    fn deserialize_reader<R: Read>(reader: &mut R) -> borsh::io::Result<Self> {
        Self::read_at_depth(reader, 0)
    }
}

impl From<Secp256k1Key> for PublicKey {
    fn from(value: Secp256k1Key) -> Self {
        PublicKey::Secp256k1(value)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKey::Secp256k1(k) => write!(f, "{k}"),
            PublicKey::Composite(ck) => {
                write!(f, "Composite(threshold={}, children=[", ck.threshold)?;
                for (i, child) in ck.children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}*{}", child.weight, child.node)?;
                }
                f.write_str("])")
            }
        }
    }
}

/// A child of a composite key together with its weight.
#[derive(
    Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeAndWeight {
    /// Child key.
    pub node: PublicKey,
    /// Weight contributed when the child is fulfilled.
    pub weight: u32,
}

/// Threshold key: fulfilled when fulfilled children's weights reach `threshold`.
///
/// Children are kept sorted so that equal key sets have one encoding. Decoded
/// keys must already be in that order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BorshSerialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "UncheckedCompositeKey"))]
pub struct CompositeKey {
    threshold: u32,
    children: Vec<NodeAndWeight>,
}

impl CompositeKey {
    /// Build a composite key, validating its structure.
    pub fn new(threshold: u32, mut children: Vec<NodeAndWeight>) -> Result<Self, CryptoError> {
        children.sort();
        let key = Self {
            threshold,
            children,
        };
        key.check_validity()?;
        Ok(key)
    }

    /// Composite key where every child has weight 1.
    pub fn with_threshold(
        threshold: u32,
        keys: impl IntoIterator<Item = PublicKey>,
    ) -> Result<Self, CryptoError> {
        let children = keys
            .into_iter()
            .map(|node| NodeAndWeight { node, weight: 1 })
            .collect();
        Self::new(threshold, children)
    }

    /// Required weight.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Children in canonical order.
    pub fn children(&self) -> &[NodeAndWeight] {
        &self.children
    }

    /// Check the structural rules: positive threshold and weights, no
    /// duplicate children, reachable threshold, bounded depth.
    pub fn check_validity(&self) -> Result<(), CryptoError> {
        self.check_at_depth(0)
    }

    fn check_at_depth(&self, depth: usize) -> Result<(), CryptoError> {
        if depth >= MAX_COMPOSITE_DEPTH {
            return Err(CryptoError::InvalidCompositeKey("nesting too deep"));
        }
        self.check_node()?;
        for child in &self.children {
            if let PublicKey::Composite(inner) = &child.node {
                inner.check_at_depth(depth + 1)?;
            }
        }
        Ok(())
    }

    // Rules for this level only; children are checked by the caller.
    fn check_node(&self) -> Result<(), CryptoError> {
        if self.threshold == 0 {
            return Err(CryptoError::InvalidCompositeKey("threshold must be positive"));
        }
        if self.children.is_empty() {
            return Err(CryptoError::InvalidCompositeKey("no children"));
        }
        let mut total: u64 = 0;
        for (i, child) in self.children.iter().enumerate() {
            if child.weight == 0 {
                return Err(CryptoError::InvalidCompositeKey("child weight must be positive"));
            }
            if self.children[..i].iter().any(|c| c.node == child.node) {
                return Err(CryptoError::InvalidCompositeKey("duplicate child key"));
            }
            total = total.saturating_add(u64::from(child.weight));
        }
        if total < u64::from(self.threshold) {
            return Err(CryptoError::InvalidCompositeKey("threshold unreachable"));
        }
        Ok(())
    }

    fn read_at_depth<R: Read>(reader: &mut R, depth: usize) -> borsh::io::Result<Self> {
        if depth >= MAX_COMPOSITE_DEPTH {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                "composite key nesting too deep",
            ));
        }
        let threshold = u32::deserialize_reader(reader)?;
        let len = u32::deserialize_reader(reader)?;
        let mut children: Vec<NodeAndWeight> = Vec::new();
        for _ in 0..len {
            let node = PublicKey::read_at_depth(reader, depth + 1)?;
            let weight = u32::deserialize_reader(reader)?;
            let child = NodeAndWeight { node, weight };
            if children.last().is_some_and(|prev| *prev >= child) {
                return Err(IoError::new(
                    ErrorKind::InvalidData,
                    "composite key children not in canonical order",
                ));
            }
            children.push(child);
        }
        let key = Self {
            threshold,
            children,
        };
        key.check_node()
            .map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;
        Ok(key)
    }

    fn fulfilled_at_depth(&self, keys: &[PublicKey], depth: usize) -> bool {
        if depth >= MAX_COMPOSITE_DEPTH || self.threshold == 0 {
            return false;
        }
        let mut total: u64 = 0;
        for child in &self.children {
            if child.node.fulfilled_at_depth(keys, depth + 1) {
                total = total.saturating_add(u64::from(child.weight));
            }
        }
        total >= u64::from(self.threshold)
    }
}

impl BorshDeserialize for CompositeKey {
    fn deserialize_reader<R: Read>(reader: &mut R) -> borsh::io::Result<Self> {
        Self::read_at_depth(reader, 0)
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct UncheckedCompositeKey {
    threshold: u32,
    children: Vec<NodeAndWeight>,
}

#[cfg(feature = "serde")]
impl TryFrom<UncheckedCompositeKey> for CompositeKey {
    type Error = CryptoError;

    fn try_from(value: UncheckedCompositeKey) -> Result<Self, Self::Error> {
        Self::new(value.threshold, value.children)
    }
}

impl From<CompositeKey> for PublicKey {
    fn from(value: CompositeKey) -> Self {
        PublicKey::Composite(value)
    }
}

/// Raw signature bytes (fixed-size `r || s`).
#[derive(Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DigitalSignature(pub Vec<u8>);

impl fmt::Debug for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigitalSignature({})", hex::encode(&self.0))
    }
}

/// A signature together with the key that claims to have produced it.
#[derive(Clone, PartialEq, Eq, Hash, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DigitalSignatureWithKey {
    /// Claimed signer.
    pub by: PublicKey,
    /// Signature bytes.
    pub bytes: DigitalSignature,
}

impl DigitalSignatureWithKey {
    /// Verify the signature over `msg` with the declared key.
    pub fn verify(&self, msg: &[u8]) -> Result<(), CryptoError> {
        self.by.verify(msg, &self.bytes)
    }
}

/// A notary's signature over a transaction id.
pub type TransactionSignature = DigitalSignatureWithKey;

/// A secp256k1 signing key and its public half.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
    public: Secp256k1Key,
}

impl KeyPair {
    /// Generate a fresh key from the operating system CSPRNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load a key from its 32-byte secret scalar.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, CryptoError> {
        let signing = SigningKey::from_slice(secret)
            .map_err(|_| CryptoError::InvalidKey("secret scalar out of range"))?;
        Ok(Self::from_signing_key(signing))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let public = Secp256k1Key::from_verifying_key(signing.verifying_key());
        Self { signing, public }
    }

    /// The public key as a protocol `PublicKey`.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::Secp256k1(self.public)
    }

    /// The raw secp256k1 public key.
    pub fn secp256k1_public(&self) -> Secp256k1Key {
        self.public
    }

    /// Sign `msg` and return raw signature bytes.
    pub fn sign_raw(&self, msg: &[u8]) -> DigitalSignature {
        let sig: Signature = self.signing.sign(msg);
        DigitalSignature(sig.to_bytes().to_vec())
    }

    /// Sign `msg` and attach this key as the signer.
    pub fn sign(&self, msg: &[u8]) -> DigitalSignatureWithKey {
        DigitalSignatureWithKey {
            by: self.public_key(),
            bytes: self.sign_raw(msg),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair(public={})", self.public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{from_bytes, to_bytes};

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"payload");
        sig.verify(b"payload").expect("valid");
        assert_eq!(sig.verify(b"other"), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn signature_from_other_key_fails() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let sig = a.sign_raw(b"m");
        assert!(b.public_key().verify(b"m", &sig).is_err());
    }

    #[test]
    fn malformed_signature_bytes_rejected() {
        let kp = KeyPair::generate();
        let bad = DigitalSignature(vec![1, 2, 3]);
        assert_eq!(kp.public_key().verify(b"m", &bad), Err(CryptoError::InvalidSignature));
    }

    #[test]
    fn deterministic_key_from_secret() {
        let a = KeyPair::from_secret_bytes(&[0x11; 32]).expect("key");
        let b = KeyPair::from_secret_bytes(&[0x11; 32]).expect("key");
        assert_eq!(a.public_key(), b.public_key());
        assert!(KeyPair::from_secret_bytes(&[0u8; 32]).is_err());
        let parsed = Secp256k1Key::from_sec1_bytes(a.secp256k1_public().as_bytes()).expect("parse");
        assert_eq!(parsed, a.secp256k1_public());
    }

    #[test]
    fn two_of_three_fulfilment() {
        let keys: Vec<PublicKey> = (0..3).map(|_| KeyPair::generate().public_key()).collect();
        let ck = PublicKey::from(CompositeKey::with_threshold(2, keys.clone()).expect("valid"));
        assert!(!ck.is_fulfilled_by(&keys[..1]));
        assert!(ck.is_fulfilled_by(&keys[..2]));
        assert!(ck.is_fulfilled_by(&[keys[0].clone(), keys[2].clone()]));
        assert!(ck.is_fulfilled_by(&keys));
        assert_eq!(ck.leaf_keys().len(), 3);
    }

    #[test]
    fn weighted_nested_fulfilment() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let c = KeyPair::generate().public_key();
        let inner = CompositeKey::with_threshold(1, vec![b.clone(), c.clone()]).expect("inner");
        let outer = PublicKey::from(
            CompositeKey::new(
                3,
                vec![
                    NodeAndWeight { node: a.clone(), weight: 2 },
                    NodeAndWeight { node: inner.into(), weight: 1 },
                ],
            )
            .expect("outer"),
        );
        assert!(!outer.is_fulfilled_by(&[a.clone()]));
        assert!(!outer.is_fulfilled_by(&[b.clone(), c.clone()]));
        assert!(outer.is_fulfilled_by(&[a, c]));
    }

    #[test]
    fn composite_rules_enforced() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        assert!(CompositeKey::with_threshold(0, vec![a.clone()]).is_err());
        assert!(CompositeKey::with_threshold(3, vec![a.clone(), b.clone()]).is_err());
        assert!(CompositeKey::with_threshold(1, vec![a.clone(), a.clone()]).is_err());
        assert!(CompositeKey::with_threshold(1, Vec::new()).is_err());
        assert!(CompositeKey::new(1, vec![NodeAndWeight { node: b, weight: 0 }]).is_err());
    }

    #[test]
    fn child_order_is_canonical() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let ab = CompositeKey::with_threshold(1, vec![a.clone(), b.clone()]).expect("ab");
        let ba = CompositeKey::with_threshold(1, vec![b, a]).expect("ba");
        assert_eq!(ab, ba);
    }

    fn nested_key_bytes(levels: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..levels {
            out.push(1);
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(&1u32.to_le_bytes());
        }
        out.push(0);
        out.extend_from_slice(KeyPair::generate().secp256k1_public().as_bytes());
        for _ in 0..levels {
            out.extend_from_slice(&1u32.to_le_bytes());
        }
        out
    }

    #[test]
    fn decoding_bounds_composite_depth() {
        from_bytes::<PublicKey>(&nested_key_bytes(MAX_COMPOSITE_DEPTH)).expect("within bound");
        assert!(from_bytes::<PublicKey>(&nested_key_bytes(MAX_COMPOSITE_DEPTH + 1)).is_err());
        assert!(from_bytes::<PublicKey>(&nested_key_bytes(20_000)).is_err());
    }

    #[test]
    fn decoded_composite_must_be_valid_and_canonical() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let valid = PublicKey::from(CompositeKey::with_threshold(2, vec![a.clone(), b]).expect("valid"));
        assert_eq!(from_bytes::<PublicKey>(&to_bytes(&valid).expect("encode")).expect("decode"), valid);

        let PublicKey::Composite(ck) = &valid else {
            panic!("composite expected");
        };
        let mut reversed = ck.children.clone();
        reversed.reverse();
        let unsorted = PublicKey::Composite(CompositeKey { threshold: 2, children: reversed });
        assert!(from_bytes::<PublicKey>(&to_bytes(&unsorted).expect("encode")).is_err());

        let zero_weight = PublicKey::Composite(CompositeKey {
            threshold: 1,
            children: vec![NodeAndWeight { node: a.clone(), weight: 0 }],
        });
        assert!(from_bytes::<PublicKey>(&to_bytes(&zero_weight).expect("encode")).is_err());

        let doubled = PublicKey::Composite(CompositeKey {
            threshold: 2,
            children: vec![
                NodeAndWeight { node: a.clone(), weight: 1 },
                NodeAndWeight { node: a.clone(), weight: 1 },
            ],
        });
        assert!(from_bytes::<PublicKey>(&to_bytes(&doubled).expect("encode")).is_err());
    }

    #[test]
    fn malformed_composite_is_never_fulfilled() {
        let a = KeyPair::generate().public_key();
        let doubled = PublicKey::Composite(CompositeKey {
            threshold: 2,
            children: vec![
                NodeAndWeight { node: a.clone(), weight: 1 },
                NodeAndWeight { node: a.clone(), weight: 1 },
            ],
        });
        assert!(!doubled.is_fulfilled_by(&[a]));
    }

    #[test]
    fn composite_cannot_verify_raw_signature() {
        let kp = KeyPair::generate();
        let ck = PublicKey::from(CompositeKey::with_threshold(1, vec![kp.public_key()]).expect("ck"));
        let sig = kp.sign_raw(b"m");
        assert!(matches!(ck.verify(b"m", &sig), Err(CryptoError::InvalidKey(_))));
    }
}
