//! Merkle hash type and the injectable digest provider

use crate::model::NodeKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte merkle hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The zero hash (used as a sentinel/null value)
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }

    /// Get a short prefix for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    /// Check if this is the zero hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::ZERO
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Digest provider used to derive node hashes
///
/// The tree never commits to a specific algorithm; it asks the provider for
/// a leaf hash over the payload bytes, or an internal hash over the child
/// hashes. Empty child slots arrive as `None` and must hash differently
/// from any real child.
pub trait Digest: Send + Sync {
    /// Hash a leaf payload
    fn leaf(&self, kind: NodeKind, payload: &[u8]) -> Hash;

    /// Hash an internal node from its ordered child hashes
    fn internal(&self, kind: NodeKind, children: &[Option<Hash>]) -> Hash;
}

/// The default BLAKE3-backed digest provider
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Digest;

const TAG_LEAF: u8 = 0x00;
const TAG_INTERNAL: u8 = 0x01;
const TAG_EMPTY_SLOT: u8 = 0x02;
const TAG_CHILD: u8 = 0x03;

impl Digest for Blake3Digest {
    fn leaf(&self, kind: NodeKind, payload: &[u8]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[TAG_LEAF]);
        hasher.update(&kind.as_u32().to_le_bytes());
        hasher.update(payload);
        Hash(*hasher.finalize().as_bytes())
    }

    fn internal(&self, kind: NodeKind, children: &[Option<Hash>]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[TAG_INTERNAL]);
        hasher.update(&kind.as_u32().to_le_bytes());
        for child in children {
            match child {
                Some(hash) => {
                    hasher.update(&[TAG_CHILD]);
                    hasher.update(hash.as_bytes());
                }
                None => {
                    hasher.update(&[TAG_EMPTY_SLOT]);
                }
            }
        }
        Hash(*hasher.finalize().as_bytes())
    }
}
