use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TypeError;

/// Width of a SHA-256 derived key.
pub const SHA256_LEN: usize = 32;

/// Ordered byte identifier used as the primary key of every table.
///
/// Object keys are the SHA-256 of the object's raw bytes. Other tables use
/// fixed-width derived keys: big-endian ids ([`Key::from_u64`]) and
/// single-byte tags ([`Key::from_tag`]). Ordering is plain lexicographic
/// byte order, which for big-endian ids matches numeric order.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// Key of some content: its SHA-256 digest.
    pub fn sha256(data: &[u8]) -> Self {
        Self(Sha256::digest(data).to_vec())
    }

    /// Wrap an already computed SHA-256 digest.
    pub fn from_hash(hash: [u8; SHA256_LEN]) -> Self {
        Self(hash.to_vec())
    }

    /// Big-endian encoding of a numeric id, so key order equals id order.
    pub fn from_u64(id: u64) -> Self {
        Self(id.to_be_bytes().to_vec())
    }

    /// A single-byte discriminator key.
    pub fn from_tag(tag: u8) -> Self {
        Self(vec![tag])
    }

    /// Wrap raw key bytes as they were read from a table.
    pub fn from_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode a key produced by [`Key::from_u64`].
    pub fn to_u64(&self) -> Result<u64, TypeError> {
        let bytes: [u8; 8] = self.0.as_slice().try_into().map_err(|_| TypeError::InvalidLength {
            expected: 8,
            actual: self.0.len(),
        })?;
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(4)])
    }

    /// Parse a SHA-256 key from 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != SHA256_LEN {
            return Err(TypeError::InvalidLength {
                expected: SHA256_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.short_hex())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; SHA256_LEN]> for Key {
    fn from(hash: [u8; SHA256_LEN]) -> Self {
        Self::from_hash(hash)
    }
}
