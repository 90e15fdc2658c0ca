use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use rpki_types::{Key, ObjectType};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Arbitrary-length unsigned integer, as used for certificate serials and
/// manifest numbers. Compared numerically.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    /// From big-endian magnitude bytes. Leading zero bytes are dropped.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }

    pub fn from_u64(n: u64) -> Self {
        Self::from_be_bytes(&n.to_be_bytes())
    }

    /// Big-endian magnitude without leading zeros. Zero is empty.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Ord for SerialNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for SerialNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({self})")
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "0x0");
        }
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A decoded signed object as kept in the store.
///
/// The payload is immutable once stored; only `reachable_since` and the
/// object's locations change afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpkiObject {
    pub object_type: ObjectType,
    /// Certificate serial or manifest number.
    pub serial_number: Option<SerialNumber>,
    /// Signing time, or the manifest's this-update instant.
    pub signing_time: Option<DateTime<Utc>>,
    pub authority_key_identifier: Option<Vec<u8>>,
    pub encoded: Vec<u8>,
    /// Last validation pass that found the object referenced. `None` means
    /// the object has never been confirmed and is collectible.
    pub reachable_since: Option<DateTime<Utc>>,
}

impl RpkiObject {
    pub fn new(object_type: ObjectType, encoded: impl Into<Vec<u8>>) -> Self {
        Self {
            object_type,
            serial_number: None,
            signing_time: None,
            authority_key_identifier: None,
            encoded: encoded.into(),
            reachable_since: None,
        }
    }

    pub fn with_serial_number(mut self, serial: SerialNumber) -> Self {
        self.serial_number = Some(serial);
        self
    }

    pub fn with_signing_time(mut self, at: DateTime<Utc>) -> Self {
        self.signing_time = Some(at);
        self
    }

    pub fn with_authority_key_identifier(mut self, aki: impl Into<Vec<u8>>) -> Self {
        self.authority_key_identifier = Some(aki.into());
        self
    }

    pub fn with_reachable_since(mut self, at: DateTime<Utc>) -> Self {
        self.reachable_since = Some(at);
        self
    }

    /// Content address: SHA-256 of the raw payload.
    pub fn key(&self) -> Key {
        Key::sha256(&self.encoded)
    }

    /// Whether the object would survive a sweep with this threshold.
    pub fn is_reachable_at(&self, threshold: DateTime<Utc>) -> bool {
        self.reachable_since.is_some_and(|since| since >= threshold)
    }
}

/// A concrete object shape that can be decoded from a stored payload.
///
/// Implemented by the decoding layer; the store only dispatches to it.
pub trait TypedObject: Sized {
    const TYPE: ObjectType;

    fn decode(encoded: &[u8]) -> Result<Self, DecodeError>;
}
