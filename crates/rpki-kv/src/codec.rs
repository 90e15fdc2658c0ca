//! Checksum-wrapped value encoding.
//!
//! Stored value format:
//! ```text
//! [N bytes: payload (bincode-serialized value)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! ```
//!
//! The checksum is verified on every decode. A mismatch is reported as
//! [`KvError::Corruption`], never as a missing value.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KvError, KvResult};

/// Size of the checksum suffix.
pub const CHECKSUM_LEN: usize = 4;

/// Serialize `value` and append its checksum.
pub fn encode<T: Serialize>(value: &T) -> KvResult<Vec<u8>> {
    let mut bytes =
        bincode::serialize(value).map_err(|e| KvError::Serialization(e.to_string()))?;
    let crc = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
    Ok(bytes)
}

/// Verify the checksum suffix and return the payload it covers.
pub fn verify<'a>(table: &str, encoded: &'a [u8]) -> KvResult<&'a [u8]> {
    if encoded.len() < CHECKSUM_LEN {
        return Err(KvError::Corruption {
            table: table.to_string(),
            reason: format!("value of {} bytes is shorter than its checksum", encoded.len()),
        });
    }
    let (payload, suffix) = encoded.split_at(encoded.len() - CHECKSUM_LEN);
    let expected = u32::from_le_bytes([suffix[0], suffix[1], suffix[2], suffix[3]]);
    let computed = crc32fast::hash(payload);
    if expected != computed {
        return Err(KvError::Corruption {
            table: table.to_string(),
            reason: format!("checksum mismatch: stored {expected:08x}, computed {computed:08x}"),
        });
    }
    Ok(payload)
}

/// Verify and deserialize a value read from `table`.
pub fn decode<T: DeserializeOwned>(table: &str, encoded: &[u8]) -> KvResult<T> {
    let payload = verify(table, encoded)?;
    bincode::deserialize(payload).map_err(|e| KvError::Corruption {
        table: table.to_string(),
        reason: format!("undecodable payload: {e}"),
    })
}

/// Checksum of a whole encoded value, used to place duplicates in
/// multi-value maps.
pub fn value_checksum(encoded: &[u8]) -> u32 {
    crc32fast::hash(encoded)
}
