//! Multi-value map: many values under one primary key.
//!
//! The engine has no duplicate-key cursors, so each value lives under a
//! composite engine key:
//!
//! ```text
//! [key_width bytes: primary key]
//! [4 bytes: CRC32 of the encoded value (big-endian)]
//! [4 bytes: ordinal among byte-identical values (big-endian)]
//! ```
//!
//! Values for one primary key therefore come back in checksum order, not
//! in insertion order. Byte-identical values stored twice are kept as two
//! entries that differ only in their ordinal.

use std::marker::PhantomData;
use std::ops::Bound;

use rpki_types::Key;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::env::{Cursor, ReadTx, Scan, Tx, WriteTx};
use crate::error::{KvError, KvResult};

const SUFFIX_LEN: usize = 8;

pub struct MultIxMap<T> {
    name: &'static str,
    key_width: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for MultIxMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultIxMap")
            .field("name", &self.name)
            .field("key_width", &self.key_width)
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> MultIxMap<T> {
    /// A map whose primary keys are all exactly `key_width` bytes wide.
    pub const fn new(name: &'static str, key_width: usize) -> Self {
        Self {
            name,
            key_width,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn verify_key(&self, key: &Key) -> KvResult<()> {
        if key.len() != self.key_width {
            return Err(KvError::InvalidKey {
                table: self.name.to_string(),
                expected: self.key_width,
                actual: key.len(),
            });
        }
        Ok(())
    }

    fn group_prefix(key: &Key, encoded: &[u8]) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(key.len() + 4);
        prefix.extend_from_slice(key.as_bytes());
        prefix.extend_from_slice(&codec::value_checksum(encoded).to_be_bytes());
        prefix
    }

    /// Composite engine keys in the value group of (`key`, `encoded`) whose
    /// stored bytes equal `encoded`.
    fn matching(&self, tx: &impl Tx, key: &Key, encoded: &[u8], first_only: bool) -> KvResult<Vec<Vec<u8>>> {
        let prefix = Self::group_prefix(key, encoded);
        let mut found = Vec::new();
        tx.scan_prefix_raw(self.name, &prefix, &mut |k, v| {
            if v == encoded {
                found.push(k.to_vec());
                if first_only {
                    return Ok(Scan::Stop);
                }
            }
            Ok(Scan::Continue)
        })?;
        Ok(found)
    }

    fn primary_of(&self, composite: &[u8]) -> KvResult<Key> {
        if composite.len() != self.key_width + SUFFIX_LEN {
            return Err(KvError::Corruption {
                table: self.name.to_string(),
                reason: format!("composite key of unexpected width {}", composite.len()),
            });
        }
        Ok(Key::from_raw(&composite[..self.key_width]))
    }

    /// Add `value` under `key`, keeping every value already stored there.
    pub fn put(&self, tx: &WriteTx, key: &Key, value: &T) -> KvResult<()> {
        self.verify_key(key)?;
        let encoded = codec::encode(value)?;
        let prefix = Self::group_prefix(key, &encoded);

        let mut next_ordinal = 0u32;
        tx.scan_prefix_raw(self.name, &prefix, &mut |k, _| {
            let tail = &k[prefix.len()..];
            if let Ok(bytes) = <[u8; 4]>::try_from(tail) {
                next_ordinal = next_ordinal.max(u32::from_be_bytes(bytes).saturating_add(1));
            }
            Ok(Scan::Continue)
        })?;

        let mut composite = prefix;
        composite.extend_from_slice(&next_ordinal.to_be_bytes());
        tx.put_raw(self.name, &composite, &encoded)
    }

    /// All values stored under `key`.
    pub fn get(&self, tx: &impl Tx, key: &Key) -> KvResult<Vec<T>> {
        self.verify_key(key)?;
        let mut values = Vec::new();
        tx.scan_prefix_raw(self.name, key.as_bytes(), &mut |_, v| {
            values.push(codec::decode(self.name, v)?);
            Ok(Scan::Continue)
        })?;
        Ok(values)
    }

    /// Number of values under `key`, without decoding them.
    pub fn count(&self, tx: &impl Tx, key: &Key) -> KvResult<usize> {
        self.verify_key(key)?;
        let mut count = 0;
        tx.scan_prefix_raw(self.name, key.as_bytes(), &mut |_, _| {
            count += 1;
            Ok(Scan::Continue)
        })?;
        Ok(count)
    }

    /// Whether `value` is stored under `key`, compared on encoded bytes.
    pub fn exists(&self, tx: &impl Tx, key: &Key, value: &T) -> KvResult<bool> {
        self.verify_key(key)?;
        let encoded = codec::encode(value)?;
        Ok(!self.matching(tx, key, &encoded, true)?.is_empty())
    }

    /// Remove every value under `key`. Returns how many were removed.
    pub fn delete(&self, tx: &WriteTx, key: &Key) -> KvResult<usize> {
        self.verify_key(key)?;
        let mut composites = Vec::new();
        tx.scan_prefix_raw(self.name, key.as_bytes(), &mut |k, _| {
            composites.push(k.to_vec());
            Ok(Scan::Continue)
        })?;
        tx.delete_many_raw(self.name, &composites)
    }

    /// Remove one occurrence of `value` under `key`. Returns `true` if an
    /// occurrence was found.
    pub fn delete_value(&self, tx: &WriteTx, key: &Key, value: &T) -> KvResult<bool> {
        self.verify_key(key)?;
        let encoded = codec::encode(value)?;
        match self.matching(tx, key, &encoded, true)?.first() {
            Some(composite) => tx.delete_raw(self.name, composite),
            None => Ok(false),
        }
    }

    /// Remove one occurrence of each pair. Missing pairs are skipped.
    /// Returns how many pairs were removed.
    pub fn delete_batch(&self, tx: &WriteTx, pairs: &[(Key, T)]) -> KvResult<usize> {
        let mut removed = 0;
        for (key, value) in pairs {
            if self.delete_value(tx, key, value)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Entries whose primary key is strictly below `upper`, in key order,
    /// stopping after `limit` entries when one is given.
    pub fn scan_below(&self, tx: &impl Tx, upper: &Key, limit: Option<usize>) -> KvResult<Vec<(Key, T)>> {
        self.verify_key(upper)?;
        let mut entries = Vec::new();
        tx.scan_raw(
            self.name,
            Bound::Unbounded,
            Bound::Excluded(upper.as_bytes()),
            &mut |k, v| {
                if limit.is_some_and(|limit| entries.len() >= limit) {
                    return Ok(Scan::Stop);
                }
                entries.push((self.primary_of(k)?, codec::decode(self.name, v)?));
                Ok(Scan::Continue)
            },
        )?;
        Ok(entries)
    }

    /// Visit every (key, value) pair in engine order.
    pub fn for_each(&self, tx: &impl Tx, mut f: impl FnMut(Key, T) -> KvResult<()>) -> KvResult<()> {
        tx.scan_raw(self.name, Bound::Unbounded, Bound::Unbounded, &mut |k, v| {
            f(self.primary_of(k)?, codec::decode(self.name, v)?)?;
            Ok(Scan::Continue)
        })
    }

    /// Lazily decode the values under `key`.
    pub fn stream(&self, tx: &ReadTx, key: &Key) -> KvResult<ValueStream<T>> {
        self.verify_key(key)?;
        Ok(ValueStream {
            name: self.name,
            cursor: tx.cursor(self.name, key.as_bytes())?,
            _marker: PhantomData,
        })
    }

    pub fn clear(&self, tx: &WriteTx) -> KvResult<usize> {
        tx.clear_raw(self.name)
    }
}

/// Cursor-backed iterator over the values of one primary key.
pub struct ValueStream<T> {
    name: &'static str,
    cursor: Cursor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for ValueStream<T> {
    type Item = KvResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.next()?;
        Some(entry.and_then(|(_, v)| codec::decode(self.name, &v)))
    }
}
