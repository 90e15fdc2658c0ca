use std::marker::PhantomData;
use std::ops::Bound;

use rpki_types::Key;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec;
use crate::env::{Lookup, ReadTx, Scan, Tx, WriteTx};
use crate::error::KvResult;

/// Single-value map: one checksummed value per key.
pub struct IxMap<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for IxMap<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for IxMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IxMap").field("name", &self.name).finish()
    }
}

impl<T: Serialize + DeserializeOwned> IxMap<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, tx: &impl Tx, key: &Key) -> KvResult<Option<T>> {
        tx.get_raw(self.name, key.as_bytes())?
            .map(|bytes| codec::decode(self.name, &bytes))
            .transpose()
    }

    pub fn exists(&self, tx: &impl Tx, key: &Key) -> KvResult<bool> {
        Ok(tx.get_raw(self.name, key.as_bytes())?.is_some())
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put(&self, tx: &WriteTx, key: &Key, value: &T) -> KvResult<()> {
        let encoded = codec::encode(value)?;
        tx.put_raw(self.name, key.as_bytes(), &encoded)
    }

    /// Remove `key`. Returns `true` if a value was stored.
    pub fn delete(&self, tx: &WriteTx, key: &Key) -> KvResult<bool> {
        tx.delete_raw(self.name, key.as_bytes())
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, tx: &impl Tx, prefix: &[u8]) -> KvResult<Vec<(Key, T)>> {
        let mut entries = Vec::new();
        tx.scan_prefix_raw(self.name, prefix, &mut |k, v| {
            entries.push((Key::from_raw(k), codec::decode(self.name, v)?));
            Ok(Scan::Continue)
        })?;
        Ok(entries)
    }

    /// Number of entries whose key starts with `prefix`. Values are not
    /// decoded.
    pub fn count_prefix(&self, tx: &impl Tx, prefix: &[u8]) -> KvResult<usize> {
        let mut count = 0;
        tx.scan_prefix_raw(self.name, prefix, &mut |_, _| {
            count += 1;
            Ok(Scan::Continue)
        })?;
        Ok(count)
    }

    /// Visit every entry in key order.
    pub fn for_each(&self, tx: &impl Tx, mut f: impl FnMut(Key, T) -> KvResult<()>) -> KvResult<()> {
        tx.scan_raw(self.name, Bound::Unbounded, Bound::Unbounded, &mut |k, v| {
            f(Key::from_raw(k), codec::decode(self.name, v)?)?;
            Ok(Scan::Continue)
        })
    }

    /// Every key, without decoding the values.
    pub fn keys(&self, tx: &impl Tx) -> KvResult<Vec<Key>> {
        let mut keys = Vec::new();
        tx.scan_raw(self.name, Bound::Unbounded, Bound::Unbounded, &mut |k, _| {
            keys.push(Key::from_raw(k));
            Ok(Scan::Continue)
        })?;
        Ok(keys)
    }

    pub fn clear(&self, tx: &WriteTx) -> KvResult<usize> {
        tx.clear_raw(self.name)
    }

    /// Owned lookup handle for lazy pipelines over a read snapshot.
    pub fn reader(&self, tx: &ReadTx) -> KvResult<MapReader<T>> {
        Ok(MapReader {
            name: self.name,
            lookup: tx.lookup(self.name)?,
            _marker: PhantomData,
        })
    }
}

/// Point lookups into an [`IxMap`] that do not borrow the transaction.
pub struct MapReader<T> {
    name: &'static str,
    lookup: Lookup,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> MapReader<T> {
    pub fn get(&self, key: &Key) -> KvResult<Option<T>> {
        self.lookup
            .get_raw(key.as_bytes())?
            .map(|bytes| codec::decode(self.name, &bytes))
            .transpose()
    }
}
