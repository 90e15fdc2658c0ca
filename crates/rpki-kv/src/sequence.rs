use rpki_types::Key;

use crate::env::{Tx, WriteTx};
use crate::error::KvResult;
use crate::ixmap::IxMap;

/// Monotonic id allocator persisted in a table of counters.
///
/// Ids start at 1 and are never reused, even after the entries that used
/// them are deleted.
#[derive(Debug, Clone)]
pub struct Sequence {
    counters: IxMap<u64>,
    name: &'static str,
}

impl Sequence {
    pub const fn new(table: &'static str, name: &'static str) -> Self {
        Self {
            counters: IxMap::new(table),
            name,
        }
    }

    fn key(&self) -> Key {
        Key::from_raw(self.name.as_bytes())
    }

    /// The last id handed out, or 0 if none has been.
    pub fn current(&self, tx: &impl Tx) -> KvResult<u64> {
        Ok(self.counters.get(tx, &self.key())?.unwrap_or(0))
    }

    /// Allocate the next id. Rolled back with the enclosing transaction.
    pub fn next(&self, tx: &WriteTx) -> KvResult<u64> {
        let next = self.current(tx)? + 1;
        self.counters.put(tx, &self.key(), &next)?;
        Ok(next)
    }
}
