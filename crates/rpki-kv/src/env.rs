//! Scoped read and write transactions over the embedded store.
//!
//! Reads see a stable snapshot and never wait for writers. Writes are
//! serialized by the engine: a second writer blocks until the first one
//! commits or aborts. [`Env::write_tx`] commits when its closure returns
//! `Ok` and aborts when it returns `Err` or panics.

use std::cell::Cell;
use std::marker::PhantomData;
use std::ops::Bound;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use redb::{Database, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, info, warn};

use crate::error::{KvError, KvResult};

type Bytes = &'static [u8];

fn definition(name: &'static str) -> TableDefinition<'static, Bytes, Bytes> {
    TableDefinition::new(name)
}

thread_local! {
    static TX_OPEN: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as holding a transaction. Not `Send`: the mark
/// must be cleared on the thread that set it.
struct TxGuard {
    _not_send: PhantomData<*const ()>,
}

impl TxGuard {
    fn acquire() -> KvResult<Self> {
        if TX_OPEN.with(|open| open.replace(true)) {
            return Err(KvError::NestedTransaction);
        }
        Ok(Self {
            _not_send: PhantomData,
        })
    }
}

impl Drop for TxGuard {
    fn drop(&mut self) {
        TX_OPEN.with(|open| open.set(false));
    }
}

/// Whether a scan should keep going after the current entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scan {
    Continue,
    Stop,
}

/// Read access shared by both transaction kinds.
pub trait Tx {
    /// Raw bytes stored under `key`, if any.
    fn get_raw(&self, table: &'static str, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Visit entries with keys in `[from, to)` order until `visit` stops.
    fn scan_raw(
        &self,
        table: &'static str,
        from: Bound<&[u8]>,
        to: Bound<&[u8]>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> KvResult<Scan>,
    ) -> KvResult<()>;

    /// Visit entries whose key starts with `prefix`.
    fn scan_prefix_raw(
        &self,
        table: &'static str,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> KvResult<Scan>,
    ) -> KvResult<()> {
        self.scan_raw(table, Bound::Included(prefix), Bound::Unbounded, &mut |k, v| {
            if !k.starts_with(prefix) {
                return Ok(Scan::Stop);
            }
            visit(k, v)
        })
    }
}

fn get_in<T: ReadableTable<Bytes, Bytes>>(table: &T, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
    let value = table.get(key)?.map(|guard| guard.value().to_vec());
    Ok(value)
}

fn scan_in<T: ReadableTable<Bytes, Bytes>>(
    table: &T,
    from: Bound<&[u8]>,
    to: Bound<&[u8]>,
    visit: &mut dyn FnMut(&[u8], &[u8]) -> KvResult<Scan>,
) -> KvResult<()> {
    for entry in table.range::<&[u8]>((from, to))? {
        let (key, value) = entry?;
        if visit(key.value(), value.value())? == Scan::Stop {
            break;
        }
    }
    Ok(())
}

/// Snapshot read transaction.
pub struct ReadTx {
    inner: ReadTransaction,
    _guard: TxGuard,
}

impl ReadTx {
    fn table(&self, name: &'static str) -> KvResult<ReadOnlyTable<Bytes, Bytes>> {
        Ok(self.inner.open_table(definition(name))?)
    }

    /// Lazy cursor over the entries whose key starts with `prefix`.
    ///
    /// The cursor keeps the snapshot alive on its own, so it may be consumed
    /// after the `ReadTx` that created it has been dropped.
    pub fn cursor(&self, table: &'static str, prefix: &[u8]) -> KvResult<Cursor> {
        let range = self.table(table)?.range(prefix..)?;
        Ok(Cursor {
            range,
            prefix: prefix.to_vec(),
            done: false,
        })
    }

    /// Owned point-lookup handle bound to this snapshot.
    pub fn lookup(&self, table: &'static str) -> KvResult<Lookup> {
        Ok(Lookup {
            table: self.table(table)?,
        })
    }
}

impl Tx for ReadTx {
    fn get_raw(&self, table: &'static str, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let table = self.table(table)?;
        get_in(&table, key)
    }

    fn scan_raw(
        &self,
        table: &'static str,
        from: Bound<&[u8]>,
        to: Bound<&[u8]>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> KvResult<Scan>,
    ) -> KvResult<()> {
        let table = self.table(table)?;
        scan_in(&table, from, to, visit)
    }
}

/// Lazy prefix-bounded iterator produced by [`ReadTx::cursor`].
pub struct Cursor {
    range: redb::Range<'static, Bytes, Bytes>,
    prefix: Vec<u8>,
    done: bool,
}

impl Iterator for Cursor {
    type Item = KvResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.range.next()? {
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
            Ok((key, value)) => {
                if !key.value().starts_with(&self.prefix) {
                    self.done = true;
                    return None;
                }
                Some(Ok((key.value().to_vec(), value.value().to_vec())))
            }
        }
    }
}

/// Point lookups against one table of a read snapshot.
pub struct Lookup {
    table: ReadOnlyTable<Bytes, Bytes>,
}

impl Lookup {
    pub fn get_raw(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        get_in(&self.table, key)
    }
}

/// The single active write transaction.
pub struct WriteTx {
    inner: WriteTransaction,
    _guard: TxGuard,
}

impl WriteTx {
    pub fn put_raw(&self, table: &'static str, key: &[u8], value: &[u8]) -> KvResult<()> {
        let mut table = self.inner.open_table(definition(table))?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn delete_raw(&self, table: &'static str, key: &[u8]) -> KvResult<bool> {
        let mut table = self.inner.open_table(definition(table))?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }

    /// Remove every key in `keys`, returning how many were present.
    pub fn delete_many_raw(&self, table: &'static str, keys: &[Vec<u8>]) -> KvResult<usize> {
        let mut table = self.inner.open_table(definition(table))?;
        let mut removed = 0;
        for key in keys {
            if table.remove(key.as_slice())?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry of `table`.
    pub fn clear_raw(&self, table: &'static str) -> KvResult<usize> {
        let mut keys = Vec::new();
        self.scan_raw(table, Bound::Unbounded, Bound::Unbounded, &mut |k, _| {
            keys.push(k.to_vec());
            Ok(Scan::Continue)
        })?;
        self.delete_many_raw(table, &keys)
    }
}

impl Tx for WriteTx {
    fn get_raw(&self, table: &'static str, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        let table = self.inner.open_table(definition(table))?;
        get_in(&table, key)
    }

    fn scan_raw(
        &self,
        table: &'static str,
        from: Bound<&[u8]>,
        to: Bound<&[u8]>,
        visit: &mut dyn FnMut(&[u8], &[u8]) -> KvResult<Scan>,
    ) -> KvResult<()> {
        let table = self.inner.open_table(definition(table))?;
        scan_in(&table, from, to, visit)
    }
}

/// Storage environment: one embedded database holding named sub-tables.
pub struct Env {
    db: Database,
    tables: Vec<&'static str>,
}

impl Env {
    /// Open (or create) the database file at `path` and make sure every
    /// table in `tables` exists.
    pub fn open(path: &Path, tables: &[&'static str]) -> KvResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;
        let env = Self::init(db, tables)?;
        info!(path = %path.display(), tables = tables.len(), "storage environment opened");
        Ok(env)
    }

    /// A database that lives only in memory, for tests and tooling.
    pub fn in_memory(tables: &[&'static str]) -> KvResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db, tables)
    }

    fn init(db: Database, tables: &[&'static str]) -> KvResult<Self> {
        let env = Self {
            db,
            tables: tables.to_vec(),
        };
        env.write_tx(|tx| {
            for name in tables {
                tx.inner.open_table(definition(name))?;
            }
            Ok::<_, KvError>(())
        })?;
        Ok(env)
    }

    /// Names of the tables this environment was opened with.
    pub fn tables(&self) -> &[&'static str] {
        &self.tables
    }

    /// Begin a snapshot read that the caller owns.
    ///
    /// Prefer [`Env::read_tx`]; this is for cursors that are consumed
    /// lazily by the caller.
    pub fn begin_read(&self) -> KvResult<ReadTx> {
        let guard = TxGuard::acquire()?;
        let inner = self.db.begin_read()?;
        Ok(ReadTx {
            inner,
            _guard: guard,
        })
    }

    /// Run `f` against a snapshot of the store.
    pub fn read_tx<T, E>(&self, f: impl FnOnce(&ReadTx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<KvError>,
    {
        let tx = self.begin_read()?;
        f(&tx)
    }

    /// Run `f` inside the write transaction, committing on `Ok` and
    /// aborting on `Err`. A panic in `f` aborts the transaction and then
    /// resumes unwinding.
    pub fn write_tx<T, E>(&self, f: impl FnOnce(&WriteTx) -> Result<T, E>) -> Result<T, E>
    where
        E: From<KvError>,
    {
        let guard = TxGuard::acquire()?;
        let inner = self.db.begin_write().map_err(KvError::from)?;
        let tx = WriteTx {
            inner,
            _guard: guard,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&tx)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let WriteTx { inner, _guard } = tx;
                if let Err(abort) = inner.abort() {
                    warn!(error = %abort, "write transaction abort failed");
                }
                drop(_guard);
                panic::resume_unwind(payload);
            }
        };

        match result {
            Ok(value) => {
                let WriteTx { inner, _guard } = tx;
                inner.commit().map_err(KvError::from)?;
                debug!("write transaction committed");
                Ok(value)
            }
            Err(e) => {
                let WriteTx { inner, _guard } = tx;
                if let Err(abort) = inner.abort() {
                    warn!(error = %abort, "write transaction abort failed");
                }
                debug!("write transaction rolled back");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env").field("tables", &self.tables).finish()
    }
}
