//! Transactional key-value substrate for the RPKI object store.
//!
//! One embedded database holds many named tables. On top of raw tables
//! this crate provides:
//!
//! - [`Env`]: scoped read/write transactions with commit-on-success and
//!   abort-on-failure semantics
//! - [`IxMap`]: single-value map with checksummed values
//! - [`MultIxMap`]: multi-value map that keeps duplicates
//! - [`Sequence`]: persistent id allocator
//!
//! Every stored value carries a CRC32 suffix. A value that fails its check
//! surfaces as [`KvError::Corruption`].

pub mod codec;
pub mod env;
pub mod error;
pub mod ixmap;
pub mod multixmap;
pub mod sequence;

pub use env::{Cursor, Env, ReadTx, Scan, Tx, WriteTx};
pub use error::{KvError, KvResult};
pub use ixmap::{IxMap, MapReader};
pub use multixmap::{MultIxMap, ValueStream};
pub use sequence::Sequence;
