use rpki_kv::{IxMap, Sequence, Tx, WriteTx};
use rpki_types::Key;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RunResult;

pub const TRUST_ANCHORS: &str = "trust-anchors";
pub const SEQUENCES: &str = "sequences";

/// A configured root of trust, loaded from a trust anchor locator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    pub id: u64,
    pub name: String,
    /// URIs the root certificate can be fetched from.
    pub locations: Vec<String>,
    /// Base64 subject public key info from the locator.
    pub subject_public_key_info: String,
    /// Key of the root certificate once it has been fetched.
    pub certificate: Option<Key>,
    pub preconfigured: bool,
}

impl TrustAnchor {
    pub fn new(name: impl Into<String>, locations: Vec<String>, subject_public_key_info: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            locations,
            subject_public_key_info: subject_public_key_info.into(),
            certificate: None,
            preconfigured: false,
        }
    }
}

/// Registry of trust anchors that validation runs refer to.
#[derive(Debug)]
pub struct TrustAnchors {
    anchors: IxMap<TrustAnchor>,
    ids: Sequence,
}

impl Default for TrustAnchors {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustAnchors {
    pub const fn new() -> Self {
        Self {
            anchors: IxMap::new(TRUST_ANCHORS),
            ids: Sequence::new(SEQUENCES, "trust-anchors"),
        }
    }

    /// Register `anchor` under a fresh id and return the id.
    pub fn add(&self, tx: &WriteTx, anchor: &mut TrustAnchor) -> RunResult<u64> {
        anchor.id = self.ids.next(tx)?;
        self.anchors.put(tx, &Key::from_u64(anchor.id), anchor)?;
        info!(id = anchor.id, name = %anchor.name, "trust anchor registered");
        Ok(anchor.id)
    }

    /// Replace the stored record of an already registered anchor.
    pub fn update(&self, tx: &WriteTx, anchor: &TrustAnchor) -> RunResult<()> {
        let key = Key::from_u64(anchor.id);
        if !self.anchors.exists(tx, &key)? {
            return Err(crate::RunError::UnknownTrustAnchor(anchor.id));
        }
        self.anchors.put(tx, &key, anchor)?;
        Ok(())
    }

    pub fn get(&self, tx: &impl Tx, id: u64) -> RunResult<Option<TrustAnchor>> {
        Ok(self.anchors.get(tx, &Key::from_u64(id))?)
    }

    pub fn exists(&self, tx: &impl Tx, id: u64) -> RunResult<bool> {
        Ok(self.anchors.exists(tx, &Key::from_u64(id))?)
    }

    /// Every registered anchor, in id order.
    pub fn find_all(&self, tx: &impl Tx) -> RunResult<Vec<TrustAnchor>> {
        Ok(self.anchors.scan_prefix(tx, &[])?.into_iter().map(|(_, a)| a).collect())
    }

    pub fn find_by_name(&self, tx: &impl Tx, name: &str) -> RunResult<Option<TrustAnchor>> {
        Ok(self.find_all(tx)?.into_iter().find(|a| a.name == name))
    }

    /// Unregister an anchor. Its runs are left to the caller.
    pub fn remove(&self, tx: &WriteTx, id: u64) -> RunResult<bool> {
        Ok(self.anchors.delete(tx, &Key::from_u64(id))?)
    }
}
