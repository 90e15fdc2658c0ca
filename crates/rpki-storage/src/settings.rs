use rpki_kv::{IxMap, Tx, WriteTx};
use rpki_types::Key;

use crate::error::StorageResult;

pub const SETTINGS: &str = "settings";

pub const PRECONFIGURED_TALS_LOADED: &str = "internal.preconfigured.tals.loaded";
pub const INITIAL_VALIDATION_RUN_COMPLETED: &str = "internal.initial.validation.run.completed";

/// Process-wide string settings. Absent settings read as unset, and
/// absent flags as `false`.
#[derive(Debug)]
pub struct Settings {
    values: IxMap<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    pub const fn new() -> Self {
        Self {
            values: IxMap::new(SETTINGS),
        }
    }

    fn key(name: &str) -> Key {
        Key::from_raw(name.as_bytes())
    }

    pub fn get(&self, tx: &impl Tx, name: &str) -> StorageResult<Option<String>> {
        Ok(self.values.get(tx, &Self::key(name))?)
    }

    /// Create or update a setting.
    pub fn set(&self, tx: &WriteTx, name: &str, value: &str) -> StorageResult<()> {
        self.values.put(tx, &Self::key(name), &value.to_string())?;
        Ok(())
    }

    pub fn get_flag(&self, tx: &impl Tx, name: &str) -> StorageResult<bool> {
        Ok(self.get(tx, name)?.is_some_and(|v| v == "true"))
    }

    pub fn set_flag(&self, tx: &WriteTx, name: &str, value: bool) -> StorageResult<()> {
        self.set(tx, name, if value { "true" } else { "false" })
    }

    /// Every setting, by name.
    pub fn all(&self, tx: &impl Tx) -> StorageResult<Vec<(String, String)>> {
        let entries = self.values.scan_prefix(tx, &[])?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| (String::from_utf8_lossy(key.as_bytes()).into_owned(), value))
            .collect())
    }

    pub fn is_preconfigured_tals_loaded(&self, tx: &impl Tx) -> StorageResult<bool> {
        self.get_flag(tx, PRECONFIGURED_TALS_LOADED)
    }

    pub fn mark_preconfigured_tals_loaded(&self, tx: &WriteTx) -> StorageResult<()> {
        self.set_flag(tx, PRECONFIGURED_TALS_LOADED, true)
    }

    pub fn is_initial_validation_run_completed(&self, tx: &impl Tx) -> StorageResult<bool> {
        self.get_flag(tx, INITIAL_VALIDATION_RUN_COMPLETED)
    }

    pub fn mark_initial_validation_run_completed(&self, tx: &WriteTx) -> StorageResult<()> {
        self.set_flag(tx, INITIAL_VALIDATION_RUN_COMPLETED, true)
    }
}
