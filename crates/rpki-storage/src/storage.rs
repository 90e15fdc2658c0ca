use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rpki_kv::{Env, ReadTx, WriteTx};
use rpki_objects::{ObjectStore, VerifyReport};
use rpki_runs::{RunKind, ValidationRunStore};
use rpki_types::ObjectType;
use serde::Serialize;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::settings::{Settings, SETTINGS};

/// Counts per table, for operators.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub objects: usize,
    pub objects_by_type: BTreeMap<String, usize>,
    pub trust_anchors: usize,
    pub runs_by_kind: BTreeMap<String, usize>,
}

/// One database holding every store. Share it behind an `Arc`.
#[derive(Debug)]
pub struct Storage {
    env: Env,
    objects: ObjectStore,
    runs: ValidationRunStore,
    settings: Settings,
    config: StorageConfig,
}

impl Storage {
    fn tables() -> Vec<&'static str> {
        let mut tables = Vec::new();
        tables.extend(ObjectStore::TABLES);
        tables.extend(ValidationRunStore::TABLES);
        tables.push(SETTINGS);
        tables
    }

    /// Open the database named by `config`, creating it if needed.
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        let env = Env::open(&config.path, &Self::tables())?;
        Ok(Self::with_env(env, config))
    }

    /// A throwaway database in memory.
    pub fn in_memory(config: StorageConfig) -> StorageResult<Self> {
        let env = Env::in_memory(&Self::tables())?;
        Ok(Self::with_env(env, config))
    }

    fn with_env(env: Env, config: StorageConfig) -> Self {
        Self {
            env,
            objects: ObjectStore::new(),
            runs: ValidationRunStore::new(),
            settings: Settings::new(),
            config,
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn runs(&self) -> &ValidationRunStore {
        &self.runs
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn read<T>(&self, f: impl FnOnce(&ReadTx) -> StorageResult<T>) -> StorageResult<T> {
        self.env.read_tx(f)
    }

    pub fn write<T>(&self, f: impl FnOnce(&WriteTx) -> StorageResult<T>) -> StorageResult<T> {
        self.env.write_tx(f)
    }

    /// Unregister a trust anchor together with all of its runs. Returns the
    /// number of runs removed, or `None` if the anchor was not registered.
    pub fn remove_trust_anchor(&self, id: u64) -> StorageResult<Option<usize>> {
        self.write(|tx| {
            if !self.runs.trust_anchors().remove(tx, id)? {
                return Ok(None);
            }
            Ok(Some(self.runs.remove_all_for_trust_anchor(tx, id)?))
        })
    }

    /// Delete objects not confirmed reachable within the configured
    /// retention before `now`.
    pub fn collect_garbage(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let threshold = self.config.object_threshold(now)?;
        let deleted = self
            .objects
            .sweep_unreachable_objects(&self.env, threshold, self.config.gc_batch_size)?;
        Ok(deleted)
    }

    /// Delete completed runs older than the configured retention before
    /// `now`, keeping the latest successful run of each subject.
    pub fn prune_validation_runs(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let completed_before = self.config.run_threshold(now)?;
        self.write(|tx| Ok(self.runs.remove_old_validation_runs(tx, completed_before)?))
    }

    pub fn verify(&self) -> StorageResult<VerifyReport> {
        self.read(|tx| Ok(self.objects.verify(tx)?))
    }

    pub fn stats(&self) -> StorageResult<StorageStats> {
        self.read(|tx| {
            let mut stats = StorageStats::default();
            for object_type in ObjectType::ALL {
                let count = self.objects.count_by_type(tx, object_type)?;
                stats.objects += count;
                stats.objects_by_type.insert(object_type.to_string(), count);
            }
            for kind in RunKind::ALL {
                stats.runs_by_kind.insert(kind.to_string(), self.runs.count(tx, kind)?);
            }
            stats.trust_anchors = self.runs.trust_anchors().find_all(tx)?.len();
            Ok(stats)
        })
    }
}

/// Log the configuration a storage was opened with.
pub fn log_config(config: &StorageConfig) {
    info!(
        path = %config.path.display(),
        object_retention_hours = config.object_retention_hours,
        run_retention_days = config.run_retention_days,
        gc_batch_size = config.gc_batch_size,
        "storage configuration"
    );
}
