use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Storage settings, loadable from a TOML file. Missing fields take their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file.
    pub path: PathBuf,
    /// Objects not confirmed reachable for this many hours are collected.
    pub object_retention_hours: u32,
    /// Completed validation runs older than this many days are pruned.
    pub run_retention_days: u32,
    /// Index entries removed per garbage collection transaction. Zero runs
    /// the whole sweep in one transaction.
    pub gc_batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db/rpki-store.redb"),
            object_retention_hours: 7 * 24,
            run_retention_days: 10,
            gc_batch_size: 0,
        }
    }
}

impl StorageConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> StorageResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> StorageResult<Self> {
        toml::from_str(text).map_err(|e| StorageError::Config(e.to_string()))
    }

    pub fn object_retention(&self) -> Duration {
        Duration::hours(i64::from(self.object_retention_hours))
    }

    pub fn run_retention(&self) -> Duration {
        Duration::days(i64::from(self.run_retention_days))
    }

    /// Objects last reachable strictly before this instant are collected.
    pub fn object_threshold(&self, now: DateTime<Utc>) -> StorageResult<DateTime<Utc>> {
        retention_cutoff(now, self.object_retention(), "object_retention_hours")
    }

    /// Runs completed strictly before this instant are pruned.
    pub fn run_threshold(&self, now: DateTime<Utc>) -> StorageResult<DateTime<Utc>> {
        retention_cutoff(now, self.run_retention(), "run_retention_days")
    }
}

fn retention_cutoff(now: DateTime<Utc>, retention: Duration, field: &str) -> StorageResult<DateTime<Utc>> {
    now.checked_sub_signed(retention)
        .ok_or_else(|| StorageError::Config(format!("{field} reaches before the earliest representable instant")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StorageConfig::default();
        assert_eq!(c.object_retention(), Duration::days(7));
        assert_eq!(c.run_retention(), Duration::days(10));
        assert_eq!(c.gc_batch_size, 0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StorageConfig::from_toml("path = \"/var/lib/rpki/store.redb\"\ngc_batch_size = 500\n").unwrap();
        assert_eq!(c.path, PathBuf::from("/var/lib/rpki/store.redb"));
        assert_eq!(c.gc_batch_size, 500);
        assert_eq!(c.run_retention_days, 10);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = StorageConfig::from_toml("gc_batch_size = \"lots\"").unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn thresholds_subtract_retention() {
        let now = DateTime::from_timestamp(1_725_148_800, 0).unwrap();
        let c = StorageConfig::default();
        assert_eq!(c.object_threshold(now).unwrap(), now - Duration::days(7));
        assert_eq!(c.run_threshold(now).unwrap(), now - Duration::days(10));
    }

    #[test]
    fn oversized_retention_is_a_config_error() {
        let now = DateTime::from_timestamp(1_725_148_800, 0).unwrap();
        let c = StorageConfig {
            object_retention_hours: u32::MAX,
            run_retention_days: u32::MAX,
            ..StorageConfig::default()
        };
        assert!(matches!(c.object_threshold(now), Err(StorageError::Config(_))));
        assert!(matches!(c.run_threshold(now), Err(StorageError::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("storage.toml");
        std::fs::write(&file, "object_retention_hours = 12\n").unwrap();
        let c = StorageConfig::load(&file).unwrap();
        assert_eq!(c.object_retention(), Duration::hours(12));

        let missing = StorageConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, StorageError::Io(_)));
    }
}
