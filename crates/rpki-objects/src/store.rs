//! The object store: primary table plus secondary indices.
//!
//! Tables:
//!
//! | table                 | key                       | value        |
//! |-----------------------|---------------------------|--------------|
//! | `objects`             | sha256 of payload         | `RpkiObject` |
//! | `object-locations`    | object key                | URI (multi)  |
//! | `object-reachability` | reachable-since instant   | object key (multi) |
//! | `object-aki`          | sha256 of the AKI         | object key (multi) |
//! | `object-type`         | type tag                  | object key (multi) |
//!
//! Every index entry is written and removed in the same transaction as the
//! primary record it points to.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rpki_kv::{Env, IxMap, KvError, MapReader, MultIxMap, ReadTx, Tx, ValueStream, WriteTx};
use rpki_types::{Key, ObjectType, ValidationResult, SHA256_LEN};
use tracing::{debug, info, warn};

use crate::error::{ObjectError, ObjectResult};
use crate::object::{RpkiObject, TypedObject};
use crate::verify::{IndexProblem, VerifyReport};

pub const OBJECTS: &str = "objects";
pub const LOCATIONS: &str = "object-locations";
pub const REACHABILITY: &str = "object-reachability";
pub const AKI: &str = "object-aki";
pub const TYPE: &str = "object-type";

const INSTANT_LEN: usize = 12;

/// Order-preserving key of an instant at full precision: biased big-endian
/// seconds followed by big-endian nanoseconds. An absent instant sorts
/// before every real one.
fn instant_key(at: Option<DateTime<Utc>>) -> Key {
    let (secs, nanos) = at.map_or((i64::MIN, 0), |t| (t.timestamp(), t.timestamp_subsec_nanos()));
    let mut raw = Vec::with_capacity(INSTANT_LEN);
    raw.extend_from_slice(&((secs as u64) ^ (1 << 63)).to_be_bytes());
    raw.extend_from_slice(&nanos.to_be_bytes());
    Key::from_raw(raw)
}

fn aki_key(aki: &[u8]) -> Key {
    Key::sha256(aki)
}

fn type_key(object_type: ObjectType) -> Key {
    Key::from_tag(object_type.tag())
}

/// Content-addressed store of decoded objects.
///
/// Stateless apart from its table handles: every operation runs inside a
/// transaction supplied by the caller.
#[derive(Debug)]
pub struct ObjectStore {
    objects: IxMap<RpkiObject>,
    locations: MultIxMap<String>,
    reachability: MultIxMap<Key>,
    aki: MultIxMap<Key>,
    types: MultIxMap<Key>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    /// Tables this store needs in its environment.
    pub const TABLES: [&'static str; 5] = [OBJECTS, LOCATIONS, REACHABILITY, AKI, TYPE];

    pub const fn new() -> Self {
        Self {
            objects: IxMap::new(OBJECTS),
            locations: MultIxMap::new(LOCATIONS, SHA256_LEN),
            reachability: MultIxMap::new(REACHABILITY, INSTANT_LEN),
            aki: MultIxMap::new(AKI, SHA256_LEN),
            types: MultIxMap::new(TYPE, 1),
        }
    }

    // ---------------------------------------------------------------
    // Primary records
    // ---------------------------------------------------------------

    pub fn get(&self, tx: &impl Tx, key: &Key) -> ObjectResult<Option<RpkiObject>> {
        Ok(self.objects.get(tx, key)?)
    }

    /// Insert `object` if no object with its key is stored yet.
    ///
    /// Storing the same payload again is a no-op. A different record under
    /// an existing key is rejected with [`ObjectError::ConstraintViolation`].
    pub fn put(&self, tx: &WriteTx, object: &RpkiObject) -> ObjectResult<()> {
        let key = object.key();
        if let Some(existing) = self.objects.get(tx, &key)? {
            if existing.encoded != object.encoded || existing.object_type != object.object_type {
                return Err(ObjectError::ConstraintViolation(format!(
                    "object {key} is already stored with a different {}",
                    if existing.encoded != object.encoded { "payload" } else { "type" }
                )));
            }
            debug!(key = %key.short_hex(), "object already stored");
            return Ok(());
        }

        self.objects.put(tx, &key, object)?;
        self.types.put(tx, &type_key(object.object_type), &key)?;
        self.reachability.put(tx, &instant_key(object.reachable_since), &key)?;
        if let Some(aki) = &object.authority_key_identifier {
            self.aki.put(tx, &aki_key(aki), &key)?;
        }
        debug!(key = %key.short_hex(), object_type = %object.object_type, size = object.encoded.len(), "object stored");
        Ok(())
    }

    /// [`ObjectStore::put`] and register where the object was found.
    pub fn put_with_location(&self, tx: &WriteTx, object: &RpkiObject, location: &str) -> ObjectResult<()> {
        self.put(tx, object)?;
        self.add_location(tx, &object.key(), location)
    }

    /// Remove the object with `object`'s key and every index entry that
    /// refers to it. Returns `false` if nothing was stored.
    pub fn delete(&self, tx: &WriteTx, object: &RpkiObject) -> ObjectResult<bool> {
        self.delete_by_key(tx, &object.key())
    }

    pub fn delete_by_key(&self, tx: &WriteTx, key: &Key) -> ObjectResult<bool> {
        // Index cleanup follows the stored record, not the caller's copy.
        let Some(stored) = self.objects.get(tx, key)? else {
            return Ok(false);
        };
        self.locations.delete(tx, key)?;
        self.reachability.delete_value(tx, &instant_key(stored.reachable_since), key)?;
        self.types.delete_value(tx, &type_key(stored.object_type), key)?;
        if let Some(aki) = &stored.authority_key_identifier {
            self.aki.delete_value(tx, &aki_key(aki), key)?;
        }
        self.objects.delete(tx, key)?;
        debug!(key = %key.short_hex(), "object deleted");
        Ok(true)
    }

    /// Record that the object was found referenced at `at`.
    ///
    /// Reachability never moves backwards: an older `at` than the stored one
    /// leaves the object untouched.
    pub fn mark_reachable(&self, tx: &WriteTx, key: &Key, at: DateTime<Utc>) -> ObjectResult<()> {
        let mut stored = self
            .objects
            .get(tx, key)?
            .ok_or_else(|| ObjectError::NotFound(key.clone()))?;

        if stored.reachable_since.is_some_and(|since| since >= at) {
            return Ok(());
        }

        self.reachability.delete_value(tx, &instant_key(stored.reachable_since), key)?;
        self.reachability.put(tx, &instant_key(Some(at)), key)?;
        stored.reachable_since = Some(at);
        self.objects.put(tx, key, &stored)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Locations
    // ---------------------------------------------------------------

    /// Register `location` for a stored object. Adding a known location
    /// again is a no-op.
    pub fn add_location(&self, tx: &WriteTx, key: &Key, location: &str) -> ObjectResult<()> {
        if !self.objects.exists(tx, key)? {
            return Err(ObjectError::NotFound(key.clone()));
        }
        let location = location.to_string();
        if !self.locations.exists(tx, key, &location)? {
            self.locations.put(tx, key, &location)?;
        }
        Ok(())
    }

    pub fn get_locations(&self, tx: &impl Tx, key: &Key) -> ObjectResult<BTreeSet<String>> {
        Ok(self.locations.get(tx, key)?.into_iter().collect())
    }

    /// Returns `true` if the location was registered.
    pub fn delete_location(&self, tx: &WriteTx, key: &Key, location: &str) -> ObjectResult<bool> {
        Ok(self.locations.delete_value(tx, key, &location.to_string())?)
    }

    // ---------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------

    /// Look up `key` and decode it as `T`.
    ///
    /// A stored object of another type, or one that fails to decode, is
    /// reported as an error finding in `result` and yields `None`.
    pub fn find_typed_object<T: TypedObject>(
        &self,
        tx: &impl Tx,
        key: &Key,
        result: &mut ValidationResult,
    ) -> ObjectResult<Option<T>> {
        let Some(object) = self.objects.get(tx, key)? else {
            return Ok(None);
        };
        if object.object_type != T::TYPE {
            result.error(
                "rpki.object.type.mismatch",
                vec![key.to_hex(), T::TYPE.to_string(), object.object_type.to_string()],
            );
            return Ok(None);
        }
        match T::decode(&object.encoded) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                result.error("rpki.object.decode.failed", vec![key.to_hex(), e.to_string()]);
                Ok(None)
            }
        }
    }

    /// Look up by raw digest bytes. Anything but a 32-byte digest finds
    /// nothing.
    pub fn find_by_sha256(&self, tx: &impl Tx, sha256: &[u8]) -> ObjectResult<Option<RpkiObject>> {
        if sha256.len() != SHA256_LEN {
            return Ok(None);
        }
        self.get(tx, &Key::from_raw(sha256))
    }

    /// Resolve a manifest's file list. Entries whose hash is not stored are
    /// left out of the result.
    pub fn find_objects_in_manifest(
        &self,
        tx: &impl Tx,
        files: &BTreeMap<String, Key>,
    ) -> ObjectResult<BTreeMap<String, RpkiObject>> {
        let mut found = BTreeMap::new();
        for (name, hash) in files {
            if let Some(object) = self.objects.get(tx, hash)? {
                found.insert(name.clone(), object);
            }
        }
        Ok(found)
    }

    /// The manifest with the highest manifest number among those issued
    /// under `aki`, the latest issuance instant breaking ties.
    pub fn find_latest_manifest_by_aki(&self, tx: &impl Tx, aki: &[u8]) -> ObjectResult<Option<RpkiObject>> {
        let mut latest: Option<RpkiObject> = None;
        for key in self.aki.get(tx, &aki_key(aki))? {
            let Some(object) = self.objects.get(tx, &key)? else {
                continue;
            };
            if object.object_type != ObjectType::Manifest {
                continue;
            }
            let newer = match &latest {
                None => true,
                Some(current) => {
                    (&object.serial_number, object.signing_time) > (&current.serial_number, current.signing_time)
                }
            };
            if newer {
                latest = Some(object);
            }
        }
        Ok(latest)
    }

    pub fn get_keys_by_type(&self, tx: &impl Tx, object_type: ObjectType) -> ObjectResult<BTreeSet<Key>> {
        Ok(self.types.get(tx, &type_key(object_type))?.into_iter().collect())
    }

    pub fn count_by_type(&self, tx: &impl Tx, object_type: ObjectType) -> ObjectResult<usize> {
        Ok(self.types.count(tx, &type_key(object_type))?)
    }

    pub fn all_keys(&self, tx: &impl Tx) -> ObjectResult<Vec<Key>> {
        Ok(self.objects.keys(tx)?)
    }

    /// Lazily yield the payload of every object of `object_type`.
    ///
    /// The stream reads from `tx`'s snapshot and stays valid after `tx` is
    /// dropped. Each call starts a fresh pass.
    pub fn stream_objects(&self, tx: &ReadTx, object_type: ObjectType) -> ObjectResult<ObjectStream> {
        Ok(ObjectStream {
            keys: self.types.stream(tx, &type_key(object_type))?,
            objects: self.objects.reader(tx)?,
        })
    }

    // ---------------------------------------------------------------
    // Garbage collection
    // ---------------------------------------------------------------

    /// Delete every object whose reachable-since is absent or strictly
    /// older than `threshold`, within the caller's transaction.
    pub fn delete_unreachable_objects(&self, tx: &WriteTx, threshold: DateTime<Utc>) -> ObjectResult<u64> {
        let (_, deleted) = self.sweep_batch(tx, threshold, None)?;
        info!(deleted, %threshold, "unreachable objects deleted");
        Ok(deleted)
    }

    /// Like [`ObjectStore::delete_unreachable_objects`], but commits after
    /// every `batch_size` index entries so that the writer lock is released
    /// between batches. A `batch_size` of zero sweeps in one transaction.
    pub fn sweep_unreachable_objects(
        &self,
        env: &Env,
        threshold: DateTime<Utc>,
        batch_size: usize,
    ) -> ObjectResult<u64> {
        if batch_size == 0 {
            return env.write_tx(|tx| self.delete_unreachable_objects(tx, threshold));
        }

        let mut total = 0;
        let mut batches = 0u32;
        loop {
            let (visited, deleted) = env.write_tx(|tx| self.sweep_batch(tx, threshold, Some(batch_size)))?;
            total += deleted;
            batches += 1;
            debug!(batch = batches, visited, deleted, "gc batch committed");
            if visited < batch_size {
                break;
            }
        }
        info!(deleted = total, batches, %threshold, "unreachable objects swept");
        Ok(total)
    }

    /// Process up to `limit` reachability entries below the threshold.
    /// Returns (entries visited, objects deleted).
    fn sweep_batch(&self, tx: &WriteTx, threshold: DateTime<Utc>, limit: Option<usize>) -> ObjectResult<(usize, u64)> {
        let upper = instant_key(Some(threshold));
        let entries = self.reachability.scan_below(tx, &upper, limit)?;
        let mut deleted = 0;
        for (since, key) in &entries {
            match self.objects.get(tx, key)? {
                Some(object) if instant_key(object.reachable_since) == *since => {
                    self.delete_by_key(tx, key)?;
                    deleted += 1;
                }
                _ => {
                    // Stale entry: the object is gone or was re-marked.
                    warn!(key = %key.short_hex(), "removing stale reachability entry");
                    self.reachability.delete_value(tx, since, key)?;
                }
            }
        }
        Ok((entries.len(), deleted))
    }

    // ---------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------

    /// Cross-check the primary table against every index.
    pub fn verify(&self, tx: &impl Tx) -> ObjectResult<VerifyReport> {
        let mut report = VerifyReport::default();

        // Expected index keys per stored object.
        let mut expected: BTreeMap<Key, [Option<Key>; 3]> = BTreeMap::new();
        self.objects.for_each(tx, |key, object| {
            let aki = object.authority_key_identifier.as_deref().map(aki_key);
            expected.insert(
                key,
                [Some(type_key(object.object_type)), Some(instant_key(object.reachable_since)), aki],
            );
            Ok(())
        })?;
        report.objects = expected.len();

        self.locations.for_each(tx, |key, _| {
            report.locations += 1;
            if !expected.contains_key(&key) {
                report.dangling.push(IndexProblem::new(LOCATIONS, key));
            }
            Ok(())
        })?;

        let indices = [(TYPE, &self.types), (REACHABILITY, &self.reachability), (AKI, &self.aki)];
        for (slot, (name, index)) in indices.into_iter().enumerate() {
            let mut seen = BTreeSet::new();
            index.for_each(tx, |index_key, object_key| {
                match expected.get(&object_key) {
                    None => report.dangling.push(IndexProblem::new(name, object_key)),
                    Some(keys) if keys[slot].as_ref() != Some(&index_key) => {
                        report.stale.push(IndexProblem::new(name, object_key))
                    }
                    Some(_) => {
                        seen.insert(object_key);
                    }
                }
                Ok::<_, KvError>(())
            })?;
            for (key, keys) in &expected {
                if keys[slot].is_some() && !seen.contains(key) {
                    report.unindexed.push(IndexProblem::new(name, key.clone()));
                }
            }
        }

        if report.is_consistent() {
            info!(objects = report.objects, locations = report.locations, "object store verified");
        } else {
            warn!(
                dangling = report.dangling.len(),
                stale = report.stale.len(),
                unindexed = report.unindexed.len(),
                "object store indices are inconsistent"
            );
        }
        Ok(report)
    }
}

/// Lazy payload iterator returned by [`ObjectStore::stream_objects`].
pub struct ObjectStream {
    keys: ValueStream<Key>,
    objects: MapReader<RpkiObject>,
}

impl Iterator for ObjectStream {
    type Item = ObjectResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let key = match self.keys.next()? {
                Ok(key) => key,
                Err(e) => return Some(Err(e.into())),
            };
            match self.objects.get(&key) {
                Ok(Some(object)) => return Some(Ok(object.encoded)),
                Ok(None) => warn!(key = %key.short_hex(), "type index entry without object"),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::object::SerialNumber;
    use chrono::{Duration, TimeZone};

    fn setup() -> (Env, ObjectStore) {
        (Env::in_memory(&ObjectStore::TABLES).unwrap(), ObjectStore::new())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn roa(payload: &str) -> RpkiObject {
        RpkiObject::new(ObjectType::Roa, payload.as_bytes().to_vec())
    }

    fn manifest(payload: &str, aki: &[u8], number: u64, issued: DateTime<Utc>) -> RpkiObject {
        RpkiObject::new(ObjectType::Manifest, payload.as_bytes().to_vec())
            .with_authority_key_identifier(aki)
            .with_serial_number(SerialNumber::from_u64(number))
            .with_signing_time(issued)
    }

    fn put_all(env: &Env, store: &ObjectStore, objects: &[RpkiObject]) {
        env.write_tx(|tx| {
            for object in objects {
                store.put(tx, object)?;
            }
            Ok::<_, ObjectError>(())
        })
        .unwrap();
    }

    #[derive(Debug)]
    struct Roa {
        asn: u32,
    }

    impl TypedObject for Roa {
        const TYPE: ObjectType = ObjectType::Roa;

        fn decode(encoded: &[u8]) -> Result<Self, DecodeError> {
            let text = std::str::from_utf8(encoded).map_err(|e| DecodeError(e.to_string()))?;
            let asn = text
                .strip_prefix("roa:AS")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| DecodeError(format!("not a roa: {text}")))?;
            Ok(Self { asn })
        }
    }

    #[test]
    fn put_is_idempotent() {
        let (env, store) = setup();
        let object = roa("roa:AS1");
        env.write_tx(|tx| store.put_with_location(tx, &object, "rsync://a/x.roa")).unwrap();
        env.write_tx(|tx| store.put_with_location(tx, &object, "rsync://a/x.roa")).unwrap();

        let key = object.key();
        env.read_tx(|tx| {
            assert_eq!(store.get(tx, &key)?, Some(object.clone()));
            assert_eq!(store.count_by_type(tx, ObjectType::Roa)?, 1);
            assert_eq!(store.get_locations(tx, &key)?.len(), 1);
            assert!(store.verify(tx)?.is_consistent());
            Ok::<_, ObjectError>(())
        })
        .unwrap();
    }

    #[test]
    fn different_type_under_same_key_is_rejected() {
        let (env, store) = setup();
        put_all(&env, &store, &[roa("payload")]);
        let clash = RpkiObject::new(ObjectType::Gbr, b"payload".to_vec());
        let err = env.write_tx(|tx| store.put(tx, &clash)).unwrap_err();
        assert!(matches!(err, ObjectError::ConstraintViolation(_)));
    }

    #[test]
    fn locations_are_a_sorted_set() {
        let (env, store) = setup();
        let object = roa("roa:AS2");
        let key = object.key();
        env.write_tx(|tx| {
            store.put_with_location(tx, &object, "rsync://b/2.roa")?;
            store.add_location(tx, &key, "https://a/2.roa")?;
            store.add_location(tx, &key, "rsync://b/2.roa")
        })
        .unwrap();

        let locations = env.read_tx(|tx| store.get_locations(tx, &key)).unwrap();
        assert_eq!(
            locations.into_iter().collect::<Vec<_>>(),
            vec!["https://a/2.roa".to_string(), "rsync://b/2.roa".to_string()]
        );

        assert!(env.write_tx(|tx| store.delete_location(tx, &key, "https://a/2.roa")).unwrap());
        assert!(!env.write_tx(|tx| store.delete_location(tx, &key, "https://a/2.roa")).unwrap());
    }

    #[test]
    fn location_for_missing_object_is_not_found() {
        let (env, store) = setup();
        let err = env
            .write_tx(|tx| store.add_location(tx, &Key::sha256(b"nothing"), "rsync://x"))
            .unwrap_err();
        assert!(matches!(err, ObjectError::NotFound(_)));
    }

    #[test]
    fn delete_cascades_to_every_index() {
        let (env, store) = setup();
        let object = manifest("mft-1", b"aki-1", 1, t0());
        env.write_tx(|tx| store.put_with_location(tx, &object, "rsync://a/1.mft")).unwrap();
        env.write_tx(|tx| store.mark_reachable(tx, &object.key(), t0())).unwrap();

        assert!(env.write_tx(|tx| store.delete(tx, &object)).unwrap());
        assert!(!env.write_tx(|tx| store.delete(tx, &object)).unwrap());

        env.read_tx(|tx| {
            assert_eq!(store.get(tx, &object.key())?, None);
            assert!(store.get_locations(tx, &object.key())?.is_empty());
            assert_eq!(store.find_latest_manifest_by_aki(tx, b"aki-1")?, None);
            let report = store.verify(tx)?;
            assert!(report.is_consistent(), "{report:?}");
            assert_eq!(report.objects, 0);
            Ok::<_, ObjectError>(())
        })
        .unwrap();
    }

    #[test]
    fn mark_reachable_never_moves_backwards() {
        let (env, store) = setup();
        let object = roa("roa:AS3");
        let key = object.key();
        put_all(&env, &store, &[object]);

        let later = t0() + Duration::days(2);
        env.write_tx(|tx| store.mark_reachable(tx, &key, later)).unwrap();
        env.write_tx(|tx| store.mark_reachable(tx, &key, t0())).unwrap();

        env.read_tx(|tx| {
            assert_eq!(store.get(tx, &key)?.unwrap().reachable_since, Some(later));
            assert!(store.verify(tx)?.is_consistent());
            Ok::<_, ObjectError>(())
        })
        .unwrap();

        let err = env
            .write_tx(|tx| store.mark_reachable(tx, &Key::sha256(b"absent"), later))
            .unwrap_err();
        assert!(matches!(err, ObjectError::NotFound(_)));
    }

    #[test]
    fn gc_removes_exactly_the_objects_older_than_threshold() {
        let (env, store) = setup();
        let threshold = t0();
        let never = roa("never-marked");
        let old = roa("old");
        let boundary = roa("boundary");
        let fresh = roa("fresh");
        put_all(&env, &store, &[never.clone(), old.clone(), boundary.clone(), fresh.clone()]);
        env.write_tx(|tx| {
            store.mark_reachable(tx, &old.key(), threshold - Duration::milliseconds(1))?;
            store.mark_reachable(tx, &boundary.key(), threshold)?;
            store.mark_reachable(tx, &fresh.key(), threshold + Duration::hours(1))
        })
        .unwrap();

        let deleted = env.write_tx(|tx| store.delete_unreachable_objects(tx, threshold)).unwrap();
        assert_eq!(deleted, 2);

        env.read_tx(|tx| {
            assert_eq!(store.get(tx, &never.key())?, None);
            assert_eq!(store.get(tx, &old.key())?, None);
            assert!(store.get(tx, &boundary.key())?.is_some());
            assert!(store.get(tx, &fresh.key())?.is_some());
            assert!(store.verify(tx)?.is_consistent());
            Ok::<_, ObjectError>(())
        })
        .unwrap();
    }

    #[test]
    fn sub_millisecond_reachability_is_kept_at_its_own_instant() {
        let (env, store) = setup();
        let object = roa("edge");
        put_all(&env, &store, &[object.clone()]);
        let seen = t0() + Duration::microseconds(500);
        env.write_tx(|tx| store.mark_reachable(tx, &object.key(), seen)).unwrap();

        assert_eq!(env.write_tx(|tx| store.delete_unreachable_objects(tx, seen)).unwrap(), 0);
        assert_eq!(
            env.write_tx(|tx| store.delete_unreachable_objects(tx, seen - Duration::nanoseconds(1))).unwrap(),
            0
        );
        env.read_tx(|tx| {
            assert_eq!(store.get(tx, &object.key())?.unwrap().reachable_since, Some(seen));
            Ok::<_, ObjectError>(())
        })
        .unwrap();

        let threshold = seen + Duration::nanoseconds(1);
        assert_eq!(env.write_tx(|tx| store.delete_unreachable_objects(tx, threshold)).unwrap(), 1);
    }

    #[test]
    fn instant_keys_order_like_instants() {
        let earlier = t0() - Duration::nanoseconds(1);
        let later = t0() + Duration::microseconds(1);
        assert!(instant_key(None) < instant_key(Some(earlier)));
        assert!(instant_key(Some(earlier)) < instant_key(Some(t0())));
        assert!(instant_key(Some(t0())) < instant_key(Some(later)));
        let before_epoch = DateTime::from_timestamp(-1, 999_999_999).unwrap();
        assert!(instant_key(Some(before_epoch)) < instant_key(Some(DateTime::from_timestamp(0, 0).unwrap())));
    }

    #[test]
    fn chunked_sweep_matches_single_transaction_sweep() {
        let (env, store) = setup();
        let objects: Vec<_> = (0..25).map(|i| roa(&format!("object-{i}"))).collect();
        put_all(&env, &store, &objects);
        env.write_tx(|tx| {
            for object in &objects[20..] {
                store.mark_reachable(tx, &object.key(), t0() + Duration::days(1))?;
            }
            Ok::<_, ObjectError>(())
        })
        .unwrap();

        let deleted = store.sweep_unreachable_objects(&env, t0(), 7).unwrap();
        assert_eq!(deleted, 20);
        assert_eq!(env.read_tx(|tx| store.all_keys(tx)).unwrap().len(), 5);
        assert_eq!(store.sweep_unreachable_objects(&env, t0(), 0).unwrap(), 0);
    }

    #[test]
    fn latest_manifest_prefers_number_then_issuance() {
        let (env, store) = setup();
        let aki = b"issuer";
        let older = manifest("mft-a", aki, 4, t0() + Duration::days(5));
        let highest_early = manifest("mft-b", aki, 5, t0());
        let highest_late = manifest("mft-c", aki, 5, t0() + Duration::hours(1));
        let other_issuer = manifest("mft-d", b"someone-else", 9, t0());
        let crl = RpkiObject::new(ObjectType::Crl, b"crl".to_vec()).with_authority_key_identifier(&aki[..]);
        put_all(&env, &store, &[older, highest_early, highest_late.clone(), other_issuer, crl]);

        let latest = env.read_tx(|tx| store.find_latest_manifest_by_aki(tx, aki)).unwrap();
        assert_eq!(latest, Some(highest_late));
        assert_eq!(env.read_tx(|tx| store.find_latest_manifest_by_aki(tx, b"unknown")).unwrap(), None);
    }

    #[test]
    fn typed_lookup_records_soft_failures() {
        let (env, store) = setup();
        let good = roa("roa:AS65000");
        let garbled = roa("not-a-roa");
        let crl = RpkiObject::new(ObjectType::Crl, b"crl".to_vec());
        put_all(&env, &store, &[good.clone(), garbled.clone(), crl.clone()]);

        let mut result = ValidationResult::with_location("rsync://a/");
        env.read_tx(|tx| {
            let decoded = store.find_typed_object::<Roa>(tx, &good.key(), &mut result)?;
            assert_eq!(decoded.map(|r| r.asn), Some(65000));
            assert!(store.find_typed_object::<Roa>(tx, &garbled.key(), &mut result)?.is_none());
            assert!(store.find_typed_object::<Roa>(tx, &crl.key(), &mut result)?.is_none());
            assert!(store.find_typed_object::<Roa>(tx, &Key::sha256(b"x"), &mut result)?.is_none());
            Ok::<_, ObjectError>(())
        })
        .unwrap();
        assert_eq!(result.error_count(), 2);
    }

    #[test]
    fn manifest_entries_resolve_to_stored_objects() {
        let (env, store) = setup();
        let a = roa("roa:AS1");
        let b = roa("roa:AS2");
        put_all(&env, &store, &[a.clone(), b.clone()]);

        let files = BTreeMap::from([
            ("a.roa".to_string(), a.key()),
            ("b.roa".to_string(), b.key()),
            ("missing.roa".to_string(), Key::sha256(b"missing")),
        ]);
        let found = env.read_tx(|tx| store.find_objects_in_manifest(tx, &files)).unwrap();
        assert_eq!(found.keys().cloned().collect::<Vec<_>>(), vec!["a.roa", "b.roa"]);

        env.read_tx(|tx| {
            assert_eq!(store.find_by_sha256(tx, a.key().as_bytes())?, Some(a.clone()));
            assert_eq!(store.find_by_sha256(tx, b"short")?, None);
            Ok::<_, ObjectError>(())
        })
        .unwrap();
    }

    #[test]
    fn stream_yields_payloads_of_one_type_and_restarts() {
        let (env, store) = setup();
        put_all(
            &env,
            &store,
            &[roa("r1"), roa("r2"), RpkiObject::new(ObjectType::Crl, b"c1".to_vec())],
        );

        for _ in 0..2 {
            let tx = env.begin_read().unwrap();
            let stream = store.stream_objects(&tx, ObjectType::Roa).unwrap();
            drop(tx);
            let mut payloads: Vec<Vec<u8>> = stream.collect::<ObjectResult<_>>().unwrap();
            payloads.sort();
            assert_eq!(payloads, vec![b"r1".to_vec(), b"r2".to_vec()]);
        }

        let keys = env.read_tx(|tx| store.get_keys_by_type(tx, ObjectType::Crl)).unwrap();
        assert_eq!(keys, BTreeSet::from([Key::sha256(b"c1")]));
    }

    #[test]
    fn verify_reports_damaged_indices() {
        let (env, store) = setup();
        let kept = roa("kept");
        put_all(&env, &store, &[kept.clone()]);

        // A type entry for an object that does not exist, and a missing
        // reachability entry for one that does.
        env.write_tx(|tx| {
            store.types.put(tx, &type_key(ObjectType::Roa), &Key::sha256(b"ghost"))?;
            store.reachability.delete(tx, &instant_key(None))
        })
        .unwrap();

        let report = env.read_tx(|tx| store.verify(tx)).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.dangling, vec![IndexProblem::new(TYPE, Key::sha256(b"ghost"))]);
        assert_eq!(report.unindexed, vec![IndexProblem::new(REACHABILITY, kept.key())]);
    }
}
