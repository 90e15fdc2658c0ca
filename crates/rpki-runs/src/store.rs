//! Validation run history.
//!
//! Tables:
//!
//! | table        | key                   | value                      |
//! |--------------|-----------------------|----------------------------|
//! | `runs`       | kind tag ++ run id    | `ValidationRun` (no checks) |
//! | `run-checks` | run id                | check id (multi)           |
//! | `checks`     | check id              | `StoredCheck`              |
//!
//! Run and check ids come from persistent sequences and are never reused.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rpki_kv::{IxMap, MultIxMap, Sequence, Tx, WriteTx};
use rpki_types::{Key, ValidationCheck};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RunError, RunResult};
use crate::query::{Paging, SearchTerm, Sorting};
use crate::run::{RunKind, RunStatus, RunSubject, ValidationRun};
use crate::trust_anchor::{TrustAnchors, SEQUENCES, TRUST_ANCHORS};

pub const RUNS: &str = "runs";
pub const RUN_CHECKS: &str = "run-checks";
pub const CHECKS: &str = "checks";

fn run_key(kind: RunKind, id: u64) -> Key {
    let mut bytes = Vec::with_capacity(9);
    bytes.push(kind.tag());
    bytes.extend_from_slice(&id.to_be_bytes());
    Key::from_raw(bytes)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCheck {
    run_id: u64,
    check: ValidationCheck,
}

/// Append-only history of validation runs and their checks.
#[derive(Debug)]
pub struct ValidationRunStore {
    runs: IxMap<ValidationRun>,
    run_checks: MultIxMap<u64>,
    checks: IxMap<StoredCheck>,
    run_ids: Sequence,
    check_ids: Sequence,
    trust_anchors: TrustAnchors,
}

impl Default for ValidationRunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationRunStore {
    /// Tables this store needs in its environment, the trust anchor
    /// registry included.
    pub const TABLES: [&'static str; 5] = [RUNS, RUN_CHECKS, CHECKS, TRUST_ANCHORS, SEQUENCES];

    pub const fn new() -> Self {
        Self {
            runs: IxMap::new(RUNS),
            run_checks: MultIxMap::new(RUN_CHECKS, 8),
            checks: IxMap::new(CHECKS),
            run_ids: Sequence::new(SEQUENCES, "runs"),
            check_ids: Sequence::new(SEQUENCES, "checks"),
            trust_anchors: TrustAnchors::new(),
        }
    }

    pub fn trust_anchors(&self) -> &TrustAnchors {
        &self.trust_anchors
    }

    /// Append `run` with its checks, assigning ids to both. The run's trust
    /// anchor must be registered.
    pub fn add(&self, tx: &WriteTx, run: &mut ValidationRun) -> RunResult<u64> {
        let trust_anchor = run.subject.trust_anchor();
        if !self.trust_anchors.exists(tx, trust_anchor)? {
            return Err(RunError::UnknownTrustAnchor(trust_anchor));
        }

        run.id = self.run_ids.next(tx)?;
        let run_id_key = Key::from_u64(run.id);
        for check in &mut run.checks {
            check.id = self.check_ids.next(tx)?;
            let stored = StoredCheck {
                run_id: run.id,
                check: check.clone(),
            };
            self.checks.put(tx, &Key::from_u64(check.id), &stored)?;
            self.run_checks.put(tx, &run_id_key, &check.id)?;
        }
        self.runs.put(tx, &run_key(run.kind(), run.id), run)?;

        debug!(id = run.id, kind = %run.kind(), status = %run.status, checks = run.checks.len(), "validation run added");
        Ok(run.id)
    }

    pub fn get(&self, tx: &impl Tx, kind: RunKind, id: u64) -> RunResult<Option<ValidationRun>> {
        Ok(self.runs.get(tx, &run_key(kind, id))?)
    }

    /// Find a run by id without knowing its kind.
    pub fn find(&self, tx: &impl Tx, id: u64) -> RunResult<Option<ValidationRun>> {
        for kind in RunKind::ALL {
            if let Some(run) = self.get(tx, kind, id)? {
                return Ok(Some(run));
            }
        }
        Ok(None)
    }

    /// Every run of `kind`, oldest id first.
    pub fn find_all(&self, tx: &impl Tx, kind: RunKind) -> RunResult<Vec<ValidationRun>> {
        let runs = self.runs.scan_prefix(tx, &[kind.tag()])?;
        Ok(runs.into_iter().map(|(_, run)| run).collect())
    }

    /// Number of runs of `kind`, counted from keys alone.
    pub fn count(&self, tx: &impl Tx, kind: RunKind) -> RunResult<usize> {
        Ok(self.runs.count_prefix(tx, &[kind.tag()])?)
    }

    /// The latest successful run of `kind` for each subject.
    pub fn find_latest_successful(&self, tx: &impl Tx, kind: RunKind) -> RunResult<Vec<ValidationRun>> {
        let mut latest: BTreeMap<RunSubject, ValidationRun> = BTreeMap::new();
        for run in self.find_all(tx, kind)? {
            if !run.is_succeeded() {
                continue;
            }
            let newer = latest
                .get(&run.subject)
                .map_or(true, |current| run.recency() > current.recency());
            if newer {
                latest.insert(run.subject.clone(), run);
            }
        }
        Ok(latest.into_values().collect())
    }

    /// The most recent finished trust anchor run for `trust_anchor`.
    pub fn find_latest_completed_for_trust_anchor(
        &self,
        tx: &impl Tx,
        trust_anchor: u64,
    ) -> RunResult<Option<ValidationRun>> {
        let latest = self
            .find_all(tx, RunKind::TrustAnchor)?
            .into_iter()
            .filter(|run| run.status.is_completed() && run.subject.trust_anchor() == trust_anchor)
            .max_by_key(|run| run.recency());
        Ok(latest)
    }

    /// Move a running run to a terminal status.
    pub fn complete(
        &self,
        tx: &WriteTx,
        id: u64,
        status: RunStatus,
        completed_at: DateTime<Utc>,
    ) -> RunResult<ValidationRun> {
        let mut run = self.find(tx, id)?.ok_or(RunError::RunNotFound(id))?;
        if run.status.is_completed() || !status.is_completed() {
            return Err(RunError::InvalidTransition {
                id,
                from: run.status,
                to: status,
            });
        }
        run.status = status;
        run.completed_at = Some(completed_at);
        self.runs.put(tx, &run_key(run.kind(), id), &run)?;
        debug!(id, %status, "validation run completed");
        Ok(run)
    }

    fn remove_run(&self, tx: &WriteTx, run: &ValidationRun) -> RunResult<()> {
        let run_id_key = Key::from_u64(run.id);
        for check_id in self.run_checks.get(tx, &run_id_key)? {
            self.checks.delete(tx, &Key::from_u64(check_id))?;
        }
        self.run_checks.delete(tx, &run_id_key)?;
        self.runs.delete(tx, &run_key(run.kind(), run.id))?;
        Ok(())
    }

    fn remove_where(&self, tx: &WriteTx, mut doomed: impl FnMut(&ValidationRun) -> bool) -> RunResult<usize> {
        let mut removed = 0;
        for kind in RunKind::ALL {
            for run in self.find_all(tx, kind)? {
                if doomed(&run) {
                    self.remove_run(tx, &run)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Remove every run, of any kind, that belongs to `trust_anchor`.
    pub fn remove_all_for_trust_anchor(&self, tx: &WriteTx, trust_anchor: u64) -> RunResult<usize> {
        let removed = self.remove_where(tx, |run| run.subject.trust_anchor() == trust_anchor)?;
        info!(trust_anchor, removed, "validation runs removed for trust anchor");
        Ok(removed)
    }

    /// Remove every repository run for `repository`.
    pub fn remove_all_for_rpki_repository(&self, tx: &WriteTx, repository: &str) -> RunResult<usize> {
        let removed = self.remove_where(tx, |run| run.subject.repository() == Some(repository))?;
        info!(repository, removed, "validation runs removed for repository");
        Ok(removed)
    }

    /// Remove runs completed before `completed_before`, except the latest
    /// successful run of each kind and subject. Running runs are kept.
    pub fn remove_old_validation_runs(&self, tx: &WriteTx, completed_before: DateTime<Utc>) -> RunResult<usize> {
        let mut keep = BTreeSet::new();
        for kind in RunKind::ALL {
            keep.extend(self.find_latest_successful(tx, kind)?.into_iter().map(|run| run.id));
        }
        let removed = self.remove_where(tx, |run| {
            !keep.contains(&run.id) && run.completed_at.is_some_and(|at| at < completed_before)
        })?;
        info!(removed, %completed_before, "old validation runs removed");
        Ok(removed)
    }

    fn checks_for_run(&self, tx: &impl Tx, run_id: u64, search: Option<&SearchTerm>) -> RunResult<Vec<ValidationCheck>> {
        let mut checks = Vec::new();
        for check_id in self.run_checks.get(tx, &Key::from_u64(run_id))? {
            if let Some(stored) = self.checks.get(tx, &Key::from_u64(check_id))? {
                if search.map_or(true, |term| term.matches(&stored.check)) {
                    checks.push(stored.check);
                }
            }
        }
        Ok(checks)
    }

    /// One page of a run's checks, filtered and sorted.
    pub fn find_validation_checks_for_run(
        &self,
        tx: &impl Tx,
        run_id: u64,
        paging: Paging,
        search: Option<&SearchTerm>,
        sorting: Sorting,
    ) -> RunResult<Vec<ValidationCheck>> {
        let mut checks = self.checks_for_run(tx, run_id, search)?;
        checks.sort_by(|a, b| sorting.compare(a, b));
        Ok(checks.into_iter().skip(paging.start).take(paging.size).collect())
    }

    pub fn count_validation_checks_for_run(
        &self,
        tx: &impl Tx,
        run_id: u64,
        search: Option<&SearchTerm>,
    ) -> RunResult<usize> {
        match search {
            None => Ok(self.run_checks.count(tx, &Key::from_u64(run_id))?),
            Some(_) => Ok(self.checks_for_run(tx, run_id, search)?.len()),
        }
    }

    /// Remove all runs and checks. Returns the number of runs removed.
    pub fn clear(&self, tx: &WriteTx) -> RunResult<usize> {
        let removed = self.runs.clear(tx)?;
        self.run_checks.clear(tx)?;
        self.checks.clear(tx)?;
        info!(removed, "validation runs cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Direction, SortBy};
    use crate::trust_anchor::TrustAnchor;
    use chrono::{Duration, TimeZone};
    use rpki_kv::Env;
    use rpki_types::{CheckStatus, ValidationResult};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn setup() -> (Env, ValidationRunStore, u64) {
        let env = Env::in_memory(&ValidationRunStore::TABLES).unwrap();
        let store = ValidationRunStore::new();
        let mut anchor = TrustAnchor::new("test ta", vec!["rsync://ta/ta.cer".into()], "MIIB");
        let ta = env.write_tx(|tx| store.trust_anchors().add(tx, &mut anchor)).unwrap();
        (env, store, ta)
    }

    fn completed(subject: RunSubject, status: RunStatus, at: DateTime<Utc>) -> ValidationRun {
        let mut run = ValidationRun::start(subject, at);
        run.status = status;
        run.completed_at = Some(at);
        run
    }

    fn add(env: &Env, store: &ValidationRunStore, mut run: ValidationRun) -> u64 {
        env.write_tx(|tx| store.add(tx, &mut run)).unwrap()
    }

    #[test]
    fn add_requires_registered_trust_anchor() {
        let (env, store, ta) = setup();
        let mut run = ValidationRun::start(RunSubject::TrustAnchor { trust_anchor: ta + 1 }, now());
        let err = env.write_tx(|tx| store.add(tx, &mut run)).unwrap_err();
        assert!(matches!(err, RunError::UnknownTrustAnchor(id) if id == ta + 1));
        assert!(env.read_tx(|tx| store.find_all(tx, RunKind::TrustAnchor)).unwrap().is_empty());
    }

    #[test]
    fn runs_are_typed_by_kind() {
        let (env, store, ta) = setup();
        let ta_run = add(&env, &store, ValidationRun::start(RunSubject::TrustAnchor { trust_anchor: ta }, now()));
        let tree_run = add(&env, &store, ValidationRun::start(RunSubject::CertificateTree { trust_anchor: ta }, now()));

        env.read_tx(|tx| {
            assert!(store.get(tx, RunKind::TrustAnchor, ta_run)?.is_some());
            assert!(store.get(tx, RunKind::TrustAnchor, tree_run)?.is_none());
            assert_eq!(store.find(tx, tree_run)?.map(|r| r.kind()), Some(RunKind::CertificateTree));
            assert_eq!(store.find_all(tx, RunKind::CertificateTree)?.len(), 1);
            assert_eq!(store.count(tx, RunKind::CertificateTree)?, 1);
            assert_eq!(store.count(tx, RunKind::TrustAnchor)?, 1);
            assert_eq!(store.count(tx, RunKind::Repository)?, 0);
            Ok::<_, RunError>(())
        })
        .unwrap();
    }

    #[test]
    fn latest_successful_is_per_subject_with_id_tie_break() {
        let (env, store, ta) = setup();
        let a = RunSubject::Repository { trust_anchor: ta, repository: "rsync://a/".into() };
        let b = RunSubject::Repository { trust_anchor: ta, repository: "rsync://b/".into() };
        add(&env, &store, completed(a.clone(), RunStatus::Succeeded, now() - Duration::days(2)));
        let a_first = add(&env, &store, completed(a.clone(), RunStatus::Succeeded, now()));
        let a_second = add(&env, &store, completed(a.clone(), RunStatus::Succeeded, now()));
        add(&env, &store, completed(a, RunStatus::Failed, now() + Duration::days(1)));
        let b_only = add(&env, &store, completed(b, RunStatus::Succeeded, now() - Duration::days(9)));
        assert!(a_second > a_first);

        let latest = env.read_tx(|tx| store.find_latest_successful(tx, RunKind::Repository)).unwrap();
        let mut ids: Vec<u64> = latest.iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec![a_second, b_only]);
    }

    #[test]
    fn latest_completed_for_trust_anchor_includes_failures_but_not_running() {
        let (env, store, ta) = setup();
        let subject = RunSubject::TrustAnchor { trust_anchor: ta };
        add(&env, &store, completed(subject.clone(), RunStatus::Succeeded, now() - Duration::hours(2)));
        let failed = add(&env, &store, completed(subject.clone(), RunStatus::Failed, now() - Duration::hours(1)));
        add(&env, &store, ValidationRun::start(subject, now()));

        let latest = env.read_tx(|tx| store.find_latest_completed_for_trust_anchor(tx, ta)).unwrap();
        assert_eq!(latest.map(|r| r.id), Some(failed));
        assert_eq!(env.read_tx(|tx| store.find_latest_completed_for_trust_anchor(tx, ta + 7)).unwrap(), None);
    }

    #[test]
    fn complete_only_from_running() {
        let (env, store, ta) = setup();
        let id = add(&env, &store, ValidationRun::start(RunSubject::TrustAnchor { trust_anchor: ta }, now()));

        let done = env.write_tx(|tx| store.complete(tx, id, RunStatus::Succeeded, now())).unwrap();
        assert_eq!(done.status, RunStatus::Succeeded);
        assert_eq!(
            env.read_tx(|tx| store.get(tx, RunKind::TrustAnchor, id)).unwrap().map(|r| r.completed_at),
            Some(Some(now()))
        );

        let err = env.write_tx(|tx| store.complete(tx, id, RunStatus::Failed, now())).unwrap_err();
        assert!(matches!(err, RunError::InvalidTransition { from: RunStatus::Succeeded, .. }));
        let err = env.write_tx(|tx| store.complete(tx, 999, RunStatus::Failed, now())).unwrap_err();
        assert!(matches!(err, RunError::RunNotFound(999)));
    }

    #[test]
    fn retention_keeps_latest_successful_regardless_of_age() {
        let (env, store, ta) = setup();
        let subject = RunSubject::TrustAnchor { trust_anchor: ta };
        let day = |n: i64| now() - Duration::days(n);

        let day40 = add(&env, &store, completed(subject.clone(), RunStatus::Succeeded, day(40)));
        let day30 = add(&env, &store, completed(subject.clone(), RunStatus::Succeeded, day(30)));
        let day20 = add(&env, &store, completed(subject.clone(), RunStatus::Failed, day(20)));
        let day1 = add(&env, &store, completed(subject, RunStatus::Failed, day(1)));

        let removed = env.write_tx(|tx| store.remove_old_validation_runs(tx, day(10))).unwrap();
        assert_eq!(removed, 2);

        let remaining: Vec<u64> = env
            .read_tx(|tx| store.find_all(tx, RunKind::TrustAnchor))
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(remaining, vec![day30, day1]);
        assert!(!remaining.contains(&day40) && !remaining.contains(&day20));

        // Nothing older than the last success is left, and it survives again.
        assert_eq!(env.write_tx(|tx| store.remove_old_validation_runs(tx, now())).unwrap(), 1);
        let remaining = env.read_tx(|tx| store.find_all(tx, RunKind::TrustAnchor)).unwrap();
        assert_eq!(remaining.iter().map(|r| r.id).collect::<Vec<_>>(), vec![day30]);
    }

    fn run_with_checks(env: &Env, store: &ValidationRunStore, ta: u64) -> u64 {
        let mut result = ValidationResult::with_location("rsync://repo/b.roa");
        result.error("roa.signature.invalid", vec!["AS65001".into()]);
        result.set_location("rsync://repo/a.cer");
        result.warn("cert.crl.stale", vec!["2d".into()]);
        result.pass("cert.valid");
        result.set_location("rsync://repo/c.mft");
        result.error("mft.hash.mismatch", vec!["a.roa".into()]);

        let mut run = ValidationRun::start(RunSubject::CertificateTree { trust_anchor: ta }, now());
        run.add_checks(result);
        add(env, store, run.finish(now()))
    }

    #[test]
    fn checks_page_sort_and_search() {
        let (env, store, ta) = setup();
        let run_id = run_with_checks(&env, &store, ta);

        env.read_tx(|tx| {
            assert_eq!(store.count_validation_checks_for_run(tx, run_id, None)?, 4);

            let by_location = store.find_validation_checks_for_run(
                tx,
                run_id,
                Paging::all(),
                None,
                Sorting::new(SortBy::Location, Direction::Asc),
            )?;
            let locations: Vec<&str> = by_location.iter().map(|c| c.location.as_str()).collect();
            assert_eq!(
                locations,
                vec!["rsync://repo/a.cer", "rsync://repo/a.cer", "rsync://repo/b.roa", "rsync://repo/c.mft"]
            );
            // Equal locations fall back to check id.
            assert!(by_location[0].id < by_location[1].id);

            let page = store.find_validation_checks_for_run(
                tx,
                run_id,
                Paging::new(1, 2),
                None,
                Sorting::default(),
            )?;
            let all = store.find_validation_checks_for_run(tx, run_id, Paging::all(), None, Sorting::default())?;
            assert_eq!(page, all[1..3].to_vec());

            let term = SearchTerm::new("ROA");
            let hits = store.find_validation_checks_for_run(tx, run_id, Paging::all(), Some(&term), Sorting::default())?;
            assert_eq!(hits.len(), 2);
            assert_eq!(store.count_validation_checks_for_run(tx, run_id, Some(&term))?, 2);

            let errors_first = store.find_validation_checks_for_run(
                tx,
                run_id,
                Paging::new(0, 2),
                None,
                Sorting::new(SortBy::Status, Direction::Desc),
            )?;
            assert!(errors_first.iter().all(|c| c.status == CheckStatus::Error));
            Ok::<_, RunError>(())
        })
        .unwrap();
    }

    #[test]
    fn cascading_removal_takes_checks_along() {
        let (env, store, ta) = setup();
        let tree = run_with_checks(&env, &store, ta);
        let repo_a = add(
            &env,
            &store,
            completed(RunSubject::Repository { trust_anchor: ta, repository: "rsync://a/".into() }, RunStatus::Succeeded, now()),
        );
        add(
            &env,
            &store,
            completed(RunSubject::Repository { trust_anchor: ta, repository: "rsync://b/".into() }, RunStatus::Succeeded, now()),
        );

        assert_eq!(env.write_tx(|tx| store.remove_all_for_rpki_repository(tx, "rsync://a/")).unwrap(), 1);
        assert_eq!(env.read_tx(|tx| store.find(tx, repo_a)).unwrap(), None);

        assert_eq!(env.write_tx(|tx| store.remove_all_for_trust_anchor(tx, ta)).unwrap(), 2);
        assert_eq!(env.read_tx(|tx| store.count_validation_checks_for_run(tx, tree, None)).unwrap(), 0);
        assert!(env.read_tx(|tx| store.checks.keys(tx)).unwrap().is_empty());
    }

    #[test]
    fn clear_counts_runs_and_ids_keep_growing() {
        let (env, store, ta) = setup();
        run_with_checks(&env, &store, ta);
        let last = run_with_checks(&env, &store, ta);
        assert_eq!(env.write_tx(|tx| store.clear(tx)).unwrap(), 2);
        assert!(env.read_tx(|tx| store.find_all(tx, RunKind::CertificateTree)).unwrap().is_empty());

        let next = run_with_checks(&env, &store, ta);
        assert!(next > last);
    }
}
