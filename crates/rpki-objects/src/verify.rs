use rpki_types::Key;
use serde::Serialize;

/// One index entry that disagrees with the primary table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexProblem {
    pub index: &'static str,
    pub object: Key,
}

impl IndexProblem {
    pub fn new(index: &'static str, object: Key) -> Self {
        Self { index, object }
    }
}

/// Outcome of [`crate::ObjectStore::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Primary records walked.
    pub objects: usize,
    /// Location entries walked.
    pub locations: usize,
    /// Index entries pointing at objects that are not stored.
    pub dangling: Vec<IndexProblem>,
    /// Index entries filed under a key that does not match the object,
    /// e.g. an outdated reachability instant.
    pub stale: Vec<IndexProblem>,
    /// Stored objects missing from an index they belong in.
    pub unindexed: Vec<IndexProblem>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty() && self.stale.is_empty() && self.unindexed.is_empty()
    }

    pub fn problem_count(&self) -> usize {
        self.dangling.len() + self.stale.len() + self.unindexed.len()
    }
}
