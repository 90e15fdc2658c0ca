//! Validation run history for the RPKI object store.
//!
//! Runs are appended per trust anchor, certificate tree or repository and
//! own the checks they produced. Old runs are pruned by
//! [`ValidationRunStore::remove_old_validation_runs`], which always keeps
//! the latest successful run of each subject.

pub mod error;
pub mod query;
pub mod run;
pub mod store;
pub mod trust_anchor;

pub use error::{RunError, RunResult};
pub use query::{Direction, Paging, SearchTerm, SortBy, Sorting};
pub use run::{RunKind, RunStatus, RunSubject, ValidationRun};
pub use store::ValidationRunStore;
pub use trust_anchor::{TrustAnchor, TrustAnchors};
