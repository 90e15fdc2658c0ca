use std::fmt;

use chrono::{DateTime, Utc};
use rpki_types::{CheckStatus, ValidationCheck, ValidationResult};
use serde::{Deserialize, Serialize};

/// Which of the validation pipelines produced a run.
///
/// The tag byte leads every key in the `runs` table, so existing tags must
/// never be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunKind {
    TrustAnchor,
    CertificateTree,
    Repository,
}

impl RunKind {
    pub const ALL: [RunKind; 3] = [Self::TrustAnchor, Self::CertificateTree, Self::Repository];

    pub fn tag(self) -> u8 {
        match self {
            Self::TrustAnchor => 1,
            Self::CertificateTree => 2,
            Self::Repository => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TrustAnchor => "trust-anchor",
            Self::CertificateTree => "certificate-tree",
            Self::Repository => "repository",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RunKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown run kind: {s}"))
    }
}

/// What a run validated. Every run belongs to a trust anchor; repository
/// runs also name the repository they fetched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunSubject {
    TrustAnchor { trust_anchor: u64 },
    CertificateTree { trust_anchor: u64 },
    Repository { trust_anchor: u64, repository: String },
}

impl RunSubject {
    pub fn kind(&self) -> RunKind {
        match self {
            Self::TrustAnchor { .. } => RunKind::TrustAnchor,
            Self::CertificateTree { .. } => RunKind::CertificateTree,
            Self::Repository { .. } => RunKind::Repository,
        }
    }

    pub fn trust_anchor(&self) -> u64 {
        match self {
            Self::TrustAnchor { trust_anchor }
            | Self::CertificateTree { trust_anchor }
            | Self::Repository { trust_anchor, .. } => *trust_anchor,
        }
    }

    pub fn repository(&self) -> Option<&str> {
        match self {
            Self::Repository { repository, .. } => Some(repository),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_completed(self) -> bool {
        self != Self::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One execution of a validation pipeline.
///
/// `checks` travel with the run only when it is added; the store keeps them
/// in their own tables and serves them through paged queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub id: u64,
    pub subject: RunSubject,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub checks: Vec<ValidationCheck>,
}

impl ValidationRun {
    /// A new running run.
    pub fn start(subject: RunSubject, created_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            subject,
            status: RunStatus::Running,
            created_at,
            completed_at: None,
            checks: Vec::new(),
        }
    }

    pub fn kind(&self) -> RunKind {
        self.subject.kind()
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Attach the findings of `result`.
    pub fn add_checks(&mut self, result: ValidationResult) {
        self.checks.extend(result.into_checks());
    }

    /// Finish the run: failed if any finding is an error, succeeded otherwise.
    pub fn finish(mut self, completed_at: DateTime<Utc>) -> Self {
        let failed = self.checks.iter().any(|c| c.status == CheckStatus::Error);
        self.status = if failed { RunStatus::Failed } else { RunStatus::Succeeded };
        self.completed_at = Some(completed_at);
        self
    }

    /// Ordering used for "latest": completion instant, then id.
    pub(crate) fn recency(&self) -> (Option<DateTime<Utc>>, u64) {
        (self.completed_at, self.id)
    }
}
