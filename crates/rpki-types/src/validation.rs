use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a single validation check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckStatus {
    Passed,
    Warning,
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One finding produced while validating an object at some location.
///
/// `id` is zero until the check is persisted as part of a validation run;
/// the run store assigns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub id: u64,
    pub status: CheckStatus,
    pub location: String,
    pub key: String,
    pub parameters: Vec<String>,
}

impl ValidationCheck {
    pub fn new(
        status: CheckStatus,
        location: impl Into<String>,
        key: impl Into<String>,
        parameters: Vec<String>,
    ) -> Self {
        Self {
            id: 0,
            status,
            location: location.into(),
            key: key.into(),
            parameters,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status != CheckStatus::Passed
    }
}

/// Accumulator of findings, threaded through lookups that may fail softly.
///
/// Findings are recorded against the current location, which callers move
/// as they walk from one object to the next.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    location: String,
    checks: Vec<ValidationCheck>,
}

impl ValidationResult {
    pub fn with_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            checks: Vec::new(),
        }
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn pass(&mut self, key: &str) {
        self.record(CheckStatus::Passed, key, Vec::new());
    }

    pub fn warn(&mut self, key: &str, parameters: Vec<String>) {
        self.record(CheckStatus::Warning, key, parameters);
    }

    pub fn error(&mut self, key: &str, parameters: Vec<String>) {
        self.record(CheckStatus::Error, key, parameters);
    }

    fn record(&mut self, status: CheckStatus, key: &str, parameters: Vec<String>) {
        self.checks.push(ValidationCheck::new(
            status,
            self.location.clone(),
            key,
            parameters,
        ));
    }

    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status == CheckStatus::Warning).count()
    }

    pub fn error_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status == CheckStatus::Error).count()
    }

    pub fn checks(&self) -> &[ValidationCheck] {
        &self.checks
    }

    pub fn into_checks(self) -> Vec<ValidationCheck> {
        self.checks
    }
}
