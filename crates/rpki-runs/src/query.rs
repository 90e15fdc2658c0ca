//! Paging, sorting and search over validation checks.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rpki_types::ValidationCheck;
use serde::{Deserialize, Serialize};

/// A window of `size` results starting at offset `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub start: usize,
    pub size: usize,
}

impl Paging {
    pub fn new(start: usize, size: usize) -> Self {
        Self { start, size }
    }

    /// Everything, in one page.
    pub fn all() -> Self {
        Self::new(0, usize::MAX)
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[default]
    Id,
    Status,
    Location,
    Key,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "status" => Ok(Self::Status),
            "location" => Ok(Self::Location),
            "key" => Ok(Self::Key),
            _ => Err(format!("unknown sort field: {s}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("unknown sort direction: {s}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    pub by: SortBy,
    pub direction: Direction,
}

impl Sorting {
    pub fn new(by: SortBy, direction: Direction) -> Self {
        Self { by, direction }
    }

    /// Order two checks. Equal sort fields fall back to ascending check id
    /// whatever the direction, so pages are stable.
    pub fn compare(&self, a: &ValidationCheck, b: &ValidationCheck) -> Ordering {
        let primary = match self.by {
            SortBy::Id => a.id.cmp(&b.id),
            SortBy::Status => a.status.cmp(&b.status),
            SortBy::Location => a.location.cmp(&b.location),
            SortBy::Key => a.key.cmp(&b.key),
        };
        let primary = match self.direction {
            Direction::Asc => primary,
            Direction::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Case-insensitive substring filter over a check's location, message key
/// and parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn new(term: &str) -> Self {
        Self(term.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, check: &ValidationCheck) -> bool {
        let hit = |field: &str| field.to_lowercase().contains(&self.0);
        hit(&check.location) || hit(&check.key) || check.parameters.iter().any(|p| hit(p))
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
