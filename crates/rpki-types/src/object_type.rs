use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of signed object held in the store.
///
/// The tag byte is part of the persisted type index, so existing tags must
/// never be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    /// Resource certificate (`.cer`).
    Certificate,
    /// BGPsec router certificate.
    RouterCertificate,
    /// Manifest (`.mft`).
    Manifest,
    /// Certificate revocation list (`.crl`).
    Crl,
    /// Route origin authorization (`.roa`).
    Roa,
    /// Ghostbusters record (`.gbr`).
    Gbr,
    /// AS provider authorization (`.asa`).
    Aspa,
    /// Anything else published in a repository.
    Other,
}

impl ObjectType {
    pub const ALL: [ObjectType; 8] = [
        Self::Certificate,
        Self::RouterCertificate,
        Self::Manifest,
        Self::Crl,
        Self::Roa,
        Self::Gbr,
        Self::Aspa,
        Self::Other,
    ];

    pub fn tag(self) -> u8 {
        match self {
            Self::Certificate => 1,
            Self::RouterCertificate => 2,
            Self::Manifest => 3,
            Self::Crl => 4,
            Self::Roa => 5,
            Self::Gbr => 6,
            Self::Aspa => 7,
            Self::Other => 0xff,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == tag)
            .ok_or(TypeError::UnknownObjectType(tag))
    }

    /// Guess the type from a repository file name, the way publication
    /// points name their files.
    pub fn from_file_name(name: &str) -> Self {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("cer") => Self::Certificate,
            Some("mft") => Self::Manifest,
            Some("crl") => Self::Crl,
            Some("roa") => Self::Roa,
            Some("gbr") => Self::Gbr,
            Some("asa") => Self::Aspa,
            _ => Self::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Certificate => "cer",
            Self::RouterCertificate => "router-cer",
            Self::Manifest => "mft",
            Self::Crl => "crl",
            Self::Roa => "roa",
            Self::Gbr => "gbr",
            Self::Aspa => "aspa",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownObjectTypeName(s.to_string()))
    }
}
