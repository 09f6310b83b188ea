//! Backup schema versions.
//!
//! Older documents carry the version as an integer (`3`), a bare string
//! (`"3"`) or a dotted string (`"3.0"`). All of them parse into
//! [`SchemaVersion`]; it is always written back as `"<major>.0"`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    /// Records only.
    V1,
    /// Adds containers.
    V2,
    /// Adds version history, AI config and settings. Last single-document format.
    V3,
    /// Manifest layout: core document and assets stored separately.
    V4,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V4;
    /// Version written by legacy single-document uploads.
    pub const LEGACY: SchemaVersion = SchemaVersion::V3;

    pub fn major(self) -> u32 {
        match self {
            SchemaVersion::V1 => 1,
            SchemaVersion::V2 => 2,
            SchemaVersion::V3 => 3,
            SchemaVersion::V4 => 4,
        }
    }

    pub fn from_major(major: u64) -> Option<Self> {
        match major {
            1 => Some(SchemaVersion::V1),
            2 => Some(SchemaVersion::V2),
            3 => Some(SchemaVersion::V3),
            4 => Some(SchemaVersion::V4),
            _ => None,
        }
    }

    /// The version one migration step above this one.
    pub fn next(self) -> Option<Self> {
        Self::from_major(u64::from(self.major()) + 1)
    }

    /// Parse the dotted or bare string form.
    pub fn parse(text: &str) -> Option<Self> {
        let major = text.trim().split('.').next()?;
        major.parse::<u64>().ok().and_then(Self::from_major)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVersion::V1 => "1.0",
            SchemaVersion::V2 => "2.0",
            SchemaVersion::V3 => "3.0",
            SchemaVersion::V4 => "4.0",
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        SchemaVersion::V1
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Integer(u64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawVersion::deserialize(deserializer)?;
        let parsed = match &raw {
            RawVersion::Integer(n) => SchemaVersion::from_major(*n),
            RawVersion::Float(f) if f.fract() == 0.0 && *f >= 0.0 => {
                SchemaVersion::from_major(*f as u64)
            }
            RawVersion::Float(_) => None,
            RawVersion::Text(s) => SchemaVersion::parse(s),
        };
        parsed.ok_or_else(|| {
            let shown = match raw {
                RawVersion::Integer(n) => n.to_string(),
                RawVersion::Float(f) => f.to_string(),
                RawVersion::Text(s) => s,
            };
            serde::de::Error::custom(format!("unsupported schema version: {shown}"))
        })
    }
}
