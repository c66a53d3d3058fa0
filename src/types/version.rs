// ABOUTME: Release version in the `vMAJOR.MINOR.PATCH` form.
// ABOUTME: Parsing rejects anything that does not match ^v\d+\.\d+\.\d+$.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version cannot be empty")]
    Empty,

    #[error("version '{0}' must start with 'v'")]
    MissingPrefix(String),

    #[error("version '{0}' must have exactly three components (vMAJOR.MINOR.PATCH)")]
    WrongComponentCount(String),

    #[error("version '{value}' has a non-numeric component '{component}'")]
    NonNumeric { value: String, component: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(value: &str) -> Result<Self, VersionError> {
        if value.is_empty() {
            return Err(VersionError::Empty);
        }

        let rest = value
            .strip_prefix('v')
            .ok_or_else(|| VersionError::MissingPrefix(value.to_string()))?;

        let parts: Vec<&str> = rest.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::WrongComponentCount(value.to_string()));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            // u64::from_str accepts a leading '+', the pattern does not
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::NonNumeric {
                    value: value.to_string(),
                    component: part.to_string(),
                });
            }
            *slot = part.parse().map_err(|_| VersionError::NonNumeric {
                value: value.to_string(),
                component: part.to_string(),
            })?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}
