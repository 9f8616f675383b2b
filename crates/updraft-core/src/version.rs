use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

/// Ordering policy applied to every version string an updater sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionScheme {
    /// SemVer precedence.
    #[default]
    Semantic,
    /// Any byte-level difference counts as an update.
    Difference,
    /// Integer build numbers.
    Incremental,
    /// Decimal build numbers, compared as IEEE-754 doubles.
    DecimalIncremental,
}

impl fmt::Display for VersionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic => write!(f, "semantic"),
            Self::Difference => write!(f, "difference"),
            Self::Incremental => write!(f, "incremental"),
            Self::DecimalIncremental => write!(f, "decimal incremental"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Malformed semantic version: {input:?}")]
    Semantic { input: String },
    #[error("Malformed integer version: {input:?}")]
    Integer { input: String },
    #[error("Malformed decimal version: {input:?}")]
    Decimal { input: String },
    #[error("Cannot compare a {candidate} version with a {current} version")]
    SchemeMismatch {
        candidate: VersionScheme,
        current: VersionScheme,
    },
}

/// A version value typed by the scheme it belongs to.
///
/// The scheme is carried by the variant, so a payload can never be read
/// under the wrong scheme.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemeVersion {
    Semantic(Version),
    Difference(String),
    Incremental(i64),
    DecimalIncremental(f64),
}

/// The version of the running application.
pub type CurrentVersion = SchemeVersion;

impl SchemeVersion {
    /// Parse `raw` under `scheme`.
    ///
    /// # Errors
    /// Returns an error when `raw` cannot be represented under `scheme`, for
    /// example `"v2.0.1"` under [`VersionScheme::Incremental`].
    pub fn parse(scheme: VersionScheme, raw: &str) -> Result<Self, VersionParseError> {
        match scheme {
            VersionScheme::Semantic => {
                parse_semver(raw)
                    .map(Self::Semantic)
                    .ok_or_else(|| VersionParseError::Semantic {
                        input: raw.to_string(),
                    })
            }
            VersionScheme::Difference => Ok(Self::Difference(raw.to_string())),
            VersionScheme::Incremental => {
                raw.parse::<i64>()
                    .map(Self::Incremental)
                    .map_err(|_| VersionParseError::Integer {
                        input: raw.to_string(),
                    })
            }
            VersionScheme::DecimalIncremental => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Self::DecimalIncremental)
                .ok_or_else(|| VersionParseError::Decimal {
                    input: raw.to_string(),
                }),
        }
    }

    #[must_use]
    pub fn scheme(&self) -> VersionScheme {
        match self {
            Self::Semantic(_) => VersionScheme::Semantic,
            Self::Difference(_) => VersionScheme::Difference,
            Self::Incremental(_) => VersionScheme::Incremental,
            Self::DecimalIncremental(_) => VersionScheme::DecimalIncremental,
        }
    }

    /// Whether `self` should replace `current`.
    ///
    /// # Errors
    /// Returns [`VersionParseError::SchemeMismatch`] when the two values were
    /// parsed under different schemes.
    pub fn is_newer_than(&self, current: &Self) -> Result<bool, VersionParseError> {
        match (self, current) {
            (Self::Semantic(candidate), Self::Semantic(current)) => Ok(candidate > current),
            (Self::Difference(candidate), Self::Difference(current)) => {
                Ok(candidate.as_bytes() != current.as_bytes())
            }
            (Self::Incremental(candidate), Self::Incremental(current)) => Ok(candidate > current),
            // Exact comparison: "2.01" and "2.0099999" are distinct values.
            (Self::DecimalIncremental(candidate), Self::DecimalIncremental(current)) => {
                Ok(candidate > current)
            }
            _ => Err(VersionParseError::SchemeMismatch {
                candidate: self.scheme(),
                current: current.scheme(),
            }),
        }
    }
}

impl fmt::Display for SchemeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semantic(version) => write!(f, "{version}"),
            Self::Difference(version) => write!(f, "{version}"),
            Self::Incremental(version) => write!(f, "{version}"),
            Self::DecimalIncremental(version) => write!(f, "{version}"),
        }
    }
}

/// Parse `candidate` under the scheme of `current` and report whether it is
/// newer.
///
/// # Errors
/// Returns an error when `candidate` is malformed under the active scheme.
pub fn is_newer(candidate: &str, current: &CurrentVersion) -> Result<bool, VersionParseError> {
    SchemeVersion::parse(current.scheme(), candidate)?.is_newer_than(current)
}

fn parse_semver(version: &str) -> Option<Version> {
    let version = version
        .strip_prefix(['v', 'V'])
        .unwrap_or(version);

    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().map(str::parse::<u64>).transpose().ok()?;
    let patch = parts.next().map(str::parse::<u64>).transpose().ok()?;

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}
