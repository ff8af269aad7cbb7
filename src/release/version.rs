//! Release version ordering

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric `major.minor.patch` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a release tag such as `v2.0.0`, `V1.8` or `1.7.2`
    ///
    /// A leading `v`/`V` is ignored, missing components count as zero and
    /// anything after a `-` or `+` (pre-release or build data) is ignored.
    /// Returns `None` for an empty tag or a non-numeric component.
    ///
    /// ```
    /// use slugshot::release::Version;
    /// assert_eq!(Version::parse_tag("v2.0.0"), Some(Version::new(2, 0, 0)));
    /// assert_eq!(Version::parse_tag("V1.8"), Some(Version::new(1, 8, 0)));
    /// assert_eq!(Version::parse_tag("latest"), None);
    /// ```
    #[must_use]
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let trimmed = tag.trim().trim_start_matches(['v', 'V']);
        let core = trimmed.split(['-', '+']).next().unwrap_or_default();
        if core.is_empty() {
            return None;
        }

        let mut parts = [0u64; 3];
        for (i, part) in core.split('.').enumerate() {
            if i >= parts.len() {
                break;
            }
            parts[i] = part.parse().ok()?;
        }

        Some(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Whether `remote` is strictly newer than `installed`
///
/// Unparseable versions never compare as newer.
#[must_use]
pub fn is_newer(remote: &str, installed: &str) -> bool {
    match (Version::parse_tag(remote), Version::parse_tag(installed)) {
        (Some(remote), Some(installed)) => remote > installed,
        _ => false,
    }
}
