//! Version selection policy shared by the HTTP and OCI resolvers

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How "latest" is chosen when no version is requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOrdering {
    /// Plain string comparison: `"1.9.0"` sorts after `"1.10.0"`
    #[default]
    Lexicographic,
    /// Semantic versioning, with a leading `v` tolerated
    Semver,
}

impl VersionOrdering {
    /// Compare two version strings under this ordering
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            VersionOrdering::Lexicographic => a.cmp(b),
            VersionOrdering::Semver => {
                match (parse_semver(a), parse_semver(b)) {
                    (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => a.cmp(b),
                }
            }
        }
    }

    /// Pick the greatest item by its version key
    ///
    /// On ties the earliest item wins.
    pub fn latest_by<'a, T, F>(self, items: impl IntoIterator<Item = &'a T>, key: F) -> Option<&'a T>
    where
        T: 'a,
        F: Fn(&T) -> &str,
    {
        items.into_iter().reduce(|best, candidate| {
            if self.compare(key(candidate), key(best)) == Ordering::Greater {
                candidate
            } else {
                best
            }
        })
    }

    /// Pick the greatest version string
    pub fn latest<'a>(self, versions: &'a [String]) -> Option<&'a str> {
        self.latest_by(versions, |v| v.as_str()).map(String::as_str)
    }
}

fn parse_semver(version: &str) -> Option<Version> {
    let stripped = version.strip_prefix('v').unwrap_or(version);
    Version::parse(stripped).ok()
}
