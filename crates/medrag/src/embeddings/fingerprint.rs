//! Content fingerprints used as embedding cache keys

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lowercase hex SHA-256 of whitespace-normalized content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint `content`. Leading and trailing whitespace is ignored and
    /// inner whitespace runs count as a single space.
    pub fn of(content: &str) -> Self {
        let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of an ordered set of contents, used to tell whether an index
/// was built from the same chunks
pub fn combined<'a>(contents: impl IntoIterator<Item = &'a str>) -> Fingerprint {
    let mut hasher = Sha256::new();
    for content in contents {
        hasher.update(Fingerprint::of(content).as_str().as_bytes());
        hasher.update(b"\n");
    }
    Fingerprint(format!("{:x}", hasher.finalize()))
}
