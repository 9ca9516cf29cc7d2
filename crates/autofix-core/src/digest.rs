//! SHA-256 content digests for source artifacts and run configuration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{AutofixError, Result};

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always lowercase hex produced
/// by `from_bytes` or validated through `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of an ordered list of parts, NUL-separated so that
    /// `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_ref());
            hasher.update(b"\0");
        }
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = AutofixError;

    fn try_from(s: String) -> Result<Self> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AutofixError::InvalidConfig(format!(
                "not a sha256 hex digest: {s}"
            )));
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_is_deterministic() {
        let a = ContentDigest::from_bytes(b"class Main {}");
        let b = ContentDigest::from_bytes(b"class Main {}");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_from_parts_is_order_and_boundary_sensitive() {
        let ab_c = ContentDigest::from_parts(["ab", "c"]);
        let a_bc = ContentDigest::from_parts(["a", "bc"]);
        let c_ab = ContentDigest::from_parts(["c", "ab"]);
        assert_ne!(ab_c, a_bc);
        assert_ne!(ab_c, c_ab);
    }

    #[test]
    fn test_try_from_rejects_non_hex() {
        assert!(ContentDigest::try_from("xyz".to_string()).is_err());
        let upper = "A".repeat(64);
        let parsed = ContentDigest::try_from(upper).expect("valid hex");
        assert_eq!(parsed.as_str(), "a".repeat(64));
    }
}
