//! Partition keys.
//!
//! Every location and location type belongs to exactly one partition (a tenant's
//! catalog). The key is stored in the `resource_path` column of both tables.

use serde::{Deserialize, Serialize};

/// Opaque tenant scope for a catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a partition key, rejecting blank values.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_keys_rejected() {
        assert!(PartitionKey::new("").is_none());
        assert!(PartitionKey::new("   ").is_none());
    }

    #[test]
    fn test_key_preserved_verbatim() {
        let key = PartitionKey::new("-2147483648").unwrap();
        assert_eq!(key.as_str(), "-2147483648");
        assert_eq!(key.to_string(), "-2147483648");
    }
}
