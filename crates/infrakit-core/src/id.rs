//! Logical identifiers for template resources.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum length of a CloudFormation logical id.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Number of hex characters of the path hash appended to generated ids.
const HASH_LEN: usize = 8;

/// The identifier of a resource inside a template.
///
/// Generated ids keep the alphanumeric characters of the construct path and
/// append a short hash of the full path, so `"My Bucket"` and `"MyBucket"`
/// never collide.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("{_0}")]
pub struct LogicalId(String);

impl LogicalId {
    /// Use `raw` verbatim. It must be non-empty and alphanumeric.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_LOGICAL_ID_LEN {
            return Err(Error::invalid(
                "logical id",
                format!("'{raw}' must be 1-{MAX_LOGICAL_ID_LEN} characters"),
            ));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::invalid(
                "logical id",
                format!("'{raw}' must be alphanumeric"),
            ));
        }
        Ok(Self(raw))
    }

    /// Derive an id from a construct path such as `["FrontEnd", "Bucket"]`.
    pub fn from_path(components: &[&str]) -> Self {
        let path = components.join("/");
        let digest = format!("{:x}", md5::compute(path.as_bytes())).to_uppercase();

        let mut human: String = components
            .iter()
            .flat_map(|c| c.chars())
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        human.truncate(MAX_LOGICAL_ID_LEN - HASH_LEN);

        Self(format!("{human}{}", &digest[..HASH_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_is_deterministic() {
        let a = LogicalId::from_path(&["FrontEnd-Bucket"]);
        let b = LogicalId::from_path(&["FrontEnd-Bucket"]);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("FrontEndBucket"));
        assert_eq!(a.as_str().len(), "FrontEndBucket".len() + HASH_LEN);
    }

    #[test]
    fn test_from_path_distinguishes_separators() {
        let spaced = LogicalId::from_path(&["My Bucket"]);
        let joined = LogicalId::from_path(&["MyBucket"]);
        assert_ne!(spaced, joined);
    }

    #[test]
    fn test_new_rejects_symbols() {
        assert!(LogicalId::new("Bucket-1").is_err());
        assert!(LogicalId::new("").is_err());
        assert_eq!(LogicalId::new("Bucket1").unwrap().as_str(), "Bucket1");
    }
}
