use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Characters that would break the fast store's `account/RawData/timestamp` paths.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

/// Opaque partition key for one authenticated account.
///
/// The same key addresses the account in the durable and the fast store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountKey(String);

impl AccountKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            bail!("account key must not be empty");
        }
        if let Some(bad) = key.chars().find(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
            bail!("account key '{key}' contains forbidden character '{bad}'");
        }
        Ok(Self(key))
    }

    /// Derives the key from an email address: everything before the first `@`.
    pub fn from_email(email: &str) -> Result<Self> {
        let local = email.split('@').next().unwrap_or_default().trim();
        Self::new(local)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccountKey {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AccountKey> for String {
    fn from(key: AccountKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_local_part_becomes_key() {
        let key = AccountKey::from_email("alice@example.com").unwrap();
        assert_eq!(key.as_str(), "alice");
    }

    #[test]
    fn rejects_keys_that_break_tree_paths() {
        assert!(AccountKey::new("").is_err());
        assert!(AccountKey::new("a/b").is_err());
        assert!(AccountKey::from_email("first.last@example.com").is_err());
        assert!(AccountKey::from_email("@example.com").is_err());
    }
}
