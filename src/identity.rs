use std::sync::RwLock;

use anyhow::Result;
use log::info;

use crate::models::AccountKey;

/// Supplies the account of the currently authenticated principal.
pub trait IdentityProvider: Send + Sync {
    fn current_account(&self) -> Option<AccountKey>;
}

/// Holds the account for the lifetime of a signed-in session.
#[derive(Default)]
pub struct SessionIdentity {
    account: RwLock<Option<AccountKey>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(email: &str) -> Result<Self> {
        let identity = Self::new();
        identity.sign_in(email)?;
        Ok(identity)
    }

    pub fn sign_in(&self, email: &str) -> Result<()> {
        let key = AccountKey::from_email(email)?;
        info!("session bound to account {key}");
        *self.write_guard() = Some(key);
        Ok(())
    }

    pub fn sign_out(&self) {
        if let Some(key) = self.write_guard().take() {
            info!("session for account {key} ended");
        }
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Option<AccountKey>> {
        match self.account.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_account(&self) -> Option<AccountKey> {
        match self.account.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
