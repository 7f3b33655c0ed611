// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Account registration, login and lookup.

use std::sync::Arc;

use docpress_core::error::{DocpressError, Result};
use docpress_core::types::{Account, NewAccount, Role};
use docpress_security::{ApiKeyGenerator, CredentialHasher};
use tracing::{debug, info, instrument, warn};

use crate::store::AccountStore;

/// Registration and credential checks over an [`AccountStore`].
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn CredentialHasher>,
    keys: Arc<dyn ApiKeyGenerator>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: Arc<dyn CredentialHasher>,
        keys: Arc<dyn ApiKeyGenerator>,
    ) -> Self {
        Self { store, hasher, keys }
    }

    /// Create a FREE, active account with zeroed counters and a fresh API
    /// key. An email already on file fails with `DuplicateEmail` before any
    /// hashing or write happens.
    #[instrument(skip(self, password, name))]
    pub fn register(&self, email: &str, password: &str, name: &str) -> Result<Account> {
        if self.store.exists_by_email(email)? {
            debug!("email already registered");
            return Err(DocpressError::DuplicateEmail(email.to_string()));
        }

        let account = self.store.insert(NewAccount {
            email: email.to_string(),
            password_hash: self.hasher.hash(password)?,
            name: name.to_string(),
            role: Role::Free,
            api_key: self.keys.generate(),
        })?;

        info!(account_id = %account.id, "account registered");
        Ok(account)
    }

    /// Check `password` against the stored hash for `email`.
    #[instrument(skip(self, password))]
    pub fn login(&self, email: &str, password: &str) -> Result<Account> {
        let account = self
            .store
            .get_by_email(email)?
            .ok_or_else(|| DocpressError::NotFound(format!("account for {email}")))?;

        if !self.hasher.verify(password, &account.password_hash) {
            warn!(account_id = %account.id, "password mismatch");
            return Err(DocpressError::BadCredential);
        }

        debug!(account_id = %account.id, "login succeeded");
        Ok(account)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.store.get_by_email(email)
    }

    pub fn find_by_api_key(&self, api_key: &str) -> Result<Option<Account>> {
        self.store.get_by_api_key(api_key)
    }
}
