// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Account persistence.
//
// The store is the single source of truth for counters; nothing above it
// caches accounts. Every read-modify-write goes through `update`, which the
// backends make atomic per account.

pub mod memory;
pub mod sqlite;

use docpress_core::error::Result;
use docpress_core::types::{Account, AccountId, NewAccount};

pub use memory::MemoryAccountStore;
pub use sqlite::SqliteAccountStore;

/// Closure run by [`AccountStore::update`]. Returning `Err` aborts the
/// update and leaves the stored record untouched.
pub type AccountMutation<'a> = &'a mut dyn FnMut(&mut Account) -> Result<()>;

/// Keyed, transactional repository of accounts.
pub trait AccountStore: Send + Sync {
    fn get(&self, id: AccountId) -> Result<Option<Account>>;

    fn get_by_email(&self, email: &str) -> Result<Option<Account>>;

    fn get_by_api_key(&self, api_key: &str) -> Result<Option<Account>>;

    fn exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.get_by_email(email)?.is_some())
    }

    /// Create an account, assigning its id and timestamps. Fails with
    /// `DuplicateEmail` without writing anything if the email is taken.
    fn insert(&self, new: NewAccount) -> Result<Account>;

    /// Overwrite an existing record. `NotFound` if the id is unknown.
    fn save(&self, account: &Account) -> Result<()>;

    /// Every account, ordered by id.
    fn list_all(&self) -> Result<Vec<Account>>;

    /// Overwrite several records as one unit: all are written or none. A
    /// repeated id keeps the last record given for it.
    fn save_all(&self, accounts: &[Account]) -> Result<()>;

    /// Load `id`, run `f` on it and persist the result as one atomic unit
    /// with respect to every other `update` on the same account.
    ///
    /// `NotFound` if the account does not exist. If `f` fails, its error is
    /// returned and nothing is written. On success the saved record is
    /// returned.
    fn update(&self, id: AccountId, f: AccountMutation<'_>) -> Result<Account>;

    /// Run `f` on every account and persist all of them as one unit. Each
    /// account is serialized against concurrent `update` calls on it.
    /// Returns the number of accounts touched.
    fn update_all(&self, f: &mut dyn FnMut(&mut Account)) -> Result<usize>;
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share, run against each store's tests.

    use docpress_core::error::DocpressError;
    use docpress_core::types::{FeatureType, Role};

    use super::*;

    pub(crate) fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.into(),
            password_hash: "hash".into(),
            name: "Test User".into(),
            role: Role::Free,
            api_key: format!("key-{email}"),
        }
    }

    pub(crate) fn insert_and_lookup(store: &dyn AccountStore) {
        let created = store.insert(new_account("a@example.com")).unwrap();
        assert!(created.is_active);
        assert_eq!(created.daily_usage, 0);

        let by_id = store.get(created.id).unwrap().unwrap();
        assert_eq!(by_id, created);
        let by_email = store.get_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        let by_key = store.get_by_api_key("key-a@example.com").unwrap().unwrap();
        assert_eq!(by_key.id, created.id);

        assert!(store.exists_by_email("a@example.com").unwrap());
        assert!(!store.exists_by_email("b@example.com").unwrap());
        assert!(store.get(AccountId(9_999)).unwrap().is_none());
    }

    pub(crate) fn duplicate_email_is_rejected(store: &dyn AccountStore) {
        store.insert(new_account("dup@example.com")).unwrap();
        let mut again = new_account("dup@example.com");
        again.api_key = "other-key".into();
        let err = store.insert(again).unwrap_err();
        assert!(matches!(err, DocpressError::DuplicateEmail(_)));
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    pub(crate) fn update_persists_on_success(store: &dyn AccountStore) {
        let id = store.insert(new_account("u@example.com")).unwrap().id;
        let saved = store
            .update(id, &mut |account| {
                account.record_feature_usage(FeatureType::PdfSplit);
                Ok(())
            })
            .unwrap();
        assert_eq!(saved.daily_usage, 1);

        let reloaded = store.get(id).unwrap().unwrap();
        assert_eq!(reloaded.daily_usage, 1);
        assert_eq!(reloaded.monthly_usage, 1);
        assert_eq!(reloaded.feature_usage.get(FeatureType::PdfSplit), 1);
    }

    pub(crate) fn update_rolls_back_on_error(store: &dyn AccountStore) {
        let id = store.insert(new_account("r@example.com")).unwrap().id;
        let err = store
            .update(id, &mut |account| {
                account.record_usage();
                Err(DocpressError::InvalidRequest("nope".into()))
            })
            .unwrap_err();
        assert!(matches!(err, DocpressError::InvalidRequest(_)));
        assert_eq!(store.get(id).unwrap().unwrap().daily_usage, 0);
    }

    pub(crate) fn update_unknown_is_not_found(store: &dyn AccountStore) {
        let err = store.update(AccountId(404), &mut |_| Ok(())).unwrap_err();
        assert!(matches!(err, DocpressError::NotFound(_)));
    }

    pub(crate) fn save_all_and_update_all(store: &dyn AccountStore) {
        for email in ["x@example.com", "y@example.com", "z@example.com"] {
            let id = store.insert(new_account(email)).unwrap().id;
            store
                .update(id, &mut |a| {
                    a.record_usage();
                    Ok(())
                })
                .unwrap();
        }

        let mut all = store.list_all().unwrap();
        assert_eq!(all.len(), 3);
        for account in &mut all {
            account.name = "Renamed".into();
        }
        store.save_all(&all).unwrap();
        assert!(store.list_all().unwrap().iter().all(|a| a.name == "Renamed"));

        let touched = store.update_all(&mut |a| a.reset_daily()).unwrap();
        assert_eq!(touched, 3);
        for account in store.list_all().unwrap() {
            assert_eq!(account.daily_usage, 0);
            assert_eq!(account.monthly_usage, 1);
        }
    }
}
