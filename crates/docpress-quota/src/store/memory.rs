// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory account store for tests and the no-disk fallback.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use docpress_core::error::{DocpressError, Result};
use docpress_core::types::{Account, AccountId, NewAccount};
use tracing::{debug, info, instrument};

use super::{AccountMutation, AccountStore};

/// Each account sits behind its own mutex so updates to different accounts
/// never contend; the outer lock only guards the indexes.
#[derive(Default)]
struct Index {
    next_id: i64,
    by_id: BTreeMap<AccountId, Arc<Mutex<Account>>>,
    by_email: HashMap<String, AccountId>,
    by_api_key: HashMap<String, AccountId>,
}

#[derive(Default)]
pub struct MemoryAccountStore {
    index: RwLock<Index>,
}

fn poisoned<T>(_: T) -> DocpressError {
    DocpressError::Database("account store lock poisoned".into())
}

fn lock(slot: &Mutex<Account>) -> Result<MutexGuard<'_, Account>> {
    slot.lock().map_err(poisoned)
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.read().map(|i| i.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: AccountId) -> Result<Option<Arc<Mutex<Account>>>> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(index.by_id.get(&id).cloned())
    }

    fn snapshot(&self, id: Option<AccountId>) -> Result<Option<Account>> {
        let Some(id) = id else { return Ok(None) };
        match self.slot(id)? {
            Some(slot) => Ok(Some(lock(&slot)?.clone())),
            None => Ok(None),
        }
    }

    fn all_slots(&self) -> Result<Vec<Arc<Mutex<Account>>>> {
        let index = self.index.read().map_err(poisoned)?;
        Ok(index.by_id.values().cloned().collect())
    }
}

impl AccountStore for MemoryAccountStore {
    fn get(&self, id: AccountId) -> Result<Option<Account>> {
        self.snapshot(Some(id))
    }

    fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let id = self.index.read().map_err(poisoned)?.by_email.get(email).copied();
        self.snapshot(id)
    }

    fn get_by_api_key(&self, api_key: &str) -> Result<Option<Account>> {
        let id = self
            .index
            .read()
            .map_err(poisoned)?
            .by_api_key
            .get(api_key)
            .copied();
        self.snapshot(id)
    }

    fn exists_by_email(&self, email: &str) -> Result<bool> {
        Ok(self.index.read().map_err(poisoned)?.by_email.contains_key(email))
    }

    #[instrument(skip(self, new), fields(email = %new.email))]
    fn insert(&self, new: NewAccount) -> Result<Account> {
        let mut index = self.index.write().map_err(poisoned)?;
        if index.by_email.contains_key(&new.email) {
            return Err(DocpressError::DuplicateEmail(new.email));
        }
        if index.by_api_key.contains_key(&new.api_key) {
            return Err(DocpressError::Database("api key collision".into()));
        }

        index.next_id += 1;
        let id = AccountId(index.next_id);
        let account = Account::from_new(id, new);
        index.by_email.insert(account.email.clone(), id);
        index.by_api_key.insert(account.api_key.clone(), id);
        index.by_id.insert(id, Arc::new(Mutex::new(account.clone())));

        info!(account_id = %id, "account created");
        Ok(account)
    }

    fn save(&self, account: &Account) -> Result<()> {
        let slot = self
            .slot(account.id)?
            .ok_or_else(|| DocpressError::NotFound(format!("account {}", account.id)))?;
        let mut stored = lock(&slot)?;
        *stored = Account {
            updated_at: Utc::now(),
            ..account.clone()
        };
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Account>> {
        self.all_slots()?
            .iter()
            .map(|slot| Ok(lock(slot)?.clone()))
            .collect()
    }

    fn save_all(&self, accounts: &[Account]) -> Result<()> {
        // Keyed by id: duplicates collapse to the last record and slots are
        // locked in id order, the same order `update_all` uses.
        let mut batch = BTreeMap::new();
        for account in accounts {
            let slot = self
                .slot(account.id)?
                .ok_or_else(|| DocpressError::NotFound(format!("account {}", account.id)))?;
            batch.insert(account.id, (slot, account));
        }

        // Every lock is taken before the first write.
        let mut guards = batch
            .values()
            .map(|(slot, account)| -> Result<_> { Ok((lock(slot)?, *account)) })
            .collect::<Result<Vec<_>>>()?;

        let now = Utc::now();
        for (stored, account) in &mut guards {
            **stored = Account {
                updated_at: now,
                ..(*account).clone()
            };
        }
        debug!(count = guards.len(), "accounts saved");
        Ok(())
    }

    fn update(&self, id: AccountId, f: AccountMutation<'_>) -> Result<Account> {
        let slot = self
            .slot(id)?
            .ok_or_else(|| DocpressError::NotFound(format!("account {id}")))?;

        // Held across `f`, which serializes every update on this account.
        let mut stored = lock(&slot)?;
        let mut working = stored.clone();
        f(&mut working)?;
        working.updated_at = Utc::now();
        *stored = working.clone();
        Ok(working)
    }

    fn update_all(&self, f: &mut dyn FnMut(&mut Account)) -> Result<usize> {
        let slots = self.all_slots()?;
        // Every lock is taken before the first write.
        let mut guards = slots
            .iter()
            .map(|slot| lock(slot))
            .collect::<Result<Vec<_>>>()?;

        let now = Utc::now();
        for stored in &mut guards {
            f(&mut **stored);
            stored.updated_at = now;
        }
        Ok(guards.len())
    }
}
