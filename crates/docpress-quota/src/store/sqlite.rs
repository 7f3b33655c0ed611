// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent account store backed by SQLite.
//
// Counters live in plain INTEGER columns; the per-feature map is stored as a
// JSON object (`{"PDF_MERGE":3,...}`) so adding a feature needs no migration.
// Every read-modify-write runs inside `BEGIN IMMEDIATE`, which takes the
// database write lock before the read and so serializes updates even across
// processes sharing the file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, instrument};

use docpress_core::error::{DocpressError, Result};
use docpress_core::types::{Account, AccountId, FeatureCounters, NewAccount, Role};

use super::{AccountMutation, AccountStore};

/// SQLite schema for the accounts table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        api_key TEXT NOT NULL UNIQUE,
        is_active INTEGER NOT NULL DEFAULT 1,
        daily_usage INTEGER NOT NULL DEFAULT 0,
        monthly_usage INTEGER NOT NULL DEFAULT 0,
        feature_usage TEXT NOT NULL DEFAULT '{}',
        last_reset_date TEXT NOT NULL,
        subscription_end_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const SELECT_COLUMNS: &str = "SELECT id, email, password_hash, name, role, api_key, is_active,
        daily_usage, monthly_usage, feature_usage, last_reset_date,
        subscription_end_date, created_at, updated_at
 FROM accounts";

/// Account store over a single SQLite connection.
///
/// `rusqlite` is synchronous; from async code call it through
/// `tokio::task::spawn_blocking`.
pub struct SqliteAccountStore {
    conn: Mutex<Connection>,
}

impl SqliteAccountStore {
    /// Open (or create) the account database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| DocpressError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| DocpressError::Database(format!("WAL pragma: {e}")))?;
        // Concurrent writers from other processes wait instead of failing.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| DocpressError::Database(format!("busy timeout: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| DocpressError::Database(format!("create table: {e}")))?;

        info!("account database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DocpressError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| DocpressError::Database(format!("create table: {e}")))?;

        debug!("in-memory account database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DocpressError::Database("connection lock poisoned".into()))
    }
}

impl AccountStore for SqliteAccountStore {
    #[instrument(skip(self), fields(account_id = %id))]
    fn get(&self, id: AccountId) -> Result<Option<Account>> {
        select_one(&*self.conn()?, "id = ?1", &id.0)
    }

    fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        select_one(&*self.conn()?, "email = ?1", &email)
    }

    fn get_by_api_key(&self, api_key: &str) -> Result<Option<Account>> {
        select_one(&*self.conn()?, "api_key = ?1", &api_key)
    }

    fn exists_by_email(&self, email: &str) -> Result<bool> {
        email_taken(&*self.conn()?, email)
    }

    #[instrument(skip(self, new), fields(email = %new.email))]
    fn insert(&self, new: NewAccount) -> Result<Account> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| DocpressError::Database(format!("begin insert: {e}")))?;

        if email_taken(&tx, &new.email)? {
            return Err(DocpressError::DuplicateEmail(new.email));
        }

        let mut account = Account::from_new(AccountId(0), new);
        tx.execute(
            "INSERT INTO accounts (email, password_hash, name, role, api_key, is_active,
             daily_usage, monthly_usage, feature_usage, last_reset_date,
             subscription_end_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                account.email,
                account.password_hash,
                account.name,
                account.role.as_str(),
                account.api_key,
                account.is_active,
                account.daily_usage,
                account.monthly_usage,
                serde_json::to_string(&account.feature_usage)?,
                account.last_reset_date.to_rfc3339(),
                account.subscription_end_date.map(|d| d.to_rfc3339()),
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| DocpressError::Database(format!("insert account: {e}")))?;
        account.id = AccountId(tx.last_insert_rowid());

        tx.commit()
            .map_err(|e| DocpressError::Database(format!("commit insert: {e}")))?;

        info!(account_id = %account.id, "account created");
        Ok(account)
    }

    fn save(&self, account: &Account) -> Result<()> {
        write_account(&*self.conn()?, account, Utc::now())
    }

    #[instrument(skip(self))]
    fn list_all(&self) -> Result<Vec<Account>> {
        let accounts = select_all(&*self.conn()?)?;
        debug!(count = accounts.len(), "retrieved all accounts");
        Ok(accounts)
    }

    #[instrument(skip_all, fields(count = accounts.len()))]
    fn save_all(&self, accounts: &[Account]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| DocpressError::Database(format!("begin save_all: {e}")))?;

        let now = Utc::now();
        for account in accounts {
            // Dropping `tx` on error rolls the whole batch back.
            write_account(&tx, account, now)?;
        }

        tx.commit()
            .map_err(|e| DocpressError::Database(format!("commit save_all: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self, f), fields(account_id = %id))]
    fn update(&self, id: AccountId, f: AccountMutation<'_>) -> Result<Account> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| DocpressError::Database(format!("begin update: {e}")))?;

        let mut account = select_one(&tx, "id = ?1", &id.0)?
            .ok_or_else(|| DocpressError::NotFound(format!("account {id}")))?;

        f(&mut account)?;
        account.updated_at = Utc::now();
        write_account(&tx, &account, account.updated_at)?;

        tx.commit()
            .map_err(|e| DocpressError::Database(format!("commit update: {e}")))?;
        Ok(account)
    }

    #[instrument(skip_all)]
    fn update_all(&self, f: &mut dyn FnMut(&mut Account)) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| DocpressError::Database(format!("begin update_all: {e}")))?;

        let mut accounts = select_all(&tx)?;
        let now = Utc::now();
        for account in &mut accounts {
            f(account);
            write_account(&tx, account, now)?;
        }

        tx.commit()
            .map_err(|e| DocpressError::Database(format!("commit update_all: {e}")))?;
        debug!(count = accounts.len(), "all accounts updated");
        Ok(accounts.len())
    }
}

fn email_taken(conn: &Connection, email: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1)",
        params![email],
        |row| row.get(0),
    )
    .map_err(|e| DocpressError::Database(format!("exists_by_email: {e}")))
}

fn select_one(
    conn: &Connection,
    predicate: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<Account>> {
    let sql = format!("{SELECT_COLUMNS} WHERE {predicate}");
    conn.query_row(&sql, [value], row_to_account)
        .optional()
        .map_err(|e| DocpressError::Database(format!("select account: {e}")))
}

fn select_all(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_COLUMNS} ORDER BY id ASC"))
        .map_err(|e| DocpressError::Database(format!("prepare list_all: {e}")))?;

    let accounts = stmt
        .query_map([], row_to_account)
        .map_err(|e| DocpressError::Database(format!("query list_all: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DocpressError::Database(format!("collect rows: {e}")))?;
    Ok(accounts)
}

/// Overwrite every mutable column of an existing row.
fn write_account(conn: &Connection, account: &Account, updated_at: DateTime<Utc>) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE accounts SET email = ?1, password_hash = ?2, name = ?3, role = ?4,
             api_key = ?5, is_active = ?6, daily_usage = ?7, monthly_usage = ?8,
             feature_usage = ?9, last_reset_date = ?10, subscription_end_date = ?11,
             updated_at = ?12
             WHERE id = ?13",
            params![
                account.email,
                account.password_hash,
                account.name,
                account.role.as_str(),
                account.api_key,
                account.is_active,
                account.daily_usage,
                account.monthly_usage,
                serde_json::to_string(&account.feature_usage)?,
                account.last_reset_date.to_rfc3339(),
                account.subscription_end_date.map(|d| d.to_rfc3339()),
                updated_at.to_rfc3339(),
                account.id.0,
            ],
        )
        .map_err(|e| DocpressError::Database(format!("update account: {e}")))?;

    if rows == 0 {
        return Err(DocpressError::NotFound(format!("account {}", account.id)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

/// Map a SQLite row to an `Account`.
///
/// Column indices must match `SELECT_COLUMNS`.
fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let role_str: String = row.get(4)?;
    let role = Role::parse(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown role {role_str:?}").into(),
        )
    })?;

    let feature_json: String = row.get(9)?;
    let feature_usage: FeatureCounters =
        serde_json::from_str(&feature_json).map_err(|e| conversion_error(9, e))?;

    let last_reset_date = parse_timestamp(10, &row.get::<_, String>(10)?)?;
    let subscription_end_date = row
        .get::<_, Option<String>>(11)?
        .map(|raw| parse_timestamp(11, &raw))
        .transpose()?;
    let created_at = parse_timestamp(12, &row.get::<_, String>(12)?)?;
    let updated_at = parse_timestamp(13, &row.get::<_, String>(13)?)?;

    Ok(Account {
        id: AccountId(row.get(0)?),
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        role,
        api_key: row.get(5)?,
        is_active: row.get(6)?,
        daily_usage: row.get(7)?,
        monthly_usage: row.get(8)?,
        feature_usage,
        last_reset_date,
        subscription_end_date,
        created_at,
        updated_at,
    })
}
