// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Usage audit trail — append-only SQLite log of every metered request,
// denial, registration and nightly reset.
//
// Schema:
//   usage_audit(
//     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp     TEXT    NOT NULL,   -- RFC 3339
//     action        TEXT    NOT NULL,   -- see AuditAction::as_str
//     account_id    INTEGER,            -- NULL for anonymous/system events
//     feature       TEXT,               -- e.g. "PDF_MERGE"
//     document_hash TEXT,               -- SHA-256 hex of the upload(s)
//     success       INTEGER NOT NULL,   -- 0 = failure, 1 = success
//     details       TEXT
//   )

use std::path::Path;

use chrono::Utc;
use docpress_core::error::DocpressError;
use docpress_core::types::{AccountId, FeatureType};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS usage_audit (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     TEXT    NOT NULL,
    action        TEXT    NOT NULL,
    account_id    INTEGER,
    feature       TEXT,
    document_hash TEXT,
    success       INTEGER NOT NULL,
    details       TEXT
);
CREATE INDEX IF NOT EXISTS idx_usage_audit_account ON usage_audit (account_id);";

const SELECT_COLUMNS: &str =
    "SELECT id, timestamp, action, account_id, feature, document_hash, success, details
     FROM usage_audit";

fn db_err(e: rusqlite::Error) -> DocpressError {
    DocpressError::Database(e.to_string())
}

/// Kind of event recorded in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Registered,
    LoginFailed,
    /// A metered request passed every check and was counted.
    UsageAdmitted,
    /// A metered request was refused by a quota check.
    UsageDenied,
    /// The document transform itself failed after admission.
    TransformFailed,
    DailyReset,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::LoginFailed => "login_failed",
            Self::UsageAdmitted => "usage_admitted",
            Self::UsageDenied => "usage_denied",
            Self::TransformFailed => "transform_failed",
            Self::DailyReset => "daily_reset",
        }
    }
}

/// A single row of the audit trail, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub account_id: Option<AccountId>,
    pub feature: Option<String>,
    pub document_hash: Option<String>,
    pub success: bool,
    pub details: Option<String>,
}

/// An event about to be written.
#[derive(Debug, Clone, Default)]
pub struct AuditRecord<'a> {
    pub account_id: Option<AccountId>,
    pub feature: Option<FeatureType>,
    pub document_hash: Option<&'a str>,
    pub details: Option<&'a str>,
}

/// Append-only usage audit log backed by SQLite.
pub struct UsageAuditLog {
    conn: Connection,
}

impl UsageAuditLog {
    /// Open (or create) the audit database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocpressError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("usage audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self, DocpressError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory usage audit log opened");
        Ok(Self { conn })
    }

    /// Append one event.
    #[instrument(skip(self, record), fields(action = action.as_str()))]
    pub fn record(
        &self,
        action: AuditAction,
        success: bool,
        record: AuditRecord<'_>,
    ) -> Result<(), DocpressError> {
        let timestamp = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO usage_audit
                    (timestamp, action, account_id, feature, document_hash, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    timestamp,
                    action.as_str(),
                    record.account_id.map(|id| id.0),
                    record.feature.map(|f| f.as_str()),
                    record.document_hash,
                    success as i32,
                    record.details,
                ],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries for one account, oldest first.
    pub fn entries_for_account(&self, account_id: AccountId) -> Result<Vec<AuditEntry>, DocpressError> {
        let sql = format!("{SELECT_COLUMNS} WHERE account_id = ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![account_id.0], row_to_entry)
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, DocpressError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map(params![limit], row_to_entry).map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Total number of entries.
    pub fn count(&self) -> Result<u64, DocpressError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM usage_audit", [], |row| row.get(0))
            .map_err(db_err)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        action: row.get(2)?,
        account_id: row.get::<_, Option<i64>>(3)?.map(AccountId),
        feature: row.get(4)?,
        document_hash: row.get(5)?,
        success: row.get::<_, i32>(6)? != 0,
        details: row.get(7)?,
    })
}
