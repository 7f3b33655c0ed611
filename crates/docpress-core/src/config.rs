// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use serde::{Deserialize, Serialize};

/// Persistent service settings, stored as `config.json` in the data dir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SQLite file holding account records, relative to the data dir.
    pub database_file: String,
    /// SQLite file holding the usage audit trail, relative to the data dir.
    pub audit_file: String,
    /// Run the midnight reset of daily counters.
    pub daily_reset_enabled: bool,
    /// PBKDF2 rounds for new password hashes.
    pub password_hash_iterations: u32,
    /// JPEG quality (1-100) used when a compress request names none.
    pub jpeg_quality_default: u8,
    /// Record admitted and denied requests in the audit trail.
    pub audit_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_file: "accounts.db".into(),
            audit_file: "audit.db".into(),
            daily_reset_enabled: true,
            password_hash_iterations: 100_000,
            jpeg_quality_default: 75,
            audit_enabled: true,
        }
    }
}
