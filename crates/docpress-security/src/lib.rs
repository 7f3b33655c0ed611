// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docpress-security — credential hashing, API key issuance, document
// fingerprints and the usage audit trail.

pub mod api_key;
pub mod audit;
pub mod credentials;
pub mod fingerprint;

pub use api_key::{ApiKeyGenerator, UuidKeyGenerator};
pub use audit::{AuditAction, AuditEntry, AuditRecord, UsageAuditLog};
pub use credentials::{CredentialHasher, Pbkdf2Hasher};
pub use fingerprint::{fingerprint, fingerprint_batch};
