// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Docpress.

use thiserror::Error;

use crate::types::{FeatureType, MIB, Role};

/// Which cap denied a metered request, with the numbers the caller needs to
/// explain it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaViolation {
    #[error("account is inactive")]
    AccountInactive,

    #[error("daily usage limit reached ({role}: {limit} per day)")]
    DailyLimit { role: Role, limit: u32 },

    #[error("daily {} limit reached ({role}: {limit} per day)", .feature.label())]
    FeatureLimit {
        feature: FeatureType,
        role: Role,
        limit: u32,
    },

    #[error("file size {actual_bytes} bytes exceeds the {role} limit of {} MiB", .limit_bytes / MIB)]
    FileSize {
        role: Role,
        limit_bytes: u64,
        actual_bytes: u64,
    },
}

/// Top-level error type for all Docpress operations.
#[derive(Debug, Error)]
pub enum DocpressError {
    // -- Accounts / quota --
    #[error("{0} not found")]
    NotFound(String),

    #[error("an account with email {0} already exists")]
    DuplicateEmail(String),

    #[error("password does not match")]
    BadCredential,

    #[error("quota exceeded: {0}")]
    QuotaExceeded(#[from] QuotaViolation),

    #[error("credential hashing failed: {0}")]
    Credential(String),

    // -- Document errors --
    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocpressError {
    /// Whether retrying the same call later may succeed. Store outages are
    /// transient; quota denials and bad input are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(_) => true,
            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// The quota cap behind this error, if it is a quota denial.
    pub fn quota_violation(&self) -> Option<&QuotaViolation> {
        match self {
            Self::QuotaExceeded(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocpressError>;
