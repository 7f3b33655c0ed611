// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the request layer.
//
// Every error maps to a plain sentence plus a suggestion. Quota denials
// spell out the cap that was hit and its numeric limit.

use crate::error::{DocpressError, QuotaViolation};
use crate::types::{MIB, Role};

/// Severity of an error from the caller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Store blip or timeout. Safe to retry.
    Transient,
    /// The caller must change something (smaller file, wait for reset, log in).
    ActionRequired,
    /// Retrying cannot help, e.g. a bad or unsupported document.
    Permanent,
    /// Only a tier upgrade lifts this limit.
    UpgradeRequired,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `DocpressError` into a message a user can act on.
pub fn humanize_error(err: &DocpressError) -> HumanError {
    match err {
        DocpressError::NotFound(what) => HumanError {
            message: format!("We couldn't find that {what}."),
            suggestion: "Check the address or account details and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DocpressError::DuplicateEmail(email) => HumanError {
            message: format!("{email} is already registered."),
            suggestion: "Log in instead, or register with a different email address.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DocpressError::BadCredential => HumanError {
            message: "The password is incorrect.".into(),
            suggestion: "Check your password and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DocpressError::QuotaExceeded(violation) => humanize_quota(violation),

        DocpressError::Credential(_) => HumanError {
            message: "We couldn't process your password.".into(),
            suggestion: "Try again in a moment.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        DocpressError::UnsupportedDocument(detail) => HumanError {
            message: "This type of file isn't supported.".into(),
            suggestion: format!("Upload a PDF, JPEG, PNG, GIF or BMP file. (File type: {detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        DocpressError::PdfError(_) => HumanError {
            message: "There's a problem with this PDF file.".into(),
            suggestion: "The file may be damaged or password-protected. Try a different file.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        DocpressError::ImageError(_) => HumanError {
            message: "There's a problem with this image.".into(),
            suggestion: "The image may be damaged or in an unusual format. Try saving it as a JPEG or PNG first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        DocpressError::InvalidRequest(detail) => HumanError {
            message: "The request couldn't be processed.".into(),
            suggestion: format!("Check the options you chose. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        DocpressError::Database(_) => HumanError {
            message: "Our account storage had a problem.".into(),
            suggestion: "Please try again shortly. Your usage was not counted.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        DocpressError::Io(_) | DocpressError::Serialization(_) => HumanError {
            message: "Something went wrong on our side.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

fn humanize_quota(violation: &QuotaViolation) -> HumanError {
    match violation {
        QuotaViolation::AccountInactive => HumanError {
            message: "This account is deactivated.".into(),
            suggestion: "Contact support to reactivate it.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        QuotaViolation::DailyLimit { role, limit } => HumanError {
            message: format!("Daily usage limit reached ({role}: {limit} per day)."),
            suggestion: reset_or_upgrade(*role),
            retriable: false,
            severity: Severity::UpgradeRequired,
        },

        QuotaViolation::FeatureLimit {
            feature,
            role,
            limit,
        } => HumanError {
            message: format!(
                "Daily {} limit reached ({limit} per day).",
                feature.label()
            ),
            suggestion: reset_or_upgrade(*role),
            retriable: false,
            severity: Severity::UpgradeRequired,
        },

        QuotaViolation::FileSize {
            role, limit_bytes, ..
        } => HumanError {
            message: format!("File is too large (maximum {} MB).", limit_bytes / MIB),
            suggestion: match role {
                Role::Enterprise => "Split the document into smaller parts.".into(),
                _ => "Upload a smaller file, or upgrade your plan for larger uploads.".into(),
            },
            retriable: false,
            severity: Severity::UpgradeRequired,
        },
    }
}

fn reset_or_upgrade(role: Role) -> String {
    match role {
        Role::Free => "Counters reset at midnight. Upgrade to PRO for 100 uses per day.".into(),
        _ => "Counters reset at midnight.".into(),
    }
}
