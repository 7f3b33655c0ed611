// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Docpress accounts and usage accounting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One mebibyte, the unit tier file-size limits are expressed in.
pub const MIB: u64 = 1024 * 1024;

/// Value reported by [`Account::remaining_usage`] for tiers without a cap.
pub const UNLIMITED_REMAINING: u32 = 999_999;

/// Store-assigned identifier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription tier. Determines every numeric limit an account is held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// 10 uses per day, 5 MiB uploads.
    Free,
    /// 100 uses per day, 50 MiB uploads.
    Pro,
    /// Unlimited uses, 500 MiB uploads.
    Enterprise,
}

impl Role {
    /// Daily cap shared by the aggregate counter and every per-feature
    /// counter. `None` means unlimited.
    pub fn daily_limit(&self) -> Option<u32> {
        match self {
            Self::Free => Some(10),
            Self::Pro => Some(100),
            Self::Enterprise => None,
        }
    }

    /// Largest single upload (or summed multi-file upload) in bytes.
    pub fn file_size_limit_bytes(&self) -> u64 {
        match self {
            Self::Free => 5 * MIB,
            Self::Pro => 50 * MIB,
            Self::Enterprise => 500 * MIB,
        }
    }

    /// Upper-case tier name as stored and reported.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Pro => "PRO",
            Self::Enterprise => "ENTERPRISE",
        }
    }

    /// Parse a stored tier name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FREE" => Some(Self::Free),
            "PRO" => Some(Self::Pro),
            "ENTERPRISE" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metered document features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureType {
    PdfMerge,
    PdfSplit,
    ImageResize,
    ImageCompress,
}

impl FeatureType {
    /// Every metered feature, in display order.
    pub const ALL: [FeatureType; 4] = [
        Self::PdfMerge,
        Self::PdfSplit,
        Self::ImageResize,
        Self::ImageCompress,
    ];

    /// Wire/storage name, e.g. `PDF_MERGE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfMerge => "PDF_MERGE",
            Self::PdfSplit => "PDF_SPLIT",
            Self::ImageResize => "IMAGE_RESIZE",
            Self::ImageCompress => "IMAGE_COMPRESS",
        }
    }

    /// Label for user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PdfMerge => "PDF merge",
            Self::PdfSplit => "PDF split",
            Self::ImageResize => "image resize",
            Self::ImageCompress => "image compress",
        }
    }
}

impl std::fmt::Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-feature daily counters keyed by [`FeatureType`].
///
/// Missing keys read as zero, so adding a feature variant never requires a
/// data migration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureCounters(BTreeMap<FeatureType, u32>);

impl FeatureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for `feature`.
    pub fn get(&self, feature: FeatureType) -> u32 {
        self.0.get(&feature).copied().unwrap_or(0)
    }

    /// Overwrite the count for `feature`.
    pub fn set(&mut self, feature: FeatureType, value: u32) {
        self.0.insert(feature, value);
    }

    pub fn increment(&mut self, feature: FeatureType) {
        let slot = self.0.entry(feature).or_insert(0);
        *slot = slot.saturating_add(1);
    }

    /// Zero every known feature.
    pub fn reset(&mut self) {
        for feature in FeatureType::ALL {
            self.0.insert(feature, 0);
        }
    }

    /// `(feature, count)` pairs for every known feature, zeros included.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureType, u32)> + '_ {
        FeatureType::ALL.into_iter().map(move |f| (f, self.get(f)))
    }
}

/// Registration payload. The store assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub api_key: String,
}

/// A registered user and their usage counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub api_key: String,
    /// Inactive accounts are denied all usage regardless of counters.
    pub is_active: bool,
    pub daily_usage: u32,
    pub monthly_usage: u32,
    pub feature_usage: FeatureCounters,
    /// When `reset_daily` last ran. Informational only, never used for gating.
    pub last_reset_date: DateTime<Utc>,
    pub subscription_end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build a fresh account from a registration payload: active, all
    /// counters at zero.
    pub fn from_new(id: AccountId, new: NewAccount) -> Self {
        let now = Utc::now();
        let mut feature_usage = FeatureCounters::new();
        feature_usage.reset();
        Self {
            id,
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            role: new.role,
            api_key: new.api_key,
            is_active: true,
            daily_usage: 0,
            monthly_usage: 0,
            feature_usage,
            last_reset_date: now,
            subscription_end_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Aggregate admission check used by every metered call.
    pub fn is_service_usable(&self) -> bool {
        if !self.is_active {
            return false;
        }
        match self.role.daily_limit() {
            Some(limit) => self.daily_usage < limit,
            None => true,
        }
    }

    /// Per-feature admission check, independent of the aggregate counter.
    pub fn is_feature_usable(&self, feature: FeatureType) -> bool {
        if !self.is_active {
            return false;
        }
        match self.role.daily_limit() {
            Some(limit) => self.feature_usage.get(feature) < limit,
            None => true,
        }
    }

    pub fn file_size_limit_bytes(&self) -> u64 {
        self.role.file_size_limit_bytes()
    }

    /// Uses left today on the aggregate counter.
    pub fn remaining_usage(&self) -> u32 {
        match self.role.daily_limit() {
            Some(limit) => limit.saturating_sub(self.daily_usage),
            None => UNLIMITED_REMAINING,
        }
    }

    /// Aggregate-only increment for callers that do not name a feature.
    pub fn record_usage(&mut self) {
        self.daily_usage = self.daily_usage.saturating_add(1);
        self.monthly_usage = self.monthly_usage.saturating_add(1);
    }

    /// Increment the aggregate counters and `feature`'s counter together.
    pub fn record_feature_usage(&mut self, feature: FeatureType) {
        self.record_usage();
        self.feature_usage.increment(feature);
    }

    /// Nightly reset: daily and per-feature counters to zero. Monthly usage
    /// is left alone.
    pub fn reset_daily(&mut self) {
        self.daily_usage = 0;
        self.feature_usage.reset();
        self.last_reset_date = Utc::now();
    }

    /// Read-only projection handed to callers.
    pub fn usage_info(&self) -> UsageInfo {
        UsageInfo {
            daily_usage: self.daily_usage,
            remaining_usage: self.remaining_usage(),
            monthly_usage: self.monthly_usage,
            feature_usage: self.feature_usage.clone(),
            role: self.role,
        }
    }
}

/// Snapshot of an account's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub daily_usage: u32,
    pub remaining_usage: u32,
    pub monthly_usage: u32,
    pub feature_usage: FeatureCounters,
    pub role: Role,
}
