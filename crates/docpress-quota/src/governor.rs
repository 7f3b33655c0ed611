// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Usage governor — admission checks and counter debits for metered calls.
//
// Every check that can deny a request runs inside the store's atomic
// `update`, before any counter moves, so a denial never leaves a partial
// debit behind and two callers can never both spend an account's last use.

use std::sync::Arc;

use docpress_core::error::{DocpressError, QuotaViolation, Result};
use docpress_core::types::{Account, AccountId, FeatureType, UsageInfo};
use tracing::{debug, info, instrument, warn};

use crate::store::AccountStore;

/// Decides whether an account may use a feature and records the use.
#[derive(Clone)]
pub struct UsageGovernor {
    store: Arc<dyn AccountStore>,
}

impl UsageGovernor {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    fn load(&self, id: AccountId) -> Result<Account> {
        self.store
            .get(id)?
            .ok_or_else(|| DocpressError::NotFound(format!("account {id}")))
    }

    /// Reject uploads larger than the account's tier allows. Read-only.
    #[instrument(skip(self, id), fields(account_id = %id))]
    pub fn check_file_size(&self, id: AccountId, size_bytes: u64) -> Result<()> {
        let account = self.load(id)?;
        let limit_bytes = account.file_size_limit_bytes();
        if size_bytes > limit_bytes {
            warn!(role = %account.role, limit_bytes, "upload exceeds file size limit");
            return Err(QuotaViolation::FileSize {
                role: account.role,
                limit_bytes,
                actual_bytes: size_bytes,
            }
            .into());
        }
        Ok(())
    }

    /// Admit one use of `feature` and debit the daily, monthly and feature
    /// counters together. All or nothing.
    #[instrument(skip(self, id, feature), fields(account_id = %id, feature = %feature))]
    pub fn authorize_and_record(&self, id: AccountId, feature: FeatureType) -> Result<()> {
        let account = self
            .store
            .update(id, &mut |account| {
                admit(account, Some(feature))?;
                account.record_feature_usage(feature);
                Ok(())
            })
            .inspect_err(log_denial)?;

        info!(
            daily_usage = account.daily_usage,
            feature_usage = account.feature_usage.get(feature),
            "usage recorded"
        );
        Ok(())
    }

    /// Aggregate-only admission for callers that do not name a feature.
    /// Per-feature counters are left alone.
    #[instrument(skip(self, id), fields(account_id = %id))]
    pub fn authorize_and_record_legacy(&self, id: AccountId) -> Result<()> {
        let account = self
            .store
            .update(id, &mut |account| {
                admit(account, None)?;
                account.record_usage();
                Ok(())
            })
            .inspect_err(log_denial)?;

        info!(daily_usage = account.daily_usage, "usage recorded");
        Ok(())
    }

    /// Current counters, remaining allowance and tier.
    pub fn usage_snapshot(&self, id: AccountId) -> Result<UsageInfo> {
        let info = self.load(id)?.usage_info();
        debug!(account_id = %id, daily_usage = info.daily_usage, "usage snapshot");
        Ok(info)
    }

    /// Zero every account's daily and per-feature counters in one batch.
    /// Monthly counters are untouched; running it twice is harmless.
    #[instrument(skip(self))]
    pub fn reset_all_daily_usage(&self) -> Result<usize> {
        let count = self.store.update_all(&mut Account::reset_daily)?;
        info!(count, "daily usage reset");
        Ok(count)
    }
}

/// The checks shared by both recording paths, in the order callers see
/// them: activity, aggregate cap, then the feature cap.
fn admit(account: &Account, feature: Option<FeatureType>) -> std::result::Result<(), QuotaViolation> {
    if !account.is_active {
        return Err(QuotaViolation::AccountInactive);
    }
    let role = account.role;
    // Only capped tiers can fail the remaining checks.
    let Some(limit) = role.daily_limit() else {
        return Ok(());
    };
    if !account.is_service_usable() {
        return Err(QuotaViolation::DailyLimit { role, limit });
    }
    if let Some(feature) = feature {
        if !account.is_feature_usable(feature) {
            return Err(QuotaViolation::FeatureLimit {
                feature,
                role,
                limit,
            });
        }
    }
    Ok(())
}

fn log_denial(err: &DocpressError) {
    match err {
        DocpressError::QuotaExceeded(violation) => warn!(%violation, "usage denied"),
        DocpressError::NotFound(_) => debug!("usage check for unknown account"),
        other => warn!(error = %other, "usage check failed"),
    }
}

#[cfg(test)]
mod tests {
    use docpress_core::types::{NewAccount, Role};

    use super::*;
    use crate::store::MemoryAccountStore;

    fn setup(role: Role) -> (UsageGovernor, AccountId) {
        let store = Arc::new(MemoryAccountStore::new());
        let account = store
            .insert(NewAccount {
                email: "gov@example.com".into(),
                password_hash: "hash".into(),
                name: "Gov".into(),
                role,
                api_key: "gov-key".into(),
            })
            .unwrap();
        (UsageGovernor::new(store), account.id)
    }

    fn set_counters(gov: &UsageGovernor, id: AccountId, daily: u32, feature: Option<(FeatureType, u32)>) {
        gov.store()
            .update(id, &mut |a| {
                a.daily_usage = daily;
                if let Some((f, n)) = feature {
                    a.feature_usage.set(f, n);
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn file_size_limit_is_inclusive() {
        let (gov, id) = setup(Role::Free);
        gov.check_file_size(id, 5 * docpress_core::MIB).unwrap();
        let err = gov.check_file_size(id, 5 * docpress_core::MIB + 1).unwrap_err();
        assert_eq!(
            err.quota_violation(),
            Some(&QuotaViolation::FileSize {
                role: Role::Free,
                limit_bytes: 5 * docpress_core::MIB,
                actual_bytes: 5 * docpress_core::MIB + 1,
            })
        );
    }

    #[test]
    fn unknown_account_is_not_found_everywhere() {
        let (gov, _) = setup(Role::Free);
        let ghost = AccountId(999);
        assert!(matches!(gov.check_file_size(ghost, 1), Err(DocpressError::NotFound(_))));
        assert!(matches!(
            gov.authorize_and_record(ghost, FeatureType::PdfMerge),
            Err(DocpressError::NotFound(_))
        ));
        assert!(matches!(gov.authorize_and_record_legacy(ghost), Err(DocpressError::NotFound(_))));
        assert!(matches!(gov.usage_snapshot(ghost), Err(DocpressError::NotFound(_))));
    }

    #[test]
    fn free_account_at_nine_gets_one_more() {
        let (gov, id) = setup(Role::Free);
        set_counters(&gov, id, 9, None);

        gov.authorize_and_record(id, FeatureType::PdfMerge).unwrap();
        let info = gov.usage_snapshot(id).unwrap();
        assert_eq!(info.daily_usage, 10);
        assert_eq!(info.remaining_usage, 0);

        let err = gov.authorize_and_record(id, FeatureType::PdfMerge).unwrap_err();
        assert_eq!(
            err.quota_violation(),
            Some(&QuotaViolation::DailyLimit { role: Role::Free, limit: 10 })
        );
        let info = gov.usage_snapshot(id).unwrap();
        assert_eq!(info.daily_usage, 10);
        assert_eq!(info.monthly_usage, 1);
        assert_eq!(info.feature_usage.get(FeatureType::PdfMerge), 1);
    }

    #[test]
    fn feature_cap_binds_independently_of_aggregate() {
        let (gov, id) = setup(Role::Free);
        set_counters(&gov, id, 5, Some((FeatureType::PdfSplit, 10)));

        let err = gov.authorize_and_record(id, FeatureType::PdfSplit).unwrap_err();
        assert_eq!(
            err.quota_violation(),
            Some(&QuotaViolation::FeatureLimit {
                feature: FeatureType::PdfSplit,
                role: Role::Free,
                limit: 10,
            })
        );
        // Nothing moved on denial.
        assert_eq!(gov.usage_snapshot(id).unwrap().daily_usage, 5);

        // Other features are still open.
        gov.authorize_and_record(id, FeatureType::ImageResize).unwrap();
        assert_eq!(gov.usage_snapshot(id).unwrap().daily_usage, 6);
    }

    #[test]
    fn inactive_accounts_are_refused() {
        let (gov, id) = setup(Role::Enterprise);
        gov.store()
            .update(id, &mut |a| {
                a.is_active = false;
                Ok(())
            })
            .unwrap();

        for result in [
            gov.authorize_and_record(id, FeatureType::ImageCompress),
            gov.authorize_and_record_legacy(id),
        ] {
            assert_eq!(
                result.unwrap_err().quota_violation(),
                Some(&QuotaViolation::AccountInactive)
            );
        }
    }

    #[test]
    fn enterprise_is_never_capped() {
        let (gov, id) = setup(Role::Enterprise);
        for _ in 0..10_000 {
            gov.authorize_and_record(id, FeatureType::PdfMerge).unwrap();
        }
        let info = gov.usage_snapshot(id).unwrap();
        assert_eq!(info.daily_usage, 10_000);
        assert_eq!(info.remaining_usage, docpress_core::UNLIMITED_REMAINING);
        gov.authorize_and_record_legacy(id).unwrap();
    }

    #[test]
    fn legacy_path_leaves_feature_counters_alone() {
        let (gov, id) = setup(Role::Pro);
        gov.authorize_and_record_legacy(id).unwrap();
        let info = gov.usage_snapshot(id).unwrap();
        assert_eq!(info.daily_usage, 1);
        assert_eq!(info.monthly_usage, 1);
        assert!(info.feature_usage.iter().all(|(_, n)| n == 0));
    }

    #[test]
    fn legacy_path_reports_actual_tier() {
        let (gov, id) = setup(Role::Pro);
        set_counters(&gov, id, 100, None);
        let err = gov.authorize_and_record_legacy(id).unwrap_err();
        assert_eq!(
            err.quota_violation(),
            Some(&QuotaViolation::DailyLimit { role: Role::Pro, limit: 100 })
        );
    }

    #[test]
    fn reset_zeroes_daily_and_keeps_monthly() {
        let (gov, id) = setup(Role::Free);
        for feature in FeatureType::ALL {
            gov.authorize_and_record(id, feature).unwrap();
        }

        assert_eq!(gov.reset_all_daily_usage().unwrap(), 1);
        let info = gov.usage_snapshot(id).unwrap();
        assert_eq!(info.daily_usage, 0);
        assert_eq!(info.monthly_usage, 4);
        assert!(info.feature_usage.iter().all(|(_, n)| n == 0));

        // Idempotent.
        assert_eq!(gov.reset_all_daily_usage().unwrap(), 1);
        assert_eq!(gov.usage_snapshot(id).unwrap().monthly_usage, 4);
    }
}
