// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — initialises the stores and exposes the calls a
// request handler makes: registration, login, metered document processing,
// usage queries and the nightly reset.
//
// The audit log wraps a rusqlite connection, which is `Send` but not `Sync`,
// so it lives behind `Arc<Mutex<>>`. Account stores do their own locking.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use docpress_core::error::{DocpressError, Result};
use docpress_core::types::{Account, AccountId, UsageInfo};
use docpress_core::ServiceConfig;
use docpress_document::{DocumentEngine, PdfInfo, PdfReader, Transform, TransformEngine};
use docpress_quota::{
    AccountService, AccountStore, MemoryAccountStore, ResetJob, SqliteAccountStore, UsageGovernor,
};
use docpress_security::{
    AuditAction, AuditEntry, AuditRecord, Pbkdf2Hasher, UsageAuditLog, UuidKeyGenerator,
    fingerprint_batch,
};
use tracing::{error, info, instrument, warn};

use super::data_dir;

/// Shared service handle. Every field is Arc-backed, so clones are cheap and
/// can move into background tasks.
#[derive(Clone)]
pub struct AppServices {
    accounts: AccountService,
    governor: UsageGovernor,
    engine: Arc<dyn TransformEngine>,
    audit_log: Arc<Mutex<UsageAuditLog>>,
    data_dir: PathBuf,
    config: Arc<Mutex<ServiceConfig>>,
}

#[allow(dead_code)]
impl AppServices {
    /// Initialise against the on-disk data directory. Call once at startup.
    ///
    /// Loads `config.json` (writing the defaults out on first run), then
    /// opens the account and audit databases it names.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        info!(path = %dir.display(), "initialising app services");

        let config = match load_config(&dir) {
            Some(config) => config,
            None => {
                let config = ServiceConfig::default();
                if let Err(e) = persist_config(&dir, &config) {
                    warn!(error = %e, "could not write default config");
                }
                config
            }
        };

        let store = SqliteAccountStore::open(dir.join(&config.database_file))?;
        let audit_log = UsageAuditLog::open(dir.join(&config.audit_file))?;

        info!("app services initialised");
        Ok(Self::assemble(config, Arc::new(store), audit_log, dir))
    }

    /// In-memory services for when persistent storage cannot be opened.
    /// Nothing survives a restart.
    pub fn fallback() -> Result<Self> {
        let audit_log = UsageAuditLog::open_in_memory()?;
        let dir = std::env::temp_dir().join("docpress");
        warn!("running with in-memory account store");
        Ok(Self::assemble(
            ServiceConfig::default(),
            Arc::new(MemoryAccountStore::new()),
            audit_log,
            dir,
        ))
    }

    fn assemble(
        config: ServiceConfig,
        store: Arc<dyn AccountStore>,
        audit_log: UsageAuditLog,
        data_dir: PathBuf,
    ) -> Self {
        let accounts = AccountService::new(
            Arc::clone(&store),
            Arc::new(Pbkdf2Hasher::new(config.password_hash_iterations)),
            Arc::new(UuidKeyGenerator),
        );
        Self {
            accounts,
            governor: UsageGovernor::new(store),
            engine: Arc::new(DocumentEngine::new(config.jpeg_quality_default)),
            audit_log: Arc::new(Mutex::new(audit_log)),
            data_dir,
            config: Arc::new(Mutex::new(config)),
        }
    }

    // -- Accounts ------------------------------------------------------------

    pub fn register(&self, email: &str, password: &str, name: &str) -> Result<Account> {
        let result = self.accounts.register(email, password, name);
        match &result {
            Ok(account) => self.audit(
                AuditAction::Registered,
                true,
                AuditRecord {
                    account_id: Some(account.id),
                    ..Default::default()
                },
            ),
            Err(e) => self.audit(
                AuditAction::Registered,
                false,
                AuditRecord {
                    details: Some(&e.to_string()),
                    ..Default::default()
                },
            ),
        }
        result
    }

    pub fn login(&self, email: &str, password: &str) -> Result<Account> {
        self.accounts.login(email, password).inspect_err(|e| {
            self.audit(
                AuditAction::LoginFailed,
                false,
                AuditRecord {
                    details: Some(&format!("{email}: {e}")),
                    ..Default::default()
                },
            );
        })
    }

    /// Resolve an API key to the account it was issued to.
    pub fn authenticate_api_key(&self, api_key: &str) -> Result<AccountId> {
        self.accounts
            .find_by_api_key(api_key)?
            .map(|account| account.id)
            .ok_or_else(|| DocpressError::NotFound("account for API key".into()))
    }

    pub fn usage(&self, id: AccountId) -> Result<UsageInfo> {
        self.governor.usage_snapshot(id)
    }

    pub fn account_count(&self) -> Result<usize> {
        Ok(self.governor.store().list_all()?.len())
    }

    // -- Metered processing --------------------------------------------------

    /// Run `transform` over `inputs` on behalf of `account_id`.
    ///
    /// Identified callers are held to their tier: the combined upload size is
    /// checked, then one use of the transform's feature is debited, and only
    /// then does the transform run. A transform that fails after admission
    /// still counts. Anonymous callers are not metered.
    #[instrument(skip(self, transform, inputs), fields(feature = %transform.feature()))]
    pub fn process(
        &self,
        account_id: Option<AccountId>,
        transform: &Transform,
        inputs: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        transform.validate(inputs.len())?;

        let feature = transform.feature();
        let document_hash = fingerprint_batch(inputs);
        let record = AuditRecord {
            account_id,
            feature: Some(feature),
            document_hash: Some(&document_hash),
            details: None,
        };

        if let Some(id) = account_id {
            let total_bytes: u64 = inputs.iter().map(|input| input.len() as u64).sum();
            let admitted = self
                .governor
                .check_file_size(id, total_bytes)
                .and_then(|()| self.governor.authorize_and_record(id, feature));
            if let Err(e) = admitted {
                self.audit(
                    AuditAction::UsageDenied,
                    false,
                    AuditRecord {
                        details: Some(&e.to_string()),
                        ..record
                    },
                );
                return Err(e);
            }
        }
        self.audit(AuditAction::UsageAdmitted, true, record.clone());

        self.engine.apply(transform, inputs).inspect_err(|e| {
            warn!(error = %e, "transform failed");
            self.audit(
                AuditAction::TransformFailed,
                false,
                AuditRecord {
                    details: Some(&e.to_string()),
                    ..record
                },
            );
        })
    }

    /// Page count and size of an uploaded PDF. Not metered.
    pub fn pdf_info(&self, file_name: &str, data: &[u8]) -> Result<PdfInfo> {
        Ok(PdfReader::from_bytes(data)?.info(file_name))
    }

    // -- Daily reset ---------------------------------------------------------

    /// Zero every account's daily counters and note it in the audit trail.
    pub fn run_daily_reset(&self) -> Result<usize> {
        match self.governor.reset_all_daily_usage() {
            Ok(count) => {
                self.audit(
                    AuditAction::DailyReset,
                    true,
                    AuditRecord {
                        details: Some(&format!("{count} accounts")),
                        ..Default::default()
                    },
                );
                Ok(count)
            }
            Err(e) => {
                self.audit(
                    AuditAction::DailyReset,
                    false,
                    AuditRecord {
                        details: Some(&e.to_string()),
                        ..Default::default()
                    },
                );
                Err(e)
            }
        }
    }

    /// The reset as a job for the midnight scheduler.
    pub fn reset_job(&self) -> ResetJob {
        let services = self.clone();
        Arc::new(move || services.run_daily_reset())
    }

    // -- Audit ---------------------------------------------------------------

    /// Record an audit event. Failures are logged, never surfaced.
    fn audit(&self, action: AuditAction, success: bool, record: AuditRecord<'_>) {
        if !self.config().audit_enabled {
            return;
        }
        if let Ok(log) = self.audit_log.lock()
            && let Err(e) = log.record(action, success, record)
        {
            error!(error = %e, "failed to record audit entry");
        }
    }

    pub fn recent_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        self.lock_audit()?.recent_entries(limit)
    }

    pub fn audit_entries_for_account(&self, id: AccountId) -> Result<Vec<AuditEntry>> {
        self.lock_audit()?.entries_for_account(id)
    }

    pub fn audit_count(&self) -> Result<u64> {
        self.lock_audit()?.count()
    }

    fn lock_audit(&self) -> Result<MutexGuard<'_, UsageAuditLog>> {
        self.audit_log
            .lock()
            .map_err(|_| DocpressError::Database("audit lock poisoned".into()))
    }

    // -- Config persistence --------------------------------------------------

    pub fn config(&self) -> ServiceConfig {
        match self.config.lock() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Update and persist the config. Store paths and hashing rounds take
    /// effect on the next start.
    pub fn save_config(&self, config: &ServiceConfig) -> Result<()> {
        match self.config.lock() {
            Ok(mut current) => *current = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        persist_config(&self.data_dir, config)
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
}

// -- Config file persistence -------------------------------------------------

const CONFIG_FILE: &str = "config.json";

fn load_config(data_dir: &Path) -> Option<ServiceConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "ignoring unreadable config");
            None
        }
    }
}

fn persist_config(data_dir: &Path, config: &ServiceConfig) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
