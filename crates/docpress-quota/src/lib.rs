// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docpress-quota — Usage accounting for Docpress.
//
// Account persistence (SQLite and in-memory), registration and login, the
// usage governor that admits and debits metered calls, and the scheduler
// that zeroes daily counters at local midnight.

pub mod accounts;
pub mod governor;
pub mod scheduler;
pub mod store;

pub use accounts::AccountService;
pub use governor::UsageGovernor;
pub use scheduler::{ResetJob, ResetScheduler};
pub use store::{AccountStore, MemoryAccountStore, SqliteAccountStore};
