// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer — wires the account store, usage governor, document engine
// and audit trail into the calls a request handler makes.

pub mod app_services;
pub mod data_dir;
