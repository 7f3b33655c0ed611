// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Docpress — tiered document utility service
//
// Entry point. Initialises logging and backend services, runs the nightly
// usage reset until Ctrl-C.

mod services;

use docpress_quota::ResetScheduler;
use services::app_services::AppServices;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Docpress starting");

    let svc = match AppServices::init() {
        Ok(s) => {
            tracing::info!("backend services initialised");
            s
        }
        Err(e) => {
            tracing::error!(error = %e, "persistent storage failed, using in-memory fallback");
            match AppServices::fallback() {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "fallback init failed");
                    std::process::exit(1);
                }
            }
        }
    };

    match svc.account_count() {
        Ok(count) => tracing::info!(accounts = count, data_dir = %svc.data_dir().display(), "ready"),
        Err(e) => tracing::warn!(error = %e, "could not count accounts"),
    }

    let mut scheduler = svc
        .config()
        .daily_reset_enabled
        .then(|| ResetScheduler::new(svc.reset_job()));
    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.start();
    } else {
        tracing::info!("daily reset disabled in config");
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    }

    tracing::info!("shutting down");
    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.stop().await;
    }
}
