// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Nightly reset scheduler — a single background task that sleeps until the
// next local midnight, runs the reset job, and repeats until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, TimeZone};
use docpress_core::error::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// The work done at each tick. Runs on the blocking pool since stores are
/// synchronous. Returns the number of accounts reset.
pub type ResetJob = Arc<dyn Fn() -> Result<usize> + Send + Sync>;

/// First instant of the next calendar day in `now`'s time zone.
///
/// When a DST jump skips midnight the first existing instant after it is
/// used instead.
pub fn next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let midnight = (now.date_naive() + chrono::Days::new(1)).and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + chrono::Duration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| now.clone() + chrono::Duration::days(1))
}

/// How long to sleep from `now` until [`next_midnight`].
pub fn delay_until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    (next_midnight(now) - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

fn local_midnight_delay() -> Duration {
    delay_until_next_midnight(&Local::now())
}

/// Background task that runs a [`ResetJob`] at every local midnight.
pub struct ResetScheduler {
    job: ResetJob,
    /// Computes the sleep before the next run; local midnight in production.
    next_delay: fn() -> Duration,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    completed_runs: Arc<AtomicU64>,
}

impl ResetScheduler {
    /// A scheduler that fires at local midnight.
    pub fn new(job: ResetJob) -> Self {
        Self::with_delay(job, local_midnight_delay)
    }

    /// A scheduler whose sleep between runs is computed by `next_delay`.
    pub fn with_delay(job: ResetJob, next_delay: fn() -> Duration) -> Self {
        Self {
            job,
            next_delay,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            completed_runs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Number of resets that finished successfully since creation.
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs.load(Ordering::Relaxed)
    }

    /// Spawn the background task. Must be called inside a Tokio runtime.
    /// Starting a running scheduler is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("reset scheduler already running");
            return;
        }

        let job = Arc::clone(&self.job);
        let shutdown = Arc::clone(&self.shutdown_signal);
        let runs = Arc::clone(&self.completed_runs);
        let next_delay = self.next_delay;

        let handle = tokio::spawn(async move {
            Self::run_loop(job, shutdown, runs, next_delay).await;
        });

        self.task_handle = Some(handle);
        info!("reset scheduler started");
    }

    /// Signal the task to exit and wait for it. A reset already in progress
    /// finishes first.
    pub async fn stop(&mut self) {
        let Some(handle) = self.task_handle.take() else {
            return;
        };

        self.shutdown_signal.notify_one();
        if let Err(e) = handle.await {
            error!(error = %e, "reset scheduler task ended abnormally");
        }
        info!("reset scheduler stopped");
    }

    async fn run_loop(
        job: ResetJob,
        shutdown: Arc<Notify>,
        runs: Arc<AtomicU64>,
        next_delay: fn() -> Duration,
    ) {
        loop {
            let delay = next_delay();
            debug!(delay_secs = delay.as_secs(), "next daily reset scheduled");

            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("reset loop received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    let job = Arc::clone(&job);
                    match tokio::task::spawn_blocking(move || job()).await {
                        Ok(Ok(count)) => {
                            runs.fetch_add(1, Ordering::Relaxed);
                            info!(count, "daily reset complete");
                        }
                        Ok(Err(e)) => error!(error = %e, "daily reset failed"),
                        Err(e) => error!(error = %e, "daily reset task panicked"),
                    }
                }
            }
        }
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}
