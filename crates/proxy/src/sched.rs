// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background control loops: snapshot sync, hourly account maintenance,
//! session cleanup. A failing tick logs and returns; the next tick still runs.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};

use crate::state::AppState;

/// Spawn the snapshot sync loop (`storage.sync_interval`).
pub fn spawn_sync_scheduler(state: Arc<AppState>) {
    let interval = state.config.sync_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; skip that so the first sync is one
        // interval after boot.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            sync_tick(&state).await;
        }
    });
}

async fn sync_tick(state: &AppState) {
    if let Err(e) = state.tokens.sync().await {
        tracing::warn!(collection = "tokens", err = %e, "snapshot sync failed");
    }
    if let Err(e) = state.accounts.sync().await {
        tracing::warn!(collection = "accounts", err = %e, "snapshot sync failed");
    }
    if let Err(e) = state.sessions.sync().await {
        tracing::warn!(collection = "sessions", err = %e, "snapshot sync failed");
    }
    tracing::debug!("snapshots synced");
}

/// Spawn the hourly maintenance loop: recover elapsed rate limits, then
/// refresh every account nearing expiry. Fires at minute 0 of every hour.
pub fn spawn_refresh_scheduler(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            let wait = duration_until_next_hour(Utc::now());
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let recovered = state.accounts.recover_rate_limited_accounts().await;
            let summary = state.accounts.refresh_all_accounts().await;
            tracing::info!(
                recovered,
                refreshed = summary.refreshed,
                failed = summary.failed,
                skipped = summary.skipped,
                "hourly account maintenance"
            );
        }
    });
}

/// Seconds left until the next top-of-hour boundary.
fn duration_until_next_hour(now: DateTime<Utc>) -> std::time::Duration {
    let into_hour = (now.minute() * 60 + now.second()) as u64;
    std::time::Duration::from_secs(3600 - into_hour.min(3599))
}

/// Spawn the expired-session sweep loop (`session.cleanup_interval`).
pub fn spawn_session_cleanup(state: Arc<AppState>) {
    let interval = state.config.session_cleanup_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            let removed = state.sessions.cleanup_expired().await;
            if removed > 0 {
                tracing::info!(removed, "expired sessions cleaned up");
            }
        }
    });
}

#[cfg(test)]
#[path = "sched_tests.rs"]
mod tests;
