// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool proxy: fronts an upstream LLM API on behalf of many API keys,
//! multiplexing traffic across a pool of OAuth-authenticated accounts.

pub mod config;
pub mod error;
pub mod model;
pub mod oauth;
pub mod sched;
pub mod service;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::oauth::OAuthClient;
use crate::service::{AccountService, ProxyService, SessionService, TokenService};
use crate::state::AppState;
use crate::store::{AccountCache, SessionCache, SnapshotStore, TokenCache};
use crate::transport::build_router;

/// Run the proxy until shutdown, then flush final snapshots.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    // reqwest is built without a default TLS provider; install ring once.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let data_dir = config.data_dir();
    store::persist::ensure_data_folder(&data_dir)?;
    let snapshots = Arc::new(SnapshotStore::new(data_dir));

    let oauth = Arc::new(OAuthClient::new(config.oauth_config()));

    let tokens =
        Arc::new(TokenService::new(Arc::new(TokenCache::new()), Arc::clone(&snapshots)));
    let accounts = Arc::new(AccountService::new(
        Arc::new(AccountCache::new()),
        Arc::clone(&snapshots),
        oauth,
        config.base_url.clone(),
        config.max_retries,
        config.retry_delay(),
    ));
    let sessions = Arc::new(SessionService::new(
        Arc::new(SessionCache::new()),
        Arc::clone(&snapshots),
        config.session_max_concurrent,
        config.session_ttl_secs,
    ));

    let loaded_tokens = tokens.load().await?;
    let loaded_accounts = accounts.load().await?;
    let loaded_sessions = sessions.load().await?;
    tracing::info!(
        tokens = loaded_tokens,
        accounts = loaded_accounts,
        sessions = loaded_sessions,
        "cold state loaded"
    );

    let proxy =
        ProxyService::new(Arc::clone(&accounts), config.base_url.clone(), config.request_timeout());

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        config: config.clone(),
        tokens,
        accounts,
        sessions,
        proxy,
        shutdown: shutdown.clone(),
    });

    sched::spawn_sync_scheduler(Arc::clone(&state));
    sched::spawn_refresh_scheduler(Arc::clone(&state));
    if config.session_enabled && config.session_cleanup_enabled {
        sched::spawn_session_cleanup(Arc::clone(&state));
    }

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            ctrl_c_shutdown.cancel();
        }
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("poolproxy listening on {addr}");

    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // Schedulers observed the cancellation; flush one last time. Best effort:
    // a failed write must not fail shutdown.
    state.tokens.final_sync().await;
    state.accounts.final_sync().await;
    state.sessions.final_sync().await;
    tracing::info!("final snapshots written, exiting");

    Ok(())
}
