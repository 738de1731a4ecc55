// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: thin handlers over the services.

pub mod auth;
pub mod http;
pub mod http_oauth;
pub mod proxy;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the axum `Router` with all proxy routes.
///
/// Admin and OAuth endpoints sit behind the master-key middleware; anything
/// unmatched falls through to the `/v1/*` forwarder, which authenticates by
/// API key itself.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // API tokens
        .route("/api/v1/tokens", post(http::create_token).get(http::list_tokens))
        .route(
            "/api/v1/tokens/{id}",
            get(http::get_token).put(http::update_token).delete(http::delete_token),
        )
        // Accounts
        .route("/api/v1/accounts", get(http::list_accounts))
        .route("/api/v1/accounts/statistics", get(http::account_statistics))
        .route("/api/v1/accounts/refresh", post(http::refresh_accounts))
        .route("/api/v1/accounts/recover", post(http::recover_accounts))
        .route(
            "/api/v1/accounts/{id}",
            get(http::get_account).put(http::update_account).delete(http::delete_account),
        )
        // Sessions
        .route("/api/v1/sessions", get(http::list_sessions))
        .route("/api/v1/sessions/statistics", get(http::session_statistics))
        .route("/api/v1/sessions/{id}", get(http::get_session).delete(http::revoke_session))
        // OAuth provisioning
        .route("/oauth/authorize", get(http_oauth::authorize))
        .route("/oauth/exchange", post(http_oauth::exchange))
        // Proxy forwarding for everything else
        .fallback(proxy::forward)
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::admin_auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
