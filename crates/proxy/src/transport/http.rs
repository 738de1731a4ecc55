// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin handlers: token, account, and session management.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::model::TokenRole;
use crate::service::account::AccountUpdate;
use crate::service::token::TokenUpdate;
use crate::state::AppState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub accounts: usize,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub name: String,
    #[serde(default)]
    pub role: Option<TokenRole>,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub id: String,
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    pub recovered: usize,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        accounts: s.accounts.list().await.len(),
        sessions: s.sessions.list().await.len(),
    })
}

/// `POST /api/v1/tokens` — create an API token.
pub async fn create_token(
    State(s): State<Arc<AppState>>,
    Json(req): Json<CreateTokenRequest>,
) -> impl IntoResponse {
    let role = req.role.unwrap_or(TokenRole::User);
    match s.tokens.create(req.name, role).await {
        Ok(token) => Json(token).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /api/v1/tokens`
pub async fn list_tokens(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.tokens.list().await)
}

/// `GET /api/v1/tokens/{id}`
pub async fn get_token(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.tokens.get(&id).await {
        Ok(token) => Json(token).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `PUT /api/v1/tokens/{id}`
pub async fn update_token(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<TokenUpdate>,
) -> impl IntoResponse {
    match s.tokens.update(&id, update).await {
        Ok(token) => Json(token).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `DELETE /api/v1/tokens/{id}`
pub async fn delete_token(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.tokens.delete(&id).await {
        Ok(_) => Json(RemovedResponse { id, removed: true }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /api/v1/accounts`
pub async fn list_accounts(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.accounts.list().await)
}

/// `GET /api/v1/accounts/{id}`
pub async fn get_account(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.accounts.get(&id).await {
        Ok(account) => Json(account).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `PUT /api/v1/accounts/{id}`
pub async fn update_account(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<AccountUpdate>,
) -> impl IntoResponse {
    match s.accounts.update(&id, update).await {
        Ok(account) => Json(account).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `DELETE /api/v1/accounts/{id}`
pub async fn delete_account(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.accounts.delete(&id).await {
        Ok(_) => Json(RemovedResponse { id, removed: true }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /api/v1/accounts/refresh` — manual refresh-all trigger.
pub async fn refresh_accounts(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.accounts.refresh_all_accounts().await)
}

/// `POST /api/v1/accounts/recover` — manual rate-limit recovery pass.
pub async fn recover_accounts(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(RecoverResponse { recovered: s.accounts.recover_rate_limited_accounts().await })
}

/// `GET /api/v1/accounts/statistics`
pub async fn account_statistics(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.accounts.statistics().await)
}

/// `GET /api/v1/sessions`
pub async fn list_sessions(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.sessions.list().await)
}

/// `GET /api/v1/sessions/statistics`
pub async fn session_statistics(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(s.sessions.statistics().await)
}

/// `GET /api/v1/sessions/{id}`
pub async fn get_session(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.sessions.get(&id).await {
        Ok(session) => Json(session).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `DELETE /api/v1/sessions/{id}` — revoke a session.
pub async fn revoke_session(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match s.sessions.revoke(&id).await {
        Ok(_) => Json(RemovedResponse { id, removed: true }).into_response(),
        Err(e) => e.into_response(),
    }
}
