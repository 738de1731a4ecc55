// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth provisioning endpoints.
//!
//! The verifier travels to the frontend and comes back on exchange — the
//! original protocol's trust boundary, preserved as-is.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub organization_uuid: Option<String>,
}

/// `GET /oauth/authorize` — start an authorization flow.
///
/// Returns `{authorization_url, state, code_verifier}`; the frontend opens
/// the URL and posts the resulting code back together with the verifier.
pub async fn authorize(
    State(s): State<Arc<AppState>>,
    Query(query): Query<AuthorizeQuery>,
) -> impl IntoResponse {
    let request = s.accounts.begin_authorization(query.organization_uuid.as_deref());
    Json(request)
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    /// Account display name; generated when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Authorization code, possibly in `"<code>#<state>"` form.
    pub code: String,
    #[serde(default)]
    pub state: Option<String>,
    pub code_verifier: String,
    #[serde(default)]
    pub organization_uuid: Option<String>,
}

/// `POST /oauth/exchange` — complete account creation.
pub async fn exchange(
    State(s): State<Arc<AppState>>,
    Json(req): Json<ExchangeRequest>,
) -> impl IntoResponse {
    let name = match req.name {
        Some(name) => name,
        None => {
            let suffix = uuid::Uuid::new_v4().to_string();
            format!("account-{}", &suffix[..8])
        }
    };
    let state = req.state.unwrap_or_default();
    match s
        .accounts
        .create_account(name, &req.code, &state, &req.code_verifier, req.organization_uuid)
        .await
    {
        Ok(account) => Json(account).into_response(),
        Err(e) => e.into_response(),
    }
}
