// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ServiceError;
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers against the master admin key.
/// No configured key means admin auth is disabled.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ServiceError> {
    let expected = match expected {
        Some(key) => key,
        None => return Ok(()),
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::unauthorized("missing Authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::unauthorized("malformed Authorization header"))?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ServiceError::unauthorized("invalid admin token"))
    }
}

/// Axum middleware guarding the admin and OAuth surfaces.
///
/// Exempt: `/api/v1/health` and everything outside `/api/v1/` + `/oauth/`
/// (the proxy path authenticates via `X-API-Key` in its own handler).
pub async fn admin_auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    let guarded = path.starts_with("/api/v1/") || path.starts_with("/oauth/");
    if !guarded || path == "/api/v1/health" {
        return next.run(req).await;
    }

    if let Err(e) = validate_bearer(req.headers(), state.config.api_key.as_deref()) {
        return e.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
