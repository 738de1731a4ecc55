// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `/v1/*` forwarder: API-key auth, session admission, upstream relay.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::ServiceError;
use crate::service::SessionMetadata;
use crate::state::AppState;

/// Upper bound on a buffered request body.
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Fallback handler: any unmatched path under `/v1/` is forwarded upstream
/// after API-key auth and session admission.
pub async fn forward(State(s): State<Arc<AppState>>, req: Request) -> Response {
    let path = req.uri().path().to_owned();
    if !path.starts_with("/v1/") {
        return ServiceError::not_found(format!("no such endpoint: {path}")).into_response();
    }

    let key = match req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(key) => key.to_owned(),
        None => {
            return ServiceError::unauthorized("missing X-API-Key header").into_response();
        }
    };
    let token = match s.tokens.validate(&key).await {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let user_agent = header_string(&req, "user-agent");
    // Behind a load balancer the first X-Forwarded-For hop is the client.
    let forwarded = header_string(&req, "x-forwarded-for");
    let ip_address = forwarded.split(',').next().unwrap_or_default().trim().to_owned();

    if s.config.session_enabled {
        let meta = SessionMetadata { user_agent, ip_address, request_path: path.clone() };
        if let Err(e) = s.sessions.admit_request(&token.id, meta).await {
            return e.into_response();
        }
    }

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or(path);
    let method = req.method().clone();

    let body = match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return ServiceError::validation(format!("failed to read request body: {e}"))
                .into_response();
        }
    };

    match s.proxy.forward(method, &path_and_query, body).await {
        Ok(upstream) => {
            let status =
                StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut builder = Response::builder().status(status);
            for (name, value) in upstream.headers.iter() {
                // reqwest already decoded the transfer encoding; relaying
                // these would corrupt the response framing.
                if name == "transfer-encoding" || name == "connection" {
                    continue;
                }
                builder = builder.header(name, value);
            }
            match builder.body(Body::from(upstream.body)) {
                Ok(resp) => resp,
                Err(e) => {
                    ServiceError::internal(format!("response assembly failed: {e}"))
                        .into_response()
                }
            }
        }
        Err(e) => e.into_response(),
    }
}

fn header_string(req: &Request, name: &str) -> String {
    req.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned()
}
