// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request forwarding: pick an account, ensure a fresh token, relay the call.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::ServiceError;
use crate::model::Account;
use crate::oauth::{ANTHROPIC_BETA, ANTHROPIC_VERSION};
use crate::service::AccountService;

/// An upstream response relayed verbatim to the caller.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: Bytes,
}

pub struct ProxyService {
    accounts: Arc<AccountService>,
    http: reqwest::Client,
    base_url: String,
}

impl ProxyService {
    pub fn new(accounts: Arc<AccountService>, base_url: String, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self { accounts, http, base_url }
    }

    /// Pick an account for the next request, preferring ones whose access
    /// token does not need an immediate refresh.
    pub async fn select_account(&self) -> Result<Account, ServiceError> {
        let now = Utc::now();
        let available: Vec<Account> = self
            .accounts
            .list()
            .await
            .into_iter()
            .filter(|a| a.is_available_for_proxy(now))
            .collect();
        Self::pick(available, now)
            .ok_or_else(|| ServiceError::service_unavailable("no usable accounts in pool"))
    }

    /// Stateless selection: fresh accounts first, index derived from the
    /// wall clock. The pool is small and requests are frequent, so this
    /// spreads load evenly without shared counters.
    fn pick(available: Vec<Account>, now: DateTime<Utc>) -> Option<Account> {
        if available.is_empty() {
            return None;
        }
        let (fresh, stale): (Vec<Account>, Vec<Account>) =
            available.into_iter().partition(|a| !a.needs_refresh(now));
        let mut pool = if fresh.is_empty() { stale } else { fresh };
        pool.sort_by(|a, b| a.id.cmp(&b.id));
        let idx = now.timestamp_millis().unsigned_abs() as usize % pool.len();
        pool.into_iter().nth(idx)
    }

    /// Forward a request to the upstream. Method, path, query, and body are
    /// preserved; auth and versioning headers are injected. The response is
    /// returned verbatim — including 429s, which do not touch account state.
    pub async fn forward(
        &self,
        method: axum::http::Method,
        path_and_query: &str,
        body: Bytes,
    ) -> Result<ForwardedResponse, ServiceError> {
        let account = self.select_account().await?;
        let access_token = self.accounts.get_valid_token(&account.id).await?;

        let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|_| ServiceError::parse("unsupported HTTP method"))?;
        let url = format!("{}{}", self.base_url, path_and_query);

        let resp = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bearer {access_token}"))
            .header("Content-Type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", ANTHROPIC_BETA)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::timeout("upstream request timed out")
                } else {
                    ServiceError::internal(format!("upstream request failed: {e}"))
                }
            })?;

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ServiceError::internal(format!("upstream body read failed: {e}")))?;

        tracing::debug!(account_id = %account.id, status, "request forwarded");
        Ok(ForwardedResponse { status, headers, body })
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
