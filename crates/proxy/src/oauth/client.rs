// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth2 token endpoint client: code exchange, refresh, organization probe.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::oauth::pkce;
use crate::oauth::{AuthorizationRequest, ANTHROPIC_BETA, ANTHROPIC_VERSION};

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Token endpoint failures, classified for account state transitions.
#[derive(Debug)]
pub enum OAuthError {
    /// 429 from the endpoint; `retry_after` parsed from the Retry-After
    /// header when the upstream supplies one.
    RateLimited { retry_after: Option<Duration>, body: String },
    /// 4xx indicating the grant is permanently unusable.
    InvalidGrant { status: u16, body: String },
    /// Other non-2xx statuses.
    Http { status: u16, body: String },
    /// Connection or timeout failure.
    Network(String),
    /// 2xx with an undecodable body.
    Decode(String),
}

impl OAuthError {
    /// Transient failures are worth retrying; rate limits and dead grants
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Decode(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::RateLimited { .. } | Self::InvalidGrant { .. } => false,
        }
    }
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { body, .. } => write!(f, "token endpoint rate limited: {body}"),
            Self::InvalidGrant { status, body } => {
                write!(f, "grant rejected ({status}): {body}")
            }
            Self::Http { status, body } => write!(f, "token endpoint error ({status}): {body}"),
            Self::Network(msg) => write!(f, "token endpoint unreachable: {msg}"),
            Self::Decode(msg) => write!(f, "token response undecodable: {msg}"),
        }
    }
}

impl std::error::Error for OAuthError {}

/// OAuth endpoints and client identity.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

static CRYPTO_PROVIDER: std::sync::Once = std::sync::Once::new();

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        // reqwest is built without a default TLS provider; install ring once.
        CRYPTO_PROVIDER.call_once(|| {
            let _ = rustls::crypto::ring::default_provider().install_default();
        });
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    /// Begin an authorization flow: fresh verifier, challenge, and state.
    pub fn begin_authorization(&self, organization_uuid: Option<&str>) -> AuthorizationRequest {
        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::compute_code_challenge(&code_verifier);
        let state = pkce::generate_state();
        let authorization_url = pkce::build_authorization_url(
            &self.config.authorize_url,
            &self.config.client_id,
            &self.config.redirect_uri,
            &self.config.scope,
            &state,
            &code_challenge,
            organization_uuid,
        );
        AuthorizationRequest { authorization_url, state, code_verifier }
    }

    /// Exchange an authorization code for tokens.
    ///
    /// The frontend may deliver the code as `"<code>#<state>"`; the embedded
    /// state wins over the separately supplied one.
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let (code, state) = match code.split_once('#') {
            Some((c, s)) => (c, s),
            None => (code, state),
        };
        let body = serde_json::json!({
            "grant_type": "authorization_code",
            "client_id": self.config.client_id,
            "code": code,
            "state": state,
            "redirect_uri": self.config.redirect_uri,
            "code_verifier": code_verifier,
        });
        self.post_token(&body).await
    }

    /// Refresh an access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthError> {
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": self.config.client_id,
        });
        self.post_token(&body).await
    }

    /// Refresh with backoff retries on transient failures. Rate limits and
    /// invalid grants are terminal and returned immediately.
    pub async fn refresh_with_retries(
        &self,
        refresh_token: &str,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<TokenResponse, OAuthError> {
        let mut backoff = retry_delay;
        let max_backoff = Duration::from_secs(60);

        let mut attempt = 0;
        loop {
            match self.refresh(refresh_token).await {
                Ok(token) => return Ok(token),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    tracing::debug!(attempt, err = %e, "refresh attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_token(&self, body: &serde_json::Value) -> Result<TokenResponse, OAuthError> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            return Err(OAuthError::RateLimited { retry_after, body });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status.is_client_error() && is_invalid_grant(status.as_u16(), &body) {
                return Err(OAuthError::InvalidGrant { status: status.as_u16(), body });
            }
            return Err(OAuthError::Http { status: status.as_u16(), body });
        }

        let bytes = resp.bytes().await.map_err(|e| OAuthError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| OAuthError::Decode(e.to_string()))
    }

    /// Probe the organizations endpoint with a fresh access token; returns
    /// the first organization's uuid when one exists.
    pub async fn fetch_organization_uuid(
        &self,
        base_url: &str,
        access_token: &str,
    ) -> anyhow::Result<Option<String>> {
        #[derive(Deserialize)]
        struct Organization {
            uuid: String,
        }

        let url = format!("{base_url}/api/organizations");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", ANTHROPIC_BETA)
            .send()
            .await?
            .error_for_status()?;
        let orgs: Vec<Organization> = resp.json().await?;
        Ok(orgs.into_iter().next().map(|o| o.uuid))
    }
}

/// The grant is dead when the endpoint says so explicitly or answers 401.
fn is_invalid_grant(status: u16, body: &str) -> bool {
    status == 401
        || body.contains("invalid_grant")
        || body.contains("invalid_client")
        || body.contains("unauthorized")
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
