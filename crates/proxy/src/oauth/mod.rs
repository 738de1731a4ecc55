// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth2 authorization code + PKCE flow and token lifecycle calls.

pub mod client;
pub mod pkce;

pub use client::{OAuthClient, OAuthConfig, OAuthError, TokenResponse};

/// Version header sent on every upstream call.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta capability header required for OAuth bearer access.
pub const ANTHROPIC_BETA: &str = "oauth-2025-04-20";

/// A freshly started authorization flow.
///
/// The verifier goes back to the frontend and is returned on exchange; this
/// mirrors the original protocol and is a deliberate trust boundary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub state: String,
    pub code_verifier: String,
}
