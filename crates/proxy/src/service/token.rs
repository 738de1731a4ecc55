// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing API key management and edge validation.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;

use crate::error::ServiceError;
use crate::model::{ApiToken, TokenRole, TokenStatus};
use crate::store::{SnapshotStore, TokenCache};

/// Generate an opaque API key.
fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    format!("sk-proxy-{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Fields accepted on token update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenUpdate {
    pub name: Option<String>,
    pub status: Option<TokenStatus>,
    pub role: Option<TokenRole>,
}

pub struct TokenService {
    cache: Arc<TokenCache>,
    store: Arc<SnapshotStore>,
}

impl TokenService {
    pub fn new(cache: Arc<TokenCache>, store: Arc<SnapshotStore>) -> Self {
        Self { cache, store }
    }

    /// Cold load from the snapshot file.
    pub async fn load(&self) -> anyhow::Result<usize> {
        let tokens = self.store.load_tokens()?;
        let count = tokens.len();
        self.cache.replace_all(tokens).await;
        Ok(count)
    }

    pub async fn create(&self, name: String, role: TokenRole) -> Result<ApiToken, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::validation("token name must not be empty"));
        }
        let token = ApiToken::new(name, generate_key(), role, Utc::now());
        self.cache.insert(token.clone()).await?;
        tracing::info!(token_id = %token.id, name = %token.name, "API token created");
        Ok(token)
    }

    pub async fn get(&self, id: &str) -> Result<ApiToken, ServiceError> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| ServiceError::not_found(format!("unknown token: {id}")))
    }

    pub async fn get_by_key(&self, key: &str) -> Option<ApiToken> {
        self.cache.get_by_key(key).await
    }

    pub async fn list(&self) -> Vec<ApiToken> {
        self.cache.list().await
    }

    /// Apply an update. Revoked is terminal: no transition away from it.
    pub async fn update(&self, id: &str, update: TokenUpdate) -> Result<ApiToken, ServiceError> {
        let now = Utc::now();
        self.cache
            .update_with(id, |token| {
                if token.status == TokenStatus::Revoked
                    && update.status.is_some_and(|s| s != TokenStatus::Revoked)
                {
                    return Err(ServiceError::conflict("a revoked token cannot be reactivated"));
                }
                if let Some(ref name) = update.name {
                    if name.trim().is_empty() {
                        return Err(ServiceError::validation("token name must not be empty"));
                    }
                    token.name = name.clone();
                }
                if let Some(status) = update.status {
                    token.status = status;
                }
                if let Some(role) = update.role {
                    token.role = role;
                }
                token.updated_at = now;
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<ApiToken, ServiceError> {
        let token = self.cache.remove(id).await?;
        tracing::info!(token_id = %id, "API token deleted");
        Ok(token)
    }

    /// Edge validation: look up by key, require active status, and bump
    /// usage counters atomically.
    pub async fn validate(&self, key: &str) -> Result<ApiToken, ServiceError> {
        let token = self
            .cache
            .get_by_key(key)
            .await
            .ok_or_else(|| ServiceError::unauthorized("unknown API key"))?;
        if !token.is_active() {
            return Err(ServiceError::unauthorized("API key is not active"));
        }
        self.cache.touch(key, Utc::now()).await
    }

    /// Snapshot the collection to disk.
    pub async fn sync(&self) -> anyhow::Result<()> {
        let tokens = self.cache.list().await;
        self.store.save_tokens(&tokens)
    }

    /// Best-effort shutdown flush; never fails the caller.
    pub async fn final_sync(&self) {
        if let Err(e) = self.sync().await {
            tracing::warn!(err = %e, "final token snapshot failed");
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
