// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session admission: the proxy's concurrency gate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ServiceError;
use crate::model::Session;
use crate::store::{SessionCache, SnapshotStore};

/// Request metadata captured on admission.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub user_agent: String,
    pub ip_address: String,
    pub request_path: String,
}

/// Session statistics for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatistics {
    pub total: usize,
    pub active: usize,
    pub per_token: HashMap<String, usize>,
}

pub struct SessionService {
    cache: Arc<SessionCache>,
    store: Arc<SnapshotStore>,
    max_concurrent: usize,
    ttl: Duration,
}

impl SessionService {
    pub fn new(
        cache: Arc<SessionCache>,
        store: Arc<SnapshotStore>,
        max_concurrent: usize,
        ttl_secs: u64,
    ) -> Self {
        Self { cache, store, max_concurrent, ttl: Duration::seconds(ttl_secs as i64) }
    }

    /// Cold load from the snapshot file.
    pub async fn load(&self) -> anyhow::Result<usize> {
        let sessions = self.store.load_sessions()?;
        let count = sessions.len();
        self.cache.replace_all(sessions).await;
        Ok(count)
    }

    /// Deterministic session identity: the same caller (token + client)
    /// re-uses its reservation instead of consuming a new slot.
    pub fn derive_session_id(token_id: &str, ip_address: &str, user_agent: &str) -> String {
        let digest = Sha256::digest(format!("{token_id}|{ip_address}|{user_agent}").as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Admit a new session, failing when the live count is at the ceiling.
    /// Expired entries are swept as part of the same linearizable step.
    pub async fn create_session(
        &self,
        token_id: &str,
        meta: SessionMetadata,
    ) -> Result<Session, ServiceError> {
        let now = Utc::now();
        let id = Self::derive_session_id(token_id, &meta.ip_address, &meta.user_agent);
        let session = Session::new(
            id,
            token_id.to_owned(),
            meta.user_agent,
            meta.ip_address,
            meta.request_path,
            self.ttl,
            now,
        );
        self.cache.admit(session, self.max_concurrent, now).await
    }

    /// Absence is not an error: returns whether the session exists, is
    /// active, and is unexpired.
    pub async fn validate_session(&self, id: &str) -> bool {
        self.cache.get(id).await.is_some_and(|s| s.is_live(Utc::now()))
    }

    /// Extend a session's reservation on reuse.
    pub async fn refresh_session(&self, id: &str) -> Result<Session, ServiceError> {
        self.cache.touch(id, self.ttl, Utc::now()).await
    }

    /// Hot-path admission: extend the caller's live session, or admit a new
    /// one when none exists.
    pub async fn admit_request(
        &self,
        token_id: &str,
        meta: SessionMetadata,
    ) -> Result<Session, ServiceError> {
        let id = Self::derive_session_id(token_id, &meta.ip_address, &meta.user_agent);
        if self.validate_session(&id).await {
            return self.refresh_session(&id).await;
        }
        self.create_session(token_id, meta).await
    }

    /// Sweep expired sessions; returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        self.cache.sweep_expired(Utc::now()).await
    }

    pub async fn get(&self, id: &str) -> Result<Session, ServiceError> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| ServiceError::not_found(format!("unknown session: {id}")))
    }

    pub async fn list(&self) -> Vec<Session> {
        self.cache.list().await
    }

    pub async fn sessions_for_token(&self, token_id: &str) -> Vec<Session> {
        self.cache.sessions_for_token(token_id).await
    }

    /// Revoke a session, releasing its slot immediately.
    pub async fn revoke(&self, id: &str) -> Result<Session, ServiceError> {
        let session = self.cache.remove(id).await?;
        tracing::info!(session_id = %id, "session revoked");
        Ok(session)
    }

    pub async fn statistics(&self) -> SessionStatistics {
        let now = Utc::now();
        let sessions = self.cache.list().await;
        let mut per_token: HashMap<String, usize> = HashMap::new();
        let mut active = 0;
        for session in &sessions {
            if session.is_live(now) {
                active += 1;
                *per_token.entry(session.token_id.clone()).or_default() += 1;
            }
        }
        SessionStatistics { total: sessions.len(), active, per_token }
    }

    /// Snapshot the collection to disk.
    pub async fn sync(&self) -> anyhow::Result<()> {
        let sessions = self.cache.list().await;
        self.store.save_sessions(&sessions)
    }

    /// Best-effort shutdown flush; never fails the caller.
    pub async fn final_sync(&self) {
        if let Err(e) = self.sync().await {
            tracing::warn!(err = %e, "final session snapshot failed");
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
