// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory repositories. All reads hand out clones; mutation happens only
//! under the collection's write lock.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::model::{Account, ApiToken, Session};

// -- Accounts -----------------------------------------------------------------

#[derive(Default)]
pub struct AccountCache {
    inner: RwLock<HashMap<String, Account>>,
}

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<Account> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Account> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn insert(&self, account: Account) -> Result<(), ServiceError> {
        let mut map = self.inner.write().await;
        if map.contains_key(&account.id) {
            return Err(ServiceError::conflict(format!("account already exists: {}", account.id)));
        }
        map.insert(account.id.clone(), account);
        Ok(())
    }

    /// Mutate one account atomically; the closure runs on a copy that is
    /// committed only when it returns Ok.
    pub async fn update_with<F>(&self, id: &str, f: F) -> Result<Account, ServiceError>
    where
        F: FnOnce(&mut Account) -> Result<(), ServiceError>,
    {
        let mut map = self.inner.write().await;
        let current =
            map.get(id).ok_or_else(|| ServiceError::not_found(format!("unknown account: {id}")))?;
        let mut updated = current.clone();
        f(&mut updated)?;
        map.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    pub async fn remove(&self, id: &str) -> Result<Account, ServiceError> {
        self.inner
            .write()
            .await
            .remove(id)
            .ok_or_else(|| ServiceError::not_found(format!("unknown account: {id}")))
    }

    /// Replace the full collection (cold load).
    pub async fn replace_all(&self, accounts: Vec<Account>) {
        let mut map = self.inner.write().await;
        map.clear();
        for account in accounts {
            map.insert(account.id.clone(), account);
        }
    }
}

// -- API tokens ---------------------------------------------------------------

#[derive(Default)]
pub struct TokenCache {
    inner: RwLock<HashMap<String, ApiToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<ApiToken> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<ApiToken> {
        self.inner.read().await.get(id).cloned()
    }

    /// Linear scan by key. The pool is small; no index is warranted.
    pub async fn get_by_key(&self, key: &str) -> Option<ApiToken> {
        self.inner.read().await.values().find(|t| t.key == key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Insert with `name`/`key` uniqueness enforced under the write lock.
    pub async fn insert(&self, token: ApiToken) -> Result<(), ServiceError> {
        let mut map = self.inner.write().await;
        if map.contains_key(&token.id) {
            return Err(ServiceError::conflict(format!("token already exists: {}", token.id)));
        }
        if map.values().any(|t| t.name == token.name) {
            return Err(ServiceError::conflict(format!("token name already in use: {}", token.name)));
        }
        if map.values().any(|t| t.key == token.key) {
            return Err(ServiceError::conflict("token key already in use"));
        }
        map.insert(token.id.clone(), token);
        Ok(())
    }

    /// Mutate one token atomically, re-checking `name`/`key` uniqueness
    /// against the rest of the collection before committing.
    pub async fn update_with<F>(&self, id: &str, f: F) -> Result<ApiToken, ServiceError>
    where
        F: FnOnce(&mut ApiToken) -> Result<(), ServiceError>,
    {
        let mut map = self.inner.write().await;
        let current =
            map.get(id).ok_or_else(|| ServiceError::not_found(format!("unknown token: {id}")))?;
        let mut updated = current.clone();
        f(&mut updated)?;
        if map.values().any(|t| t.id != updated.id && (t.name == updated.name || t.key == updated.key))
        {
            return Err(ServiceError::conflict(format!(
                "token name already in use: {}",
                updated.name
            )));
        }
        map.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    /// Record a successful validation (usage counter + last-used timestamp),
    /// keyed by the token's key.
    pub async fn touch(&self, key: &str, now: DateTime<Utc>) -> Result<ApiToken, ServiceError> {
        let mut map = self.inner.write().await;
        let token = map
            .values_mut()
            .find(|t| t.key == key)
            .ok_or_else(|| ServiceError::unauthorized("unknown API key"))?;
        token.record_use(now);
        Ok(token.clone())
    }

    pub async fn remove(&self, id: &str) -> Result<ApiToken, ServiceError> {
        self.inner
            .write()
            .await
            .remove(id)
            .ok_or_else(|| ServiceError::not_found(format!("unknown token: {id}")))
    }

    pub async fn replace_all(&self, tokens: Vec<ApiToken>) {
        let mut map = self.inner.write().await;
        map.clear();
        for token in tokens {
            map.insert(token.id.clone(), token);
        }
    }
}

// -- Sessions -----------------------------------------------------------------

#[derive(Default)]
struct SessionMap {
    by_id: HashMap<String, Session>,
    /// Secondary index for reverse lookup; kept consistent with `by_id`.
    by_token: HashMap<String, HashSet<String>>,
}

impl SessionMap {
    fn insert(&mut self, session: Session) {
        self.by_token
            .entry(session.token_id.clone())
            .or_default()
            .insert(session.id.clone());
        self.by_id.insert(session.id.clone(), session);
    }

    fn remove(&mut self, id: &str) -> Option<Session> {
        let session = self.by_id.remove(id)?;
        if let Some(ids) = self.by_token.get_mut(&session.token_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_token.remove(&session.token_id);
            }
        }
        Some(session)
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .by_id
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            self.remove(id);
        }
        expired.len()
    }

    fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.by_id.values().filter(|s| s.is_live(now)).count()
    }
}

#[derive(Default)]
pub struct SessionCache {
    inner: RwLock<SessionMap>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<Session> {
        self.inner.read().await.by_id.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.inner.read().await.by_id.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_id.is_empty()
    }

    pub async fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.inner.read().await.live_count(now)
    }

    pub async fn sessions_for_token(&self, token_id: &str) -> Vec<Session> {
        let map = self.inner.read().await;
        match map.by_token.get(token_id) {
            Some(ids) => ids.iter().filter_map(|id| map.by_id.get(id)).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Admission gate: sweep expired entries, count live sessions, and insert
    /// — all under one write guard so the ceiling cannot be overshot.
    ///
    /// Re-admitting an id that is still live extends it instead of consuming
    /// a new slot.
    pub async fn admit(
        &self,
        session: Session,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> Result<Session, ServiceError> {
        let mut map = self.inner.write().await;
        map.sweep_expired(now);

        if let Some(existing) = map.by_id.get_mut(&session.id) {
            if existing.is_live(now) {
                existing.last_seen_at = session.last_seen_at;
                existing.expires_at = session.expires_at;
                return Ok(existing.clone());
            }
            map.remove(&session.id);
        }

        if map.live_count(now) >= max_active {
            return Err(ServiceError::session_limit_exceeded(format!(
                "concurrent session limit of {max_active} reached"
            )));
        }
        map.insert(session.clone());
        Ok(session)
    }

    /// Extend a live session's reservation.
    pub async fn touch(
        &self,
        id: &str,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Session, ServiceError> {
        let mut map = self.inner.write().await;
        let session = map
            .by_id
            .get_mut(id)
            .ok_or_else(|| ServiceError::not_found(format!("unknown session: {id}")))?;
        session.touch(ttl, now);
        Ok(session.clone())
    }

    pub async fn remove(&self, id: &str) -> Result<Session, ServiceError> {
        self.inner
            .write()
            .await
            .remove(id)
            .ok_or_else(|| ServiceError::not_found(format!("unknown session: {id}")))
    }

    /// Delete expired sessions; returns how many were removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        self.inner.write().await.sweep_expired(now)
    }

    pub async fn replace_all(&self, sessions: Vec<Session>) {
        let mut map = self.inner.write().await;
        map.by_id.clear();
        map.by_token.clear();
        for session in sessions {
            map.insert(session);
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
