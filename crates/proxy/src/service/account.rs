// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Account pool lifecycle: provisioning, single-flight refresh, rate-limit
//! recovery, and pool statistics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::ServiceError;
use crate::model::{Account, AccountStatus};
use crate::oauth::{OAuthClient, OAuthError};
use crate::store::{AccountCache, SnapshotStore};

/// Backoff applied on a 429 when the endpoint does not say how long to wait.
const DEFAULT_RATE_LIMIT_BACKOFF_SECS: i64 = 3600;

/// Refresh error messages stored on the account are clipped to this length.
const ERROR_CLIP_LEN: usize = 256;

/// Outcome of a scheduled refresh-all pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Pool statistics for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatistics {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub rate_limited: usize,
    pub invalid: usize,
    pub needs_refresh: usize,
    /// Hours since the earliest access-token expiry in the pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_expiry_age_hours: Option<i64>,
    pub system_health: SystemHealth,
}

/// Fields accepted on account update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub status: Option<AccountStatus>,
}

pub struct AccountService {
    cache: Arc<AccountCache>,
    store: Arc<SnapshotStore>,
    oauth: Arc<OAuthClient>,
    base_url: String,
    max_retries: u32,
    retry_delay: StdDuration,
    /// Per-account refresh serialization. The map itself is only locked long
    /// enough to fetch or drop an entry; refreshes hold the inner mutex.
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccountService {
    pub fn new(
        cache: Arc<AccountCache>,
        store: Arc<SnapshotStore>,
        oauth: Arc<OAuthClient>,
        base_url: String,
        max_retries: u32,
        retry_delay: StdDuration,
    ) -> Self {
        Self {
            cache,
            store,
            oauth,
            base_url,
            max_retries,
            retry_delay,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Cold load from the snapshot file.
    pub async fn load(&self) -> anyhow::Result<usize> {
        let accounts = self.store.load_accounts()?;
        let count = accounts.len();
        self.cache.replace_all(accounts).await;
        Ok(count)
    }

    /// Start an authorization flow for a new account.
    pub fn begin_authorization(
        &self,
        organization_uuid: Option<&str>,
    ) -> crate::oauth::AuthorizationRequest {
        self.oauth.begin_authorization(organization_uuid)
    }

    /// Provision a new account by completing the authorization code exchange,
    /// then probing the organizations endpoint with the fresh token.
    pub async fn create_account(
        &self,
        name: String,
        code: &str,
        state: &str,
        code_verifier: &str,
        organization_uuid: Option<String>,
    ) -> Result<Account, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::validation("account name must not be empty"));
        }

        let token = self
            .oauth
            .exchange_code(code, state, code_verifier)
            .await
            .map_err(|e| classify_oauth_error(&e, "code exchange failed"))?;
        let refresh_token = token.refresh_token.unwrap_or_default();
        if refresh_token.is_empty() {
            return Err(ServiceError::internal("token endpoint returned no refresh token"));
        }

        let organization_uuid = match organization_uuid {
            Some(uuid) => uuid,
            None => {
                match self.oauth.fetch_organization_uuid(&self.base_url, &token.access_token).await
                {
                    Ok(Some(uuid)) => uuid,
                    Ok(None) => String::new(),
                    Err(e) => {
                        // Non-fatal: the account works without an org uuid.
                        tracing::warn!(err = %e, "organization probe failed");
                        String::new()
                    }
                }
            }
        };

        let account = Account::new(
            name,
            organization_uuid,
            token.access_token,
            refresh_token,
            token.expires_in,
            Utc::now(),
        );
        self.cache.insert(account.clone()).await?;
        tracing::info!(account_id = %account.id, name = %account.name, "account created");
        Ok(account)
    }

    pub async fn get(&self, id: &str) -> Result<Account, ServiceError> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| ServiceError::not_found(format!("unknown account: {id}")))
    }

    pub async fn list(&self) -> Vec<Account> {
        self.cache.list().await
    }

    /// Rename or flip an account between active and inactive. Rate-limited
    /// and invalid are outcomes of upstream classification, not admin input.
    pub async fn update(&self, id: &str, update: AccountUpdate) -> Result<Account, ServiceError> {
        let now = Utc::now();
        self.cache
            .update_with(id, |account| {
                if let Some(ref name) = update.name {
                    if name.trim().is_empty() {
                        return Err(ServiceError::validation("account name must not be empty"));
                    }
                    account.name = name.clone();
                }
                match update.status {
                    None => {}
                    Some(AccountStatus::Active) => {
                        if account.refresh_token.is_empty() {
                            return Err(ServiceError::validation(
                                "an account without a refresh token cannot be activated",
                            ));
                        }
                        account.status = AccountStatus::Active;
                    }
                    Some(AccountStatus::Inactive) => account.status = AccountStatus::Inactive,
                    Some(_) => {
                        return Err(ServiceError::validation(
                            "status can only be set to active or inactive",
                        ));
                    }
                }
                account.updated_at = now;
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<Account, ServiceError> {
        let account = self.cache.remove(id).await?;
        self.refresh_locks.lock().await.remove(id);
        tracing::info!(account_id = %id, "account deleted");
        Ok(account)
    }

    /// Return a usable access token for the account, refreshing it first if
    /// it is within the skew window.
    ///
    /// Refreshes are single-flight per account: concurrent callers for the
    /// same account wait on the one in-progress refresh and observe its
    /// outcome; other accounts are unaffected.
    pub async fn get_valid_token(&self, account_id: &str) -> Result<String, ServiceError> {
        let account = self.get(account_id).await?;
        if !account.needs_refresh(Utc::now()) {
            return Ok(account.access_token);
        }

        let lock = self.refresh_lock(account_id).await;
        let _guard = lock.lock().await;

        // Re-check under the account's refresh lock: a peer may have finished
        // (or failed) while we waited.
        let account = self.get(account_id).await?;
        let now = Utc::now();
        if !account.needs_refresh(now) {
            return Ok(account.access_token);
        }
        match account.status {
            AccountStatus::Invalid => {
                return Err(ServiceError::upstream_invalid_auth(format!(
                    "account refresh token is invalid: {}",
                    account.last_refresh_error
                )));
            }
            AccountStatus::RateLimited if !account.is_available_for_proxy(now) => {
                return Err(ServiceError::upstream_rate_limited(
                    "account is rate limited by the token endpoint",
                ));
            }
            _ => {}
        }

        self.refresh_account(&account).await
    }

    /// The lock entry lives as long as the account does. Dropping it after a
    /// failed refresh would let a waiter on the old mutex race a newcomer on
    /// a fresh one.
    async fn refresh_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(locks.entry(account_id.to_owned()).or_default())
    }

    async fn refresh_account(&self, account: &Account) -> Result<String, ServiceError> {
        match self
            .oauth
            .refresh_with_retries(&account.refresh_token, self.max_retries, self.retry_delay)
            .await
        {
            Ok(token) => {
                let now = Utc::now();
                let updated = self
                    .cache
                    .update_with(&account.id, |a| {
                        a.update_tokens(
                            token.access_token.clone(),
                            token.refresh_token.clone(),
                            token.expires_in,
                            now,
                        );
                        Ok(())
                    })
                    .await?;
                tracing::info!(account_id = %account.id, "access token refreshed");
                Ok(updated.access_token)
            }
            Err(e) => {
                self.record_refresh_failure(&account.id, &e).await;
                Err(classify_oauth_error(&e, "token refresh failed"))
            }
        }
    }

    /// Apply the state transition for a failed refresh.
    async fn record_refresh_failure(&self, account_id: &str, err: &OAuthError) {
        let now = Utc::now();
        let res = self
            .cache
            .update_with(account_id, |account| {
                match err {
                    OAuthError::RateLimited { retry_after, body } => {
                        let backoff_secs = retry_after
                            .map(|d| d.as_secs() as i64)
                            .unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF_SECS);
                        let until = now + Duration::seconds(backoff_secs);
                        account.mark_rate_limited(until, clip(body), now);
                    }
                    OAuthError::InvalidGrant { body, .. } => {
                        account.mark_invalid(clip(body), now);
                    }
                    // Transient: record the error, leave status alone. The
                    // scheduler's next tick retries.
                    other => {
                        account.last_refresh_error = clip(&other.to_string());
                        account.updated_at = now;
                    }
                }
                Ok(())
            })
            .await;
        match res {
            Ok(account) => tracing::warn!(
                account_id,
                status = ?account.status,
                err = %err,
                "token refresh failed"
            ),
            Err(e) => tracing::warn!(account_id, err = %e, "refresh failure not recorded"),
        }
    }

    /// Scheduler entry: refresh every active account that is near expiry.
    pub async fn refresh_all_accounts(&self) -> RefreshSummary {
        let now = Utc::now();
        let mut summary = RefreshSummary::default();
        for account in self.cache.list().await {
            if account.status != AccountStatus::Active || !account.needs_refresh(now) {
                summary.skipped += 1;
                continue;
            }
            match self.get_valid_token(&account.id).await {
                Ok(_) => summary.refreshed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(account_id = %account.id, err = %e, "scheduled refresh failed");
                }
            }
        }
        summary
    }

    /// Transition every account whose rate-limit window has elapsed back to
    /// active; returns how many recovered.
    pub async fn recover_rate_limited_accounts(&self) -> usize {
        let now = Utc::now();
        let mut recovered = 0;
        for account in self.cache.list().await {
            if account.status != AccountStatus::RateLimited
                || !account.rate_limited_until.is_some_and(|until| until <= now)
            {
                continue;
            }
            let res = self
                .cache
                .update_with(&account.id, |a| {
                    // Re-check inside the lock; a refresh may have raced us.
                    if a.status == AccountStatus::RateLimited
                        && a.rate_limited_until.is_some_and(|until| until <= now)
                    {
                        a.recover_from_rate_limit(now);
                    }
                    Ok(())
                })
                .await;
            match res {
                Ok(_) => {
                    recovered += 1;
                    tracing::info!(account_id = %account.id, "account recovered from rate limit");
                }
                Err(e) => tracing::warn!(account_id = %account.id, err = %e, "recovery failed"),
            }
        }
        recovered
    }

    pub async fn statistics(&self) -> AccountStatistics {
        let now = Utc::now();
        let accounts = self.cache.list().await;

        let mut stats = AccountStatistics {
            total: accounts.len(),
            active: 0,
            inactive: 0,
            rate_limited: 0,
            invalid: 0,
            needs_refresh: 0,
            oldest_expiry_age_hours: None,
            system_health: SystemHealth::Unhealthy,
        };
        let mut oldest_expiry: Option<DateTime<Utc>> = None;
        for account in &accounts {
            match account.status {
                AccountStatus::Active => stats.active += 1,
                AccountStatus::Inactive => stats.inactive += 1,
                AccountStatus::RateLimited => stats.rate_limited += 1,
                AccountStatus::Invalid => stats.invalid += 1,
            }
            if account.needs_refresh(now) {
                stats.needs_refresh += 1;
            }
            if oldest_expiry.is_none_or(|oldest| account.expires_at < oldest) {
                oldest_expiry = Some(account.expires_at);
            }
        }
        stats.oldest_expiry_age_hours = oldest_expiry.map(|e| (now - e).num_hours().max(0));
        stats.system_health = match stats.active {
            0 => SystemHealth::Unhealthy,
            1 => SystemHealth::Degraded,
            _ => SystemHealth::Healthy,
        };
        stats
    }

    /// Snapshot the collection to disk.
    pub async fn sync(&self) -> anyhow::Result<()> {
        let accounts = self.cache.list().await;
        self.store.save_accounts(&accounts)
    }

    /// Best-effort shutdown flush; never fails the caller.
    pub async fn final_sync(&self) {
        if let Err(e) = self.sync().await {
            tracing::warn!(err = %e, "final account snapshot failed");
        }
    }
}

/// Map a token endpoint error onto the API taxonomy.
fn classify_oauth_error(err: &OAuthError, context: &str) -> ServiceError {
    match err {
        OAuthError::RateLimited { .. } => {
            ServiceError::upstream_rate_limited(format!("{context}: rate limited"))
                .with_details(err.to_string())
        }
        OAuthError::InvalidGrant { .. } => {
            ServiceError::upstream_invalid_auth(format!("{context}: grant rejected"))
                .with_details(err.to_string())
        }
        _ => ServiceError::internal(context).with_details(err.to_string()),
    }
}

fn clip(msg: &str) -> String {
    if msg.len() <= ERROR_CLIP_LEN {
        msg.to_owned()
    } else {
        let mut end = ERROR_CLIP_LEN;
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        msg[..end].to_owned()
    }
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
