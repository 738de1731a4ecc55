// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upstream OAuth account: one principal in the pool.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{time_format, time_format_opt};

/// Access tokens are treated as stale this long before their actual expiry.
pub const REFRESH_SKEW_SECS: i64 = 60;

/// Health state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    RateLimited,
    Invalid,
}

/// One upstream OAuth principal owned by the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub organization_uuid: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time_format")]
    pub expires_at: DateTime<Utc>,
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time_format_opt")]
    pub rate_limited_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_refresh_error: String,
    #[serde(with = "time_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "time_format")]
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        name: String,
        organization_uuid: String,
        access_token: String,
        refresh_token: String,
        expires_in: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            organization_uuid,
            access_token,
            refresh_token,
            expires_at: now + Duration::seconds(expires_in as i64),
            status: AccountStatus::Active,
            rate_limited_until: None,
            last_refresh_error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The access token is past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The access token is within the refresh skew of its expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at - Duration::seconds(REFRESH_SKEW_SECS)
    }

    /// Eligible to serve a proxied request: active, or rate-limited with the
    /// backoff window already elapsed.
    pub fn is_available_for_proxy(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            AccountStatus::Active => true,
            AccountStatus::RateLimited => {
                self.rate_limited_until.is_some_and(|until| until <= now)
            }
            AccountStatus::Inactive | AccountStatus::Invalid => false,
        }
    }

    /// Apply a successful refresh outcome.
    pub fn update_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: u64,
        now: DateTime<Utc>,
    ) {
        self.access_token = access_token;
        if let Some(rt) = refresh_token {
            self.refresh_token = rt;
        }
        // expires_at never moves backwards on a successful refresh.
        let new_expiry = now + Duration::seconds(expires_in as i64);
        if new_expiry > self.expires_at {
            self.expires_at = new_expiry;
        }
        self.status = AccountStatus::Active;
        self.rate_limited_until = None;
        self.last_refresh_error.clear();
        self.updated_at = now;
    }

    pub fn mark_rate_limited(
        &mut self,
        until: DateTime<Utc>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.status = AccountStatus::RateLimited;
        self.rate_limited_until = Some(until);
        self.last_refresh_error = message.into();
        self.updated_at = now;
    }

    pub fn mark_invalid(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = AccountStatus::Invalid;
        self.rate_limited_until = None;
        self.last_refresh_error = message.into();
        self.updated_at = now;
    }

    pub fn recover_from_rate_limit(&mut self, now: DateTime<Utc>) {
        self.status = AccountStatus::Active;
        self.rate_limited_until = None;
        self.last_refresh_error.clear();
        self.updated_at = now;
    }
}

#[cfg(test)]
#[path = "account_tests.rs"]
mod tests;
