// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-lived concurrency reservation for one caller.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::time_format;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub token_id: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(with = "time_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "time_format")]
    pub last_seen_at: DateTime<Utc>,
    #[serde(with = "time_format")]
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub request_path: String,
}

impl Session {
    pub fn new(
        id: String,
        token_id: String,
        user_agent: String,
        ip_address: String,
        request_path: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            token_id,
            user_agent,
            ip_address,
            created_at: now,
            last_seen_at: now,
            expires_at: now + ttl,
            is_active: true,
            request_path,
        }
    }

    /// Expired regardless of `is_active`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Counts against the admission ceiling.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }

    /// Extend the reservation on reuse.
    pub fn touch(&mut self, ttl: Duration, now: DateTime<Utc>) {
        self.last_seen_at = now;
        self.expires_at = now + ttl;
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
