// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing API credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{time_format, time_format_opt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Inactive,
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    User,
    Admin,
}

/// A caller-facing credential validated at the proxy's edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: String,
    pub name: String,
    pub key: String,
    pub status: TokenStatus,
    pub role: TokenRole,
    #[serde(with = "time_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "time_format")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "time_format_opt")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    pub fn new(name: String, key: String, role: TokenRole, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            key,
            status: TokenStatus::Active,
            role,
            created_at: now,
            updated_at: now,
            usage_count: 0,
            last_used_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TokenStatus::Active
    }

    /// Bump usage counters after a successful validation.
    pub fn record_use(&mut self, now: DateTime<Utc>) {
        self.usage_count += 1;
        self.last_used_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
