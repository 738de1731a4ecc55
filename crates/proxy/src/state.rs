// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ProxyConfig;
use crate::service::{AccountService, ProxyService, SessionService, TokenService};

/// Shared proxy state, built once at boot in dependency order.
pub struct AppState {
    pub config: ProxyConfig,
    pub tokens: Arc<TokenService>,
    pub accounts: Arc<AccountService>,
    pub sessions: Arc<SessionService>,
    pub proxy: ProxyService,
    pub shutdown: CancellationToken,
}
