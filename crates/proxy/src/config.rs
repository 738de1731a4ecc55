// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::oauth::OAuthConfig;

/// Configuration for the pool proxy.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "poolproxy", about = "Multi-account OAuth pool proxy for an upstream LLM API")]
pub struct ProxyConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "POOLPROXY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "POOLPROXY_PORT")]
    pub port: u16,

    /// Inbound request deadline in seconds. LLM calls are long.
    #[arg(long, default_value_t = 300, env = "POOLPROXY_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    /// Master admin key for the management API. If unset, admin auth is disabled.
    #[arg(long, env = "POOLPROXY_API_KEY")]
    pub api_key: Option<String>,

    /// OAuth client id used for authorization and refresh.
    #[arg(
        long,
        default_value = "9d1c250a-e61b-44d9-88ed-5944d1962f5e",
        env = "POOLPROXY_OAUTH_CLIENT_ID"
    )]
    pub oauth_client_id: String,

    /// OAuth authorization endpoint.
    #[arg(
        long,
        default_value = "https://claude.ai/oauth/authorize",
        env = "POOLPROXY_OAUTH_AUTHORIZE_URL"
    )]
    pub oauth_authorize_url: String,

    /// OAuth token endpoint.
    #[arg(
        long,
        default_value = "https://console.anthropic.com/v1/oauth/token",
        env = "POOLPROXY_OAUTH_TOKEN_URL"
    )]
    pub oauth_token_url: String,

    /// OAuth redirect URI registered for the client.
    #[arg(
        long,
        default_value = "https://console.anthropic.com/oauth/code/callback",
        env = "POOLPROXY_OAUTH_REDIRECT_URI"
    )]
    pub oauth_redirect_uri: String,

    /// OAuth scopes requested during authorization.
    #[arg(
        long,
        default_value = "org:create_api_key user:profile user:inference",
        env = "POOLPROXY_OAUTH_SCOPE"
    )]
    pub oauth_scope: String,

    /// Upstream API base URL.
    #[arg(long, default_value = "https://api.claude.ai", env = "POOLPROXY_BASE_URL")]
    pub base_url: String,

    /// Folder for JSON snapshots. A leading `~` expands to $HOME.
    #[arg(long, default_value = "~/.claude-proxy/data", env = "POOLPROXY_DATA_FOLDER")]
    pub data_folder: String,

    /// Snapshot sync interval in seconds.
    #[arg(long, default_value_t = 60, env = "POOLPROXY_SYNC_INTERVAL_SECS")]
    pub sync_interval_secs: u64,

    /// Max transient-failure retries for a token refresh.
    #[arg(long, default_value_t = 3, env = "POOLPROXY_MAX_RETRIES")]
    pub max_retries: u32,

    /// Base delay between refresh retries in seconds.
    #[arg(long, default_value_t = 1, env = "POOLPROXY_RETRY_DELAY_SECS")]
    pub retry_delay_secs: u64,

    /// Per-caller session gate.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "POOLPROXY_SESSION_ENABLED"
    )]
    pub session_enabled: bool,

    /// Max concurrent live sessions across the proxy.
    #[arg(long, default_value_t = 3, env = "POOLPROXY_SESSION_MAX_CONCURRENT")]
    pub session_max_concurrent: usize,

    /// Session TTL in seconds.
    #[arg(long, default_value_t = 300, env = "POOLPROXY_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// Expired-session cleanup loop.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "POOLPROXY_SESSION_CLEANUP_ENABLED"
    )]
    pub session_cleanup_enabled: bool,

    /// Session cleanup interval in seconds.
    #[arg(long, default_value_t = 60, env = "POOLPROXY_SESSION_CLEANUP_INTERVAL_SECS")]
    pub session_cleanup_interval_secs: u64,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info", env = "POOLPROXY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[arg(long, default_value = "text", env = "POOLPROXY_LOG_FORMAT")]
    pub log_format: String,
}

impl ProxyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        crate::store::persist::expand_data_folder(&self.data_folder)
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig {
            client_id: self.oauth_client_id.clone(),
            authorize_url: self.oauth_authorize_url.clone(),
            token_url: self.oauth_token_url.clone(),
            redirect_uri: self.oauth_redirect_uri.clone(),
            scope: self.oauth_scope.clone(),
        }
    }
}
