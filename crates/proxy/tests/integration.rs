// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: provisioning, admission, selection under staleness.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use axum_test::TestServer;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use poolproxy::config::ProxyConfig;
use poolproxy::model::{Account, TokenRole};
use poolproxy::oauth::{pkce, OAuthClient};
use poolproxy::service::{AccountService, ProxyService, SessionService, TokenService};
use poolproxy::state::AppState;
use poolproxy::store::{AccountCache, SessionCache, SnapshotStore, TokenCache};
use poolproxy::transport::build_router;

fn test_config(data_folder: String) -> ProxyConfig {
    ProxyConfig {
        host: "127.0.0.1".into(),
        port: 0,
        request_timeout_secs: 5,
        api_key: None,
        oauth_client_id: "client-123".into(),
        oauth_authorize_url: "https://auth.example/authorize".into(),
        oauth_token_url: "http://127.0.0.1:9/token".into(),
        oauth_redirect_uri: "https://auth.example/callback".into(),
        oauth_scope: "user:inference".into(),
        base_url: "http://127.0.0.1:9".into(),
        data_folder,
        sync_interval_secs: 60,
        max_retries: 0,
        retry_delay_secs: 1,
        session_enabled: true,
        session_max_concurrent: 3,
        session_ttl_secs: 300,
        session_cleanup_enabled: true,
        session_cleanup_interval_secs: 60,
        log_level: "info".into(),
        log_format: "text".into(),
    }
}

struct TestEnv {
    state: Arc<AppState>,
    account_cache: Arc<AccountCache>,
    _dir: tempfile::TempDir,
}

fn build_env(mutate: impl FnOnce(&mut ProxyConfig)) -> TestEnv {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path().to_string_lossy().into_owned());
    mutate(&mut config);

    let snapshots = Arc::new(SnapshotStore::new(config.data_dir()));
    let oauth = Arc::new(OAuthClient::new(config.oauth_config()));
    let account_cache = Arc::new(AccountCache::new());

    let tokens = Arc::new(TokenService::new(Arc::new(TokenCache::new()), Arc::clone(&snapshots)));
    let accounts = Arc::new(AccountService::new(
        Arc::clone(&account_cache),
        Arc::clone(&snapshots),
        oauth,
        config.base_url.clone(),
        config.max_retries,
        config.retry_delay(),
    ));
    let sessions = Arc::new(SessionService::new(
        Arc::new(SessionCache::new()),
        snapshots,
        config.session_max_concurrent,
        config.session_ttl_secs,
    ));
    let proxy = ProxyService::new(
        Arc::clone(&accounts),
        config.base_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    );

    let state = Arc::new(AppState {
        config,
        tokens,
        accounts,
        sessions,
        proxy,
        shutdown: CancellationToken::new(),
    });
    TestEnv { state, account_cache, _dir: dir }
}

async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Account provisioning from an empty pool: authorize, exchange, one active
/// account holding the exchanged tokens.
#[tokio::test]
async fn provisioning_round_trip() -> anyhow::Result<()> {
    let mock = spawn_upstream(
        Router::new()
            .route(
                "/token",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(body["grant_type"], "authorization_code");
                    assert_eq!(body["code"], "C");
                    assert_eq!(body["state"], "S");
                    assert!(!body["code_verifier"].as_str().unwrap_or_default().is_empty());
                    Json(serde_json::json!({
                        "access_token": "a1",
                        "refresh_token": "r1",
                        "token_type": "Bearer",
                        "expires_in": 3600
                    }))
                }),
            )
            .route(
                "/api/organizations",
                get(|| async { Json(serde_json::json!([{"uuid": "org-7"}])) }),
            ),
    )
    .await;

    let env = build_env(|c| {
        c.oauth_token_url = format!("{mock}/token");
        c.base_url = mock.clone();
    });
    let server = TestServer::new(build_router(Arc::clone(&env.state)))?;

    let authorize = server.get("/oauth/authorize").await;
    authorize.assert_status_ok();
    let flow: serde_json::Value = authorize.json();
    let verifier = flow["code_verifier"].as_str().unwrap().to_owned();
    // The URL embeds the S256 challenge of the returned verifier.
    assert!(flow["authorization_url"]
        .as_str()
        .unwrap()
        .contains(&pkce::compute_code_challenge(&verifier)));

    let before = Utc::now();
    let exchanged = server
        .post("/oauth/exchange")
        .json(&serde_json::json!({
            "name": "work",
            "code": "C#S",
            "state": flow["state"],
            "code_verifier": verifier,
        }))
        .await;
    exchanged.assert_status_ok();
    let account: serde_json::Value = exchanged.json();
    assert_eq!(account["status"], "active");
    assert_eq!(account["organization_uuid"], "org-7");

    let pool = env.state.accounts.list().await;
    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].access_token, "a1");
    assert_eq!(pool[0].refresh_token, "r1");
    assert!(pool[0].expires_at >= before + chrono::Duration::seconds(3595));
    assert!(pool[0].expires_at <= Utc::now() + chrono::Duration::seconds(3600));
    Ok(())
}

/// Session overflow: with a ceiling of 2, a third concurrent caller is
/// rejected; once reservations expire, admission opens up again.
#[tokio::test]
async fn session_overflow_and_expiry() -> anyhow::Result<()> {
    let upstream = spawn_upstream(Router::new().route(
        "/v1/messages",
        post(|| async { Json(serde_json::json!({"ok": true})) }),
    ))
    .await;

    let env = build_env(|c| {
        c.base_url = upstream;
        c.session_max_concurrent = 2;
        c.session_ttl_secs = 1;
    });
    let token = env.state.tokens.create("ci".into(), TokenRole::User).await?;
    env.account_cache
        .insert(Account::new("a".into(), String::new(), "at".into(), "rt".into(), 3600, Utc::now()))
        .await?;

    let server = TestServer::new(build_router(Arc::clone(&env.state)))?;

    let request = |ip: &str| {
        server
            .post("/v1/messages")
            .add_header("x-api-key", token.key.clone())
            .add_header("x-forwarded-for", ip.to_owned())
            .json(&serde_json::json!({"model": "m"}))
    };
    let (r1, r2, r3) = tokio::join!(
        request("10.0.0.1").into_future(),
        request("10.0.0.2").into_future(),
        request("10.0.0.3").into_future(),
    );

    let mut codes: Vec<u16> = [&r1, &r2, &r3].iter().map(|r| r.status_code().as_u16()).collect();
    codes.sort_unstable();
    assert_eq!(codes, vec![200, 200, 429]);

    // Same caller re-using its reservation is not an overflow.
    let reused = request("10.0.0.1").await;
    reused.assert_status_ok();

    // After the TTL elapses the expired reservations are swept on admission.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let fourth = request("10.0.0.4").await;
    fourth.assert_status_ok();
    Ok(())
}

/// Selection under staleness: every request rides the fresh account; once it
/// is gone, the stale one is refreshed and takes over.
#[tokio::test]
async fn selection_prefers_fresh_then_falls_back() -> anyhow::Result<()> {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));

    let record = Arc::clone(&seen);
    let mock = spawn_upstream(
        Router::new()
            .route(
                "/v1/messages",
                post(move |headers: axum::http::HeaderMap| {
                    let record = Arc::clone(&record);
                    async move {
                        let bearer = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_owned();
                        record.lock().await.push(bearer);
                        Json(serde_json::json!({"ok": true}))
                    }
                }),
            )
            .route(
                "/token",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(body["refresh_token"], "rt-b");
                    Json(serde_json::json!({
                        "access_token": "at-b2",
                        "refresh_token": "rt-b2",
                        "expires_in": 3600
                    }))
                }),
            ),
    )
    .await;

    let env = build_env(|c| {
        c.base_url = mock.clone();
        c.oauth_token_url = format!("{mock}/token");
        c.session_enabled = false;
    });
    let token = env.state.tokens.create("ci".into(), TokenRole::User).await?;

    let fresh =
        Account::new("a".into(), String::new(), "at-a".into(), "rt-a".into(), 3600, Utc::now());
    let mut stale =
        Account::new("b".into(), String::new(), "at-b".into(), "rt-b".into(), 3600, Utc::now());
    stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
    env.account_cache.insert(fresh.clone()).await?;
    env.account_cache.insert(stale.clone()).await?;

    let server = TestServer::new(build_router(Arc::clone(&env.state)))?;

    for _ in 0..10 {
        server
            .post("/v1/messages")
            .add_header("x-api-key", token.key.clone())
            .json(&serde_json::json!({"model": "m"}))
            .await
            .assert_status_ok();
    }
    assert!(seen.lock().await.iter().all(|b| b == "Bearer at-a"));

    // Remove the fresh account; the stale one is refreshed and used.
    env.account_cache.remove(&fresh.id).await?;
    server
        .post("/v1/messages")
        .add_header("x-api-key", token.key.clone())
        .json(&serde_json::json!({"model": "m"}))
        .await
        .assert_status_ok();
    assert_eq!(seen.lock().await.last().map(String::as_str), Some("Bearer at-b2"));

    let refreshed = env.account_cache.get(&stale.id).await.unwrap();
    assert_eq!(refreshed.access_token, "at-b2");
    assert!(!refreshed.needs_refresh(Utc::now()));
    Ok(())
}

/// Cold persistence: snapshots written by one process generation are the
/// authoritative state of the next.
#[tokio::test]
async fn snapshots_survive_a_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let folder = dir.path().to_string_lossy().into_owned();

    let env = build_env(|c| c.data_folder = folder.clone());
    let token = env.state.tokens.create("ci".into(), TokenRole::User).await?;
    env.account_cache
        .insert(Account::new("a".into(), String::new(), "at".into(), "rt".into(), 3600, Utc::now()))
        .await?;
    env.state.tokens.final_sync().await;
    env.state.accounts.final_sync().await;
    env.state.sessions.final_sync().await;

    let env2 = build_env(|c| c.data_folder = folder);
    assert_eq!(env2.state.tokens.load().await?, 1);
    assert_eq!(env2.state.accounts.load().await?, 1);
    assert_eq!(env2.state.sessions.load().await?, 0);
    assert_eq!(env2.state.tokens.get(&token.id).await?.key, token.key);
    Ok(())
}
