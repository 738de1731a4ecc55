// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;

fn test_service(dir: &tempfile::TempDir, max_concurrent: usize, ttl_secs: u64) -> Arc<SessionService> {
    Arc::new(SessionService::new(
        Arc::new(SessionCache::new()),
        Arc::new(SnapshotStore::new(dir.path().to_path_buf())),
        max_concurrent,
        ttl_secs,
    ))
}

fn meta(ip: &str) -> SessionMetadata {
    SessionMetadata {
        user_agent: "curl/8".into(),
        ip_address: ip.into(),
        request_path: "/v1/messages".into(),
    }
}

#[tokio::test]
async fn session_id_is_deterministic_per_caller() -> anyhow::Result<()> {
    let a = SessionService::derive_session_id("t1", "10.0.0.1", "curl/8");
    let b = SessionService::derive_session_id("t1", "10.0.0.1", "curl/8");
    let c = SessionService::derive_session_id("t1", "10.0.0.2", "curl/8");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
    Ok(())
}

#[tokio::test]
async fn parallel_admissions_respect_the_ceiling() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir, 2, 300);

    let mut handles = Vec::new();
    for i in 0..3 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            svc.create_session("t1", meta(&format!("10.0.0.{i}"))).await
        }));
    }
    let mut ok = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => ok += 1,
            Err(e) => {
                assert_eq!(e.kind, crate::error::ErrorKind::SessionLimitExceeded);
                limited += 1;
            }
        }
    }
    assert_eq!(ok, 2);
    assert_eq!(limited, 1);

    // A slot opens once a session is revoked.
    let held = svc.list().await;
    svc.revoke(&held[0].id).await?;
    assert!(svc.create_session("t2", meta("10.0.1.1")).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn validate_and_refresh_follow_liveness() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir, 3, 300);

    let session = svc.create_session("t1", meta("10.0.0.1")).await?;
    assert!(svc.validate_session(&session.id).await);
    assert!(!svc.validate_session("missing").await);

    let refreshed = svc.refresh_session(&session.id).await?;
    assert!(refreshed.expires_at >= session.expires_at);

    let err = svc.refresh_session("missing").await.unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn admit_request_extends_existing_reservation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // Ceiling of 1: reuse must not consume a second slot.
    let svc = test_service(&dir, 1, 300);

    let first = svc.admit_request("t1", meta("10.0.0.1")).await?;
    let second = svc.admit_request("t1", meta("10.0.0.1")).await?;
    assert_eq!(first.id, second.id);
    assert!(second.expires_at >= first.expires_at);
    assert_eq!(svc.list().await.len(), 1);

    // A different caller is a different session and hits the ceiling.
    let err = svc.admit_request("t1", meta("10.0.0.2")).await.unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::SessionLimitExceeded);
    Ok(())
}

#[tokio::test]
async fn expired_sessions_free_their_slots() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    // Zero TTL: sessions are born expired.
    let svc = test_service(&dir, 1, 0);

    svc.create_session("t1", meta("10.0.0.1")).await?;
    // The expired reservation is swept during the next admission.
    assert!(svc.create_session("t1", meta("10.0.0.2")).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn cleanup_reports_and_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir, 10, 0);
    svc.create_session("t1", meta("10.0.0.1")).await?;
    // The second admission already sweeps the first born-expired session.
    svc.create_session("t1", meta("10.0.0.2")).await?;

    assert_eq!(svc.cleanup_expired().await, 1);
    assert_eq!(svc.cleanup_expired().await, 0);
    assert!(svc.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn statistics_count_live_sessions_per_token() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir, 10, 300);
    svc.create_session("t1", meta("10.0.0.1")).await?;
    svc.create_session("t1", meta("10.0.0.2")).await?;
    svc.create_session("t2", meta("10.0.0.3")).await?;

    let stats = svc.statistics().await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.active, 3);
    assert_eq!(stats.per_token.get("t1"), Some(&2));
    assert_eq!(stats.per_token.get("t2"), Some(&1));

    assert_eq!(svc.sessions_for_token("t1").await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn sync_and_load_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir, 10, 300);
    let session = svc.create_session("t1", meta("10.0.0.1")).await?;
    svc.sync().await?;

    let svc2 = test_service(&dir, 10, 300);
    assert_eq!(svc2.load().await?, 1);
    assert_eq!(svc2.get(&session.id).await?, session);
    Ok(())
}
