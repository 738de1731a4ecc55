// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::error::ErrorKind;
use crate::store::TokenCache;

fn test_service(dir: &tempfile::TempDir) -> TokenService {
    let store = Arc::new(SnapshotStore::new(dir.path().to_path_buf()));
    TokenService::new(Arc::new(TokenCache::new()), store)
}

#[tokio::test]
async fn create_generates_prefixed_key() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir);

    let tok = svc.create("ci".into(), TokenRole::User).await?;
    assert!(tok.key.starts_with("sk-proxy-"));
    assert!(tok.is_active());

    let other = svc.create("ci-2".into(), TokenRole::User).await?;
    assert_ne!(tok.key, other.key);
    Ok(())
}

#[tokio::test]
async fn create_rejects_duplicate_name() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir);
    svc.create("ci".into(), TokenRole::User).await?;

    let err = svc.create("ci".into(), TokenRole::User).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    Ok(())
}

#[tokio::test]
async fn create_rejects_empty_name() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir);
    let err = svc.create("  ".into(), TokenRole::User).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    Ok(())
}

#[tokio::test]
async fn validate_bumps_usage_and_rejects_inactive() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir);
    let tok = svc.create("ci".into(), TokenRole::User).await?;

    let validated = svc.validate(&tok.key).await?;
    assert_eq!(validated.usage_count, 1);
    assert!(validated.last_used_at.is_some());

    svc.update(&tok.id, TokenUpdate { status: Some(TokenStatus::Inactive), ..Default::default() })
        .await?;
    let err = svc.validate(&tok.key).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);

    let err = svc.validate("sk-proxy-nope").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);
    Ok(())
}

#[tokio::test]
async fn revoked_is_terminal() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir);
    let tok = svc.create("ci".into(), TokenRole::User).await?;

    svc.update(&tok.id, TokenUpdate { status: Some(TokenStatus::Revoked), ..Default::default() })
        .await?;

    let err = svc
        .update(&tok.id, TokenUpdate { status: Some(TokenStatus::Active), ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    // Renaming a revoked token without touching status is still allowed.
    let renamed = svc
        .update(&tok.id, TokenUpdate { name: Some("old-ci".into()), ..Default::default() })
        .await?;
    assert_eq!(renamed.name, "old-ci");
    assert_eq!(renamed.status, TokenStatus::Revoked);
    Ok(())
}

#[tokio::test]
async fn sync_and_load_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir);
    let tok = svc.create("ci".into(), TokenRole::Admin).await?;
    svc.validate(&tok.key).await?;
    svc.sync().await?;

    // A fresh service over the same folder sees the persisted state.
    let svc2 = test_service(&dir);
    assert_eq!(svc2.load().await?, 1);
    let loaded = svc2.get(&tok.id).await?;
    assert_eq!(loaded.usage_count, 1);
    assert_eq!(loaded.role, TokenRole::Admin);
    Ok(())
}

#[tokio::test]
async fn delete_removes_token() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let svc = test_service(&dir);
    let tok = svc.create("ci".into(), TokenRole::User).await?;

    svc.delete(&tok.id).await?;
    let err = svc.get(&tok.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = svc.delete(&tok.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    Ok(())
}
