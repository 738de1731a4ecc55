// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{Duration, Utc};

use super::*;

fn test_session(ttl_secs: i64) -> Session {
    Session::new(
        "s1".into(),
        "t1".into(),
        "curl/8".into(),
        "10.0.0.1".into(),
        "/v1/messages".into(),
        Duration::seconds(ttl_secs),
        Utc::now(),
    )
}

#[test]
fn new_session_is_live_until_ttl() -> anyhow::Result<()> {
    let s = test_session(300);
    assert!(s.is_live(s.created_at));
    assert!(s.is_live(s.expires_at - Duration::seconds(1)));
    assert!(!s.is_live(s.expires_at));
    assert!(s.is_expired(s.expires_at));
    Ok(())
}

#[test]
fn inactive_session_is_not_live_even_before_expiry() -> anyhow::Result<()> {
    let mut s = test_session(300);
    s.is_active = false;
    assert!(!s.is_live(s.created_at));
    assert!(!s.is_expired(s.created_at));
    Ok(())
}

#[test]
fn touch_extends_expiry() -> anyhow::Result<()> {
    let mut s = test_session(300);
    let later = s.created_at + Duration::seconds(200);
    s.touch(Duration::seconds(300), later);
    assert_eq!(s.last_seen_at, later);
    assert_eq!(s.expires_at, later + Duration::seconds(300));
    Ok(())
}

#[test]
fn serde_round_trip() -> anyhow::Result<()> {
    let s = test_session(300);
    let json = serde_json::to_string(&s)?;
    let back: Session = serde_json::from_str(&json)?;
    assert_eq!(back, s);
    Ok(())
}
