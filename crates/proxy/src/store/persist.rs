// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON snapshot persistence with atomic writes.
//!
//! Each collection is one array file under the data folder. Snapshots hold
//! refresh tokens, so files are 0600 in a 0700 folder.

use std::fs;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{Account, ApiToken, Session};

pub const ACCOUNTS_FILE: &str = "accounts.json";
pub const TOKENS_FILE: &str = "tokens.json";
pub const SESSIONS_FILE: &str = "sessions.json";

/// Expand a leading `~` to the current user's home directory.
pub fn expand_data_folder(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home);
        }
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Create the data folder if needed and clamp its permissions.
pub fn ensure_data_folder(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

/// Load a collection; a missing file is an empty collection.
pub fn load_collection<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&contents)?)
}

/// Save a collection atomically: serialize, write a 0600 tmp file, fsync,
/// rename over the target.
pub fn save_collection<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(items)?;
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Entities addressable by id within a snapshot file.
pub trait Persistable: Serialize + DeserializeOwned + Clone {
    fn entity_id(&self) -> &str;
}

impl Persistable for Account {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Persistable for ApiToken {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

impl Persistable for Session {
    fn entity_id(&self) -> &str {
        &self.id
    }
}

/// Insert or replace one item in a snapshot file. The engine prefers bulk
/// snapshots; this exists for targeted writes outside the sync loop.
pub fn upsert_item<T: Persistable>(path: &Path, item: &T) -> anyhow::Result<()> {
    let mut items: Vec<T> = load_collection(path)?;
    match items.iter_mut().find(|i| i.entity_id() == item.entity_id()) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
    save_collection(path, &items)
}

/// Remove one item from a snapshot file; returns whether it was present.
pub fn remove_item<T: Persistable>(path: &Path, id: &str) -> anyhow::Result<bool> {
    let mut items: Vec<T> = load_collection(path)?;
    let before = items.len();
    items.retain(|i| i.entity_id() != id);
    if items.len() == before {
        return Ok(false);
    }
    save_collection(path, &items)?;
    Ok(true)
}

/// Typed access to the three snapshot files of a data folder.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.dir.join(ACCOUNTS_FILE)
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.dir.join(TOKENS_FILE)
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.dir.join(SESSIONS_FILE)
    }

    pub fn load_accounts(&self) -> anyhow::Result<Vec<Account>> {
        load_collection(&self.accounts_path())
    }

    pub fn save_accounts(&self, accounts: &[Account]) -> anyhow::Result<()> {
        save_collection(&self.accounts_path(), accounts)
    }

    pub fn load_tokens(&self) -> anyhow::Result<Vec<ApiToken>> {
        load_collection(&self.tokens_path())
    }

    pub fn save_tokens(&self, tokens: &[ApiToken]) -> anyhow::Result<()> {
        save_collection(&self.tokens_path(), tokens)
    }

    pub fn load_sessions(&self) -> anyhow::Result<Vec<Session>> {
        load_collection(&self.sessions_path())
    }

    pub fn save_sessions(&self, sessions: &[Session]) -> anyhow::Result<()> {
        save_collection(&self.sessions_path(), sessions)
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
