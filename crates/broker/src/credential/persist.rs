// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token store: per-account refresh tokens in a JSON file with atomic writes.
//!
//! The file is the source of truth. The in-memory map is only replaced after
//! the file on disk has been rewritten.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::account::normalize;

/// Stored OAuth grant for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

type Records = BTreeMap<String, TokenRecord>;

#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    records: Records,
}

impl TokenStore {
    /// Load the store from `path`.
    ///
    /// A missing or empty file yields an empty store. A file that exists but
    /// cannot be read or parsed is an error.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = read_records(&path)?.unwrap_or_default();
        Ok(Self { path, records })
    }

    /// An empty store that will be written to `path` on first upsert.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), records: Records::new() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, account: &str) -> Option<&TokenRecord> {
        self.records.get(account)
    }

    pub fn contains(&self, account: &str) -> bool {
        self.records.contains_key(account)
    }

    /// Accounts with a stored record, in key order.
    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace one record and rewrite the whole file.
    pub fn upsert(&mut self, account: &str, record: TokenRecord) -> anyhow::Result<()> {
        let mut next = self.records.clone();
        next.insert(account.to_owned(), record);
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create token directory {}", dir.display()))?;
            }
        }
        save(&self.path, &next)?;
        self.records = next;
        Ok(())
    }

    /// Re-read the backing file. Returns `true` when the content changed.
    ///
    /// On error the current snapshot is kept.
    pub fn reload(&mut self) -> anyhow::Result<bool> {
        let records = read_records(&self.path)?.unwrap_or_default();
        if records == self.records {
            return Ok(false);
        }
        self.records = records;
        Ok(true)
    }
}

fn read_records(path: &Path) -> anyhow::Result<Option<Records>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("read token file {}", path.display()));
        }
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let records: Records = serde_json::from_str(&contents)
        .with_context(|| format!("parse token file {}", path.display()))?;
    Ok(Some(records.into_iter().map(|(account, record)| (normalize(&account), record)).collect()))
}

/// Write records to `path` atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never share
/// a `.tmp` file.
fn save(path: &Path, records: &Records) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(records)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("write {}", tmp_path.display()))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e).with_context(|| format!("replace token file {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
