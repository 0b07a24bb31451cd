// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable token persistence: load/save to a JSON file with atomic writes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::token::{ProviderKind, TokenSet};

/// Persisted slots for one provider: access/id/refresh tokens plus expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: String,
    pub refresh_token: String,
    /// Expiry as epoch milliseconds.
    #[serde(default)]
    pub expires_at: u64,
}

/// On-disk shape: one entry per provider name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedTokens {
    providers: HashMap<ProviderKind, StoredTokens>,
}

/// Durable backing store for credential state, one slot set per provider.
/// Written only by the token refresh service.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join("tokens.json") }
    }

    /// Read the stored slots for one provider. Missing file reads as empty.
    pub fn get(&self, provider: ProviderKind) -> Option<StoredTokens> {
        self.read_all().providers.remove(&provider)
    }

    /// Whether the provider has session evidence: a non-empty refresh token.
    pub fn has_session(&self, provider: ProviderKind) -> bool {
        self.get(provider).is_some_and(|t| !t.refresh_token.is_empty())
    }

    /// Overwrite the provider's slots with a fresh token set.
    pub fn put(&self, tokens: &TokenSet) -> anyhow::Result<()> {
        let mut all = self.read_all();
        all.providers.insert(
            tokens.provider,
            StoredTokens {
                access_token: tokens.access_token.clone(),
                id_token: tokens.id_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
                expires_at: tokens.expires_at,
            },
        );
        self.write_all(&all)
    }

    /// Drop one provider's slots.
    pub fn clear(&self, provider: ProviderKind) -> anyhow::Result<()> {
        let mut all = self.read_all();
        if all.providers.remove(&provider).is_some() {
            self.write_all(&all)?;
        }
        Ok(())
    }

    /// Drop all stored credentials (sign-out).
    pub fn clear_all(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn read_all(&self) -> PersistedTokens {
        let Ok(contents) = std::fs::read_to_string(&self.path) else {
            return PersistedTokens::default();
        };
        match serde_json::from_str(&contents) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "corrupt token store, starting empty");
                PersistedTokens::default()
            }
        }
    }

    /// Atomic save: write tmp + rename. Unique temp filename (PID + counter)
    /// so concurrent saves never race on the same `.tmp` file.
    fn write_all(&self, persisted: &PersistedTokens) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(persisted)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
