// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token lifecycle: provider abstraction, durable store, and the
//! proactive refresh service.

pub mod provider;
pub mod service;
pub mod store;

use serde::{Deserialize, Serialize};

/// Which identity provider issued a credential set. Exactly one provider
/// is active per session; the two are interchangeable behind
/// [`provider::IdentityProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Firebase,
    Cognito,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Firebase => "firebase",
            Self::Cognito => "cognito",
        }
    }

    /// Fixed priority order for live-session probing.
    pub const PRIORITY: [ProviderKind; 2] = [ProviderKind::Firebase, ProviderKind::Cognito];
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One complete credential set. Overwritten wholesale on every refresh,
/// never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Absolute expiry as epoch milliseconds.
    pub expires_at: u64,
    pub provider: ProviderKind,
}

/// Read-only expiry view for the active provider.
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub provider: ProviderKind,
    pub expires_at: u64,
    /// Milliseconds until expiry (0 if already expired).
    pub time_until_expiry: u64,
    /// Epoch ms of the last successful refresh, if any this process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<u64>,
}

/// Outcome of a refresh attempt, shared by all concurrent callers.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub success: bool,
    pub tokens: Option<TokenSet>,
    pub error: Option<String>,
    /// The refresh credential itself was rejected or absent; the only
    /// way forward is a new sign-in.
    pub needs_reauth: bool,
}

impl RefreshOutcome {
    pub fn ok(tokens: TokenSet) -> Self {
        Self { success: true, tokens: Some(tokens), error: None, needs_reauth: false }
    }

    pub fn failed(error: impl Into<String>, needs_reauth: bool) -> Self {
        Self { success: false, tokens: None, error: Some(error.into()), needs_reauth }
    }
}

/// Internal error type for a single provider refresh call.
#[derive(Debug)]
pub enum RefreshError {
    /// Permanent failure: the refresh credential is invalid or revoked.
    NeedsReauth(String),
    /// Temporary failure: the caller's recovery policy may retry.
    Transient(String),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeedsReauth(msg) => write!(f, "needs reauth: {msg}"),
            Self::Transient(msg) => write!(f, "transient: {msg}"),
        }
    }
}
