// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity-provider abstraction and the two concrete providers.
//!
//! The refresh service is provider-ambivalent: it talks to whichever
//! [`IdentityProvider`] has live session evidence and never branches on
//! the concrete provider itself.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::epoch_ms;
use crate::token::store::{StoredTokens, TokenStore};
use crate::token::{ProviderKind, RefreshError, TokenSet};

/// One identity provider: exchanges a stored refresh credential for a
/// fresh token set.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Nominal lifetime of tokens this provider issues.
    fn token_lifetime(&self) -> Duration;

    /// Exchange the stored refresh token for a new token set.
    async fn refresh(&self, stored: &StoredTokens) -> Result<TokenSet, RefreshError>;

    /// Whether this provider has live session evidence in the store.
    fn has_active_session(&self, store: &TokenStore) -> bool {
        store.has_session(self.kind())
    }
}

// ── Firebase ──────────────────────────────────────────────────────────

/// Primary provider: Firebase secure-token exchange.
pub struct FirebaseProvider {
    token_url: String,
    api_key: String,
    lifetime: Duration,
    http: reqwest::Client,
}

/// Secure-token endpoint response. `expires_in` arrives as a string.
#[derive(Debug, Deserialize)]
struct FirebaseTokenResponse {
    access_token: String,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorResponse {
    error: FirebaseErrorBody,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorBody {
    #[serde(default)]
    message: String,
}

impl FirebaseProvider {
    pub fn new(token_url: String, api_key: String, lifetime: Duration, http: reqwest::Client) -> Self {
        Self { token_url, api_key, lifetime, http }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Firebase
    }

    fn token_lifetime(&self) -> Duration {
        self.lifetime
    }

    async fn refresh(&self, stored: &StoredTokens) -> Result<TokenSet, RefreshError> {
        if stored.refresh_token.is_empty() {
            return Err(RefreshError::NeedsReauth("no refresh token available".into()));
        }

        let url = format!("{}?key={}", self.token_url, self.api_key);
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", stored.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Transient(format!("HTTP error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            // The secure-token endpoint reports credential problems as 400
            // with a machine-readable message.
            if let Ok(err) = serde_json::from_str::<FirebaseErrorResponse>(&body) {
                let code = err.error.message;
                if matches!(
                    code.as_str(),
                    "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_DISABLED" | "USER_NOT_FOUND"
                ) {
                    return Err(RefreshError::NeedsReauth(code));
                }
                return Err(RefreshError::Transient(format!("{status}: {code}")));
            }
            if status.is_client_error() {
                return Err(RefreshError::NeedsReauth(format!("refresh rejected ({status})")));
            }
            return Err(RefreshError::Transient(format!("refresh failed ({status}): {body}")));
        }

        let token: FirebaseTokenResponse = resp
            .json()
            .await
            .map_err(|e| RefreshError::Transient(format!("parse response: {e}")))?;
        let expires_in = token.expires_in.parse::<u64>().unwrap_or(self.lifetime.as_secs());

        Ok(TokenSet {
            access_token: token.access_token,
            id_token: token.id_token,
            refresh_token: token.refresh_token,
            expires_at: epoch_ms() + expires_in * 1000,
            provider: ProviderKind::Firebase,
        })
    }
}

// ── Cognito ───────────────────────────────────────────────────────────

/// Secondary provider: Cognito `InitiateAuth` with the refresh-token flow.
pub struct CognitoProvider {
    endpoint: String,
    client_id: String,
    lifetime: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CognitoAuthResponse {
    #[serde(rename = "AuthenticationResult")]
    result: CognitoAuthResult,
}

#[derive(Debug, Deserialize)]
struct CognitoAuthResult {
    #[serde(rename = "AccessToken")]
    access_token: String,
    #[serde(rename = "IdToken")]
    id_token: String,
    #[serde(rename = "ExpiresIn", default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CognitoErrorResponse {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

impl CognitoProvider {
    pub fn new(endpoint: String, client_id: String, lifetime: Duration, http: reqwest::Client) -> Self {
        Self { endpoint, client_id, lifetime, http }
    }
}

#[async_trait]
impl IdentityProvider for CognitoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Cognito
    }

    fn token_lifetime(&self) -> Duration {
        self.lifetime
    }

    async fn refresh(&self, stored: &StoredTokens) -> Result<TokenSet, RefreshError> {
        if stored.refresh_token.is_empty() {
            return Err(RefreshError::NeedsReauth("no refresh token available".into()));
        }

        let body = serde_json::json!({
            "AuthFlow": "REFRESH_TOKEN_AUTH",
            "ClientId": self.client_id,
            "AuthParameters": { "REFRESH_TOKEN": stored.refresh_token },
        });
        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-Amz-Target", "AWSCognitoIdentityProviderService.InitiateAuth")
            .header("Content-Type", "application/x-amz-json-1.1")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| RefreshError::Transient(format!("HTTP error: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RefreshError::Transient(format!("read body: {e}")))?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<CognitoErrorResponse>(&text) {
                if err.kind.contains("NotAuthorizedException") {
                    return Err(RefreshError::NeedsReauth(format!("{}: {}", err.kind, err.message)));
                }
                return Err(RefreshError::Transient(format!("{}: {}", err.kind, err.message)));
            }
            if status.is_client_error() {
                return Err(RefreshError::NeedsReauth(format!("refresh rejected ({status})")));
            }
            return Err(RefreshError::Transient(format!("refresh failed ({status}): {text}")));
        }

        let auth: CognitoAuthResponse = serde_json::from_str(&text)
            .map_err(|e| RefreshError::Transient(format!("parse response: {e}")))?;
        let expires_in = auth.result.expires_in.unwrap_or(self.lifetime.as_secs());

        Ok(TokenSet {
            access_token: auth.result.access_token,
            id_token: auth.result.id_token,
            // Cognito does not rotate refresh tokens; carry the stored one forward.
            refresh_token: stored.refresh_token.clone(),
            expires_at: epoch_ms() + expires_in * 1000,
            provider: ProviderKind::Cognito,
        })
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
