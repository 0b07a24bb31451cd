// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use crate::token::ProviderKind;

/// Configuration for the session-resilience core.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the API gateway (health and database probes).
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "CARELINE_API_URL")]
    pub api_url: String,

    /// Firebase secure-token endpoint for refresh-token exchange.
    #[arg(
        long,
        default_value = "https://securetoken.googleapis.com/v1/token",
        env = "CARELINE_FIREBASE_TOKEN_URL"
    )]
    pub firebase_token_url: String,

    /// Firebase account-lookup endpoint (health probe).
    #[arg(
        long,
        default_value = "https://identitytoolkit.googleapis.com/v1/accounts:lookup",
        env = "CARELINE_FIREBASE_LOOKUP_URL"
    )]
    pub firebase_lookup_url: String,

    /// Firebase web API key.
    #[arg(long, default_value = "", env = "CARELINE_FIREBASE_API_KEY")]
    pub firebase_api_key: String,

    /// Cognito identity-provider endpoint.
    #[arg(
        long,
        default_value = "https://cognito-idp.us-east-1.amazonaws.com/",
        env = "CARELINE_COGNITO_URL"
    )]
    pub cognito_url: String,

    /// Cognito app client ID.
    #[arg(long, default_value = "", env = "CARELINE_COGNITO_CLIENT_ID")]
    pub cognito_client_id: String,

    /// Cognito user pool ID (describe-call health probe).
    #[arg(long, default_value = "", env = "CARELINE_COGNITO_POOL_ID")]
    pub cognito_pool_id: String,

    /// Provider to assume when neither has live session evidence.
    #[arg(long, default_value = "firebase", env = "CARELINE_DEFAULT_PROVIDER")]
    pub default_provider: ProviderKind,

    /// Directory for persisted token state. Defaults to the platform state dir.
    #[arg(long, env = "CARELINE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Firebase ID-token lifetime in seconds.
    #[arg(long, default_value_t = 3600, env = "CARELINE_FIREBASE_TOKEN_LIFETIME_SECS")]
    pub firebase_token_lifetime_secs: u64,

    /// Cognito access-token lifetime in seconds.
    #[arg(long, default_value_t = 3600, env = "CARELINE_COGNITO_TOKEN_LIFETIME_SECS")]
    pub cognito_token_lifetime_secs: u64,

    /// Margin before expiry at which the proactive refresh timer fires, in seconds.
    #[arg(long, default_value_t = 600, env = "CARELINE_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: u64,

    /// Remaining lifetime below which `needs_refresh` reports true, in seconds.
    #[arg(long, default_value_t = 300, env = "CARELINE_REFRESH_THRESHOLD_SECS")]
    pub refresh_threshold_secs: u64,

    /// Hard ceiling on a single provider refresh call, in seconds.
    #[arg(long, default_value_t = 30, env = "CARELINE_REFRESH_TIMEOUT_SECS")]
    pub refresh_timeout_secs: u64,

    /// Periodic health check interval in milliseconds.
    #[arg(long, default_value_t = 300_000, env = "CARELINE_HEALTH_CHECK_MS")]
    pub health_check_ms: u64,

    /// Per-probe timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "CARELINE_PROBE_TIMEOUT_MS")]
    pub probe_timeout_ms: u64,
}

impl SessionConfig {
    pub fn refresh_margin(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn refresh_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_threshold_secs)
    }

    pub fn refresh_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn health_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.health_check_ms)
    }

    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.probe_timeout_ms)
    }

    /// Resolve the state directory for persisted token data.
    ///
    /// Checks the configured override, then `$XDG_STATE_HOME/careline`,
    /// then `$HOME/.local/state/careline`.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("careline");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/careline");
        }
        PathBuf::from(".careline")
    }
}
