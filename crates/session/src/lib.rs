// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Careline session-resilience core: token lifecycle management for two
//! interchangeable identity providers, classification-driven error
//! recovery, and periodic multi-service health probing.
//!
//! The embedding application constructs one [`SessionCore`] at startup
//! and calls [`SessionCore::init`]; view code only ever touches the three
//! services it exposes.

pub mod config;
pub mod error;
pub mod health;
pub mod task;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::handler::ErrorHandler;
use crate::health::service::HealthCheckService;
use crate::token::provider::{CognitoProvider, FirebaseProvider, IdentityProvider};
use crate::token::service::TokenRefreshService;
use crate::token::store::TokenStore;

/// The composed core: one instance per process, owned by the application
/// composition root. Tests construct fresh instances freely.
pub struct SessionCore {
    pub tokens: Arc<TokenRefreshService>,
    pub errors: Arc<ErrorHandler>,
    pub health: Arc<HealthCheckService>,
}

impl SessionCore {
    pub fn new(config: SessionConfig) -> anyhow::Result<Self> {
        ensure_crypto();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let store = Arc::new(TokenStore::new(&config.resolved_state_dir()));
        let providers: Vec<Arc<dyn IdentityProvider>> = vec![
            Arc::new(FirebaseProvider::new(
                config.firebase_token_url.clone(),
                config.firebase_api_key.clone(),
                Duration::from_secs(config.firebase_token_lifetime_secs),
                http.clone(),
            )),
            Arc::new(CognitoProvider::new(
                config.cognito_url.clone(),
                config.cognito_client_id.clone(),
                Duration::from_secs(config.cognito_token_lifetime_secs),
                http.clone(),
            )),
        ];

        let tokens = TokenRefreshService::new(
            providers,
            config.default_provider,
            store,
            config.refresh_margin(),
            config.refresh_threshold(),
            config.refresh_timeout(),
        );
        let errors = ErrorHandler::new(Arc::clone(&tokens));
        let health = HealthCheckService::new(&config, http);

        Ok(Self { tokens, errors, health })
    }

    /// Start background work: arm the proactive refresh timer when a
    /// persisted session exists, and begin periodic health checks.
    pub async fn init(&self) {
        if self.tokens.has_session() {
            let provider = self.tokens.active_provider();
            self.tokens.schedule_refresh(provider.kind()).await;
        }
        self.health.start_periodic_checks();
        tracing::info!("session core initialized");
    }

    /// Cancel all timers and in-flight work. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.tokens.cleanup().await;
        self.health.stop_periodic_checks();
        tracing::info!("session core shut down");
    }
}

/// Install the ring crypto provider required by reqwest's
/// `rustls-no-provider` build before any client is constructed.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    static CRYPTO_INIT: std::sync::Once = std::sync::Once::new();
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Current epoch milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
