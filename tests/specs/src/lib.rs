// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end session tests.
//!
//! Stands up one axum server that plays every downstream dependency at
//! once: the API gateway (health routes), the Firebase secure-token and
//! account-lookup endpoints, and the Cognito identity-provider endpoint.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Once;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use careline_session::config::SessionConfig;
use careline_session::token::store::TokenStore;
use careline_session::token::{ProviderKind, TokenSet};

static LOG_INIT: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`. Safe to call from
/// every test; only the first call has effect.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// All downstream dependencies behind one base URL, with per-endpoint
/// call counters.
pub struct MockBackend {
    pub base_url: String,
    /// Calls to the Firebase secure-token (refresh) endpoint.
    pub firebase_refreshes: Arc<AtomicU32>,
    /// Calls to the Cognito `InitiateAuth` flow.
    pub cognito_refreshes: Arc<AtomicU32>,
    /// Calls to the gateway `/health` probe.
    pub health_hits: Arc<AtomicU32>,
}

#[derive(Default)]
pub struct MockBackendBuilder {
    reject_firebase_refresh: bool,
}

impl MockBackendBuilder {
    /// Make the Firebase token endpoint reject every refresh with the
    /// provider's credential-expired error.
    pub fn reject_firebase_refresh(mut self) -> Self {
        self.reject_firebase_refresh = true;
        self
    }

    pub async fn spawn(self) -> anyhow::Result<MockBackend> {
        init_logging();

        let firebase_refreshes = Arc::new(AtomicU32::new(0));
        let cognito_refreshes = Arc::new(AtomicU32::new(0));
        let health_hits = Arc::new(AtomicU32::new(0));

        let reject = self.reject_firebase_refresh;
        let fb_counter = Arc::clone(&firebase_refreshes);
        let cg_counter = Arc::clone(&cognito_refreshes);
        let hh_counter = Arc::clone(&health_hits);

        let router = Router::new()
            .route(
                "/health",
                get(move || {
                    let hh_counter = Arc::clone(&hh_counter);
                    async move {
                        hh_counter.fetch_add(1, Ordering::Relaxed);
                        r#"{"status":"ok"}"#
                    }
                }),
            )
            .route("/health/database", get(|| async { r#"{"status":"ok"}"# }))
            .route(
                "/firebase/token",
                post(move || {
                    let fb_counter = Arc::clone(&fb_counter);
                    async move {
                        fb_counter.fetch_add(1, Ordering::Relaxed);
                        if reject {
                            return (
                                StatusCode::BAD_REQUEST,
                                r#"{"error":{"message":"TOKEN_EXPIRED"}}"#.to_owned(),
                            );
                        }
                        let body = serde_json::json!({
                            "access_token": "fresh-access",
                            "id_token": "fresh-id",
                            "refresh_token": "fresh-refresh",
                            "expires_in": "3600",
                        });
                        (StatusCode::OK, body.to_string())
                    }
                }),
            )
            .route(
                "/firebase/lookup",
                post(|| async {
                    (StatusCode::BAD_REQUEST, r#"{"error":{"message":"INVALID_ID_TOKEN"}}"#)
                }),
            )
            .route(
                "/cognito",
                post(move |headers: HeaderMap| {
                    let cg_counter = Arc::clone(&cg_counter);
                    async move {
                        let target = headers
                            .get("X-Amz-Target")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default();
                        if target.ends_with("InitiateAuth") {
                            cg_counter.fetch_add(1, Ordering::Relaxed);
                            let body = serde_json::json!({
                                "AuthenticationResult": {
                                    "AccessToken": "cognito-fresh-access",
                                    "IdToken": "cognito-fresh-id",
                                    "ExpiresIn": 3600,
                                }
                            });
                            return (StatusCode::OK, body.to_string());
                        }
                        // DescribeUserPool health probe.
                        (StatusCode::OK, "{}".to_owned())
                    }
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(MockBackend {
            base_url: format!("http://{addr}"),
            firebase_refreshes,
            cognito_refreshes,
            health_hits,
        })
    }
}

impl MockBackend {
    pub async fn start() -> anyhow::Result<Self> {
        MockBackendBuilder::default().spawn().await
    }

    pub fn build() -> MockBackendBuilder {
        MockBackendBuilder::default()
    }

    /// A config pointing every endpoint at this backend, with state in
    /// `state_dir` and timings tightened for tests.
    pub fn config(&self, state_dir: &Path) -> SessionConfig {
        let base = &self.base_url;
        SessionConfig {
            api_url: base.clone(),
            firebase_token_url: format!("{base}/firebase/token"),
            firebase_lookup_url: format!("{base}/firebase/lookup"),
            firebase_api_key: "spec-key".into(),
            cognito_url: format!("{base}/cognito"),
            cognito_client_id: "spec-client".into(),
            cognito_pool_id: "spec-pool".into(),
            default_provider: ProviderKind::Firebase,
            state_dir: Some(state_dir.to_path_buf()),
            firebase_token_lifetime_secs: 3600,
            cognito_token_lifetime_secs: 3600,
            refresh_margin_secs: 600,
            refresh_threshold_secs: 300,
            refresh_timeout_secs: 5,
            health_check_ms: 300_000,
            probe_timeout_ms: 2_000,
        }
    }
}

/// Persist a session for `provider` as a prior sign-in would have.
pub fn seed_session(state_dir: &Path, provider: ProviderKind, expires_at: u64) -> anyhow::Result<()> {
    let store = TokenStore::new(state_dir);
    store.put(&TokenSet {
        access_token: "seeded-access".into(),
        id_token: "seeded-id".into(),
        refresh_token: "seeded-refresh".into(),
        expires_at,
        provider,
    })
}
