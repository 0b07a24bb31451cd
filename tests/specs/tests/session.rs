// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests that wire a full [`SessionCore`] against a mock
//! backend playing the API gateway and both identity providers.

use std::sync::atomic::Ordering;
use std::time::Duration;

use careline_session::error::{ApiFailure, ErrorContext};
use careline_session::health::ServiceStatus;
use careline_session::token::store::TokenStore;
use careline_session::token::ProviderKind;
use careline_session::{epoch_ms, SessionCore};

use careline_specs::{seed_session, MockBackend};

fn expired_failure() -> ApiFailure {
    ApiFailure {
        status: Some(401),
        code: Some("TOKEN_EXPIRED".into()),
        message: "token expired".into(),
        ..Default::default()
    }
}

fn ctx() -> ErrorContext {
    ErrorContext {
        component: Some("specs".into()),
        endpoint: Some("/records".into()),
        action: Some("fetch".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn init_refreshes_a_session_already_inside_the_margin() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    // Expiry in one second: well inside the 10-minute margin, so the
    // proactive timer armed by init fires immediately.
    seed_session(dir.path(), ProviderKind::Firebase, epoch_ms() + 1000)?;

    let core = SessionCore::new(backend.config(dir.path()))?;
    core.init().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if backend.firebase_refreshes.load(Ordering::Relaxed) >= 1 {
            break;
        }
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "proactive refresh never fired");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let store = TokenStore::new(dir.path());
    let stored = store.get(ProviderKind::Firebase).ok_or_else(|| anyhow::anyhow!("no tokens"))?;
    anyhow::ensure!(stored.access_token == "fresh-access", "stale access token");

    let info = core.tokens.token_info().ok_or_else(|| anyhow::anyhow!("no token info"))?;
    anyhow::ensure!(info.last_refresh.is_some(), "last_refresh not recorded");
    anyhow::ensure!(info.time_until_expiry > 3_000_000, "expiry not extended");

    core.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn expired_call_recovers_through_refresh() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    seed_session(dir.path(), ProviderKind::Firebase, epoch_ms() + 3_600_000)?;

    let core = SessionCore::new(backend.config(dir.path()))?;

    let verdict = core.errors.handle_api_error(expired_failure(), &ctx()).await;

    anyhow::ensure!(verdict.should_retry, "expected retry after successful refresh");
    anyhow::ensure!(!verdict.should_reauth, "reauth despite successful refresh");
    anyhow::ensure!(verdict.error_code == "AUTH_EXPIRED", "wrong code: {}", verdict.error_code);
    anyhow::ensure!(backend.firebase_refreshes.load(Ordering::Relaxed) == 1);

    core.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_routes_to_reauthentication() -> anyhow::Result<()> {
    let backend = MockBackend::build().reject_firebase_refresh().spawn().await?;
    let dir = tempfile::tempdir()?;
    seed_session(dir.path(), ProviderKind::Firebase, epoch_ms() + 3_600_000)?;

    let core = SessionCore::new(backend.config(dir.path()))?;

    let verdict = core.errors.handle_api_error(expired_failure(), &ctx()).await;

    anyhow::ensure!(!verdict.should_retry, "retry despite rejected refresh");
    anyhow::ensure!(verdict.should_reauth, "expected reauth after rejected refresh");

    // The stored credentials were not overwritten by the failed attempt.
    let store = TokenStore::new(dir.path());
    let stored = store.get(ProviderKind::Firebase).ok_or_else(|| anyhow::anyhow!("no tokens"))?;
    anyhow::ensure!(stored.access_token == "seeded-access");

    core.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cognito_session_refreshes_and_keeps_its_refresh_token() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    seed_session(dir.path(), ProviderKind::Cognito, epoch_ms() + 3_600_000)?;

    let core = SessionCore::new(backend.config(dir.path()))?;

    let outcome = core.tokens.refresh_token().await;
    anyhow::ensure!(outcome.success, "cognito refresh failed: {:?}", outcome.error);
    anyhow::ensure!(backend.cognito_refreshes.load(Ordering::Relaxed) == 1);
    anyhow::ensure!(backend.firebase_refreshes.load(Ordering::Relaxed) == 0);

    let store = TokenStore::new(dir.path());
    let stored = store.get(ProviderKind::Cognito).ok_or_else(|| anyhow::anyhow!("no tokens"))?;
    anyhow::ensure!(stored.access_token == "cognito-fresh-access");
    // Cognito never rotates the refresh token.
    anyhow::ensure!(stored.refresh_token == "seeded-refresh");

    core.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn health_check_covers_all_four_dependencies() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;

    let core = SessionCore::new(backend.config(dir.path()))?;

    let snapshot = core.health.perform_health_check().await;
    anyhow::ensure!(snapshot.overall == ServiceStatus::Healthy, "overall: {:?}", snapshot.overall);
    anyhow::ensure!(snapshot.services.len() == 4);
    anyhow::ensure!(core.health.is_healthy());
    anyhow::ensure!(core.health.unhealthy_services().is_empty());

    // Snapshot serializes for the ops surface.
    let json = serde_json::to_value(&snapshot)?;
    anyhow::ensure!(json["overall"] == "healthy");
    anyhow::ensure!(json["services"]["firebase"]["status"] == "healthy");

    core.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_periodic_probing() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;

    let mut config = backend.config(dir.path());
    config.health_check_ms = 50;
    let core = SessionCore::new(config)?;

    core.init().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    anyhow::ensure!(backend.health_hits.load(Ordering::Relaxed) >= 2, "periodic probing never ran");

    core.shutdown().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = backend.health_hits.load(Ordering::Relaxed);
    tokio::time::sleep(Duration::from_millis(200)).await;
    anyhow::ensure!(
        backend.health_hits.load(Ordering::Relaxed) == after,
        "probing continued after shutdown"
    );
    Ok(())
}

#[tokio::test]
async fn init_without_a_session_schedules_nothing() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;

    let core = SessionCore::new(backend.config(dir.path()))?;
    core.init().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    anyhow::ensure!(backend.firebase_refreshes.load(Ordering::Relaxed) == 0);
    anyhow::ensure!(backend.cognito_refreshes.load(Ordering::Relaxed) == 0);
    anyhow::ensure!(core.tokens.token_info().is_none());
    anyhow::ensure!(core.tokens.needs_refresh());

    core.shutdown().await;
    Ok(())
}
