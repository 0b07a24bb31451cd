// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic health checking with an always-readable aggregate snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::epoch_ms;
use crate::health::probe::{probe_api, probe_cognito, probe_database, probe_firebase};
use crate::health::{
    aggregate, HealthStatus, ServiceHealth, ServiceStatus, UnhealthyService, SERVICE_API,
    SERVICE_COGNITO, SERVICE_DATABASE, SERVICE_FIREBASE, SERVICE_NAMES,
};

/// Probes the four downstream dependencies and keeps the latest aggregate
/// snapshot. Query methods are pure reads and never trigger a probe.
pub struct HealthCheckService {
    http: reqwest::Client,
    api_url: String,
    firebase_lookup_url: String,
    firebase_api_key: String,
    cognito_url: String,
    cognito_pool_id: String,
    probe_timeout: Duration,
    check_interval: Duration,
    snapshot: RwLock<HealthStatus>,
    /// Active polling loop, if any. Cancel-before-arm so restarting never
    /// duplicates timers.
    periodic: Mutex<Option<CancellationToken>>,
}

impl HealthCheckService {
    pub fn new(config: &SessionConfig, http: reqwest::Client) -> Arc<Self> {
        Arc::new(Self {
            http,
            api_url: config.api_url.clone(),
            firebase_lookup_url: config.firebase_lookup_url.clone(),
            firebase_api_key: config.firebase_api_key.clone(),
            cognito_url: config.cognito_url.clone(),
            cognito_pool_id: config.cognito_pool_id.clone(),
            probe_timeout: config.probe_timeout(),
            check_interval: config.health_check_interval(),
            snapshot: RwLock::new(unknown_snapshot(None)),
            periodic: Mutex::new(None),
        })
    }

    /// Probe all four dependencies concurrently and replace the stored
    /// snapshot wholesale. Never fails: a catastrophic check collapses to
    /// an all-unknown, overall-unhealthy snapshot.
    pub async fn perform_health_check(&self) -> HealthStatus {
        let next_check = Some(epoch_ms() + self.check_interval.as_millis() as u64);
        let snapshot = match self.run_checks().await {
            Ok(services) => {
                let overall = aggregate(&services);
                HealthStatus { overall, services, last_check: epoch_ms(), next_check }
            }
            Err(e) => {
                tracing::error!(err = %e, "health check failed wholesale");
                unknown_snapshot(next_check)
            }
        };
        *self.snapshot.write() = snapshot.clone();
        tracing::debug!(overall = ?snapshot.overall, "health snapshot updated");
        snapshot
    }

    /// Launch the four probes as independent tasks and join them
    /// fault-tolerantly: one probe timing out or failing never disturbs
    /// its siblings.
    async fn run_checks(&self) -> anyhow::Result<HashMap<String, ServiceHealth>> {
        let api = tokio::spawn(probe_api(self.http.clone(), self.api_url.clone(), self.probe_timeout));
        let firebase = tokio::spawn(probe_firebase(
            self.http.clone(),
            self.firebase_lookup_url.clone(),
            self.firebase_api_key.clone(),
            self.probe_timeout,
        ));
        let cognito = tokio::spawn(probe_cognito(
            self.http.clone(),
            self.cognito_url.clone(),
            self.cognito_pool_id.clone(),
            self.probe_timeout,
        ));
        let database =
            tokio::spawn(probe_database(self.http.clone(), self.api_url.clone(), self.probe_timeout));

        let mut services = HashMap::new();
        services.insert(SERVICE_API.to_owned(), api.await?);
        services.insert(SERVICE_FIREBASE.to_owned(), firebase.await?);
        services.insert(SERVICE_COGNITO.to_owned(), cognito.await?);
        services.insert(SERVICE_DATABASE.to_owned(), database.await?);
        Ok(services)
    }

    /// Run one immediate check, then repeat at the configured interval.
    /// Restarting cancels the previous loop first.
    pub fn start_periodic_checks(self: &Arc<Self>) {
        let token = CancellationToken::new();
        {
            let mut slot = self.periodic.lock();
            if let Some(prev) = slot.take() {
                prev.cancel();
            }
            *slot = Some(token.clone());
        }

        let svc = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(svc.check_interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {}
                }
                svc.perform_health_check().await;
            }
            tracing::debug!("periodic health checks stopped");
        });
        tracing::info!(interval_ms = self.check_interval.as_millis() as u64, "periodic health checks started");
    }

    /// Cancel the polling loop. Idempotent.
    pub fn stop_periodic_checks(&self) {
        if let Some(token) = self.periodic.lock().take() {
            token.cancel();
        }
    }

    /// Last snapshot. Non-blocking; never triggers a probe.
    pub fn health_status(&self) -> HealthStatus {
        self.snapshot.read().clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.snapshot.read().overall == ServiceStatus::Healthy
    }

    pub fn is_service_healthy(&self, name: &str) -> bool {
        self.snapshot
            .read()
            .services
            .get(name)
            .is_some_and(|s| s.status == ServiceStatus::Healthy)
    }

    /// Every non-healthy service with its error text.
    pub fn unhealthy_services(&self) -> Vec<UnhealthyService> {
        let snapshot = self.snapshot.read();
        let mut out: Vec<UnhealthyService> = snapshot
            .services
            .iter()
            .filter(|(_, s)| s.status != ServiceStatus::Healthy)
            .map(|(name, s)| UnhealthyService {
                name: name.clone(),
                status: s.status,
                error: s.error.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

/// Fallback snapshot: all services unknown, overall unhealthy. Also the
/// state before the first probe cycle completes.
fn unknown_snapshot(next_check: Option<u64>) -> HealthStatus {
    let now = epoch_ms();
    let services = SERVICE_NAMES
        .iter()
        .map(|name| {
            (
                (*name).to_owned(),
                ServiceHealth {
                    status: ServiceStatus::Unknown,
                    response_time_ms: None,
                    error: None,
                    last_check: now,
                    details: None,
                },
            )
        })
        .collect();
    HealthStatus { overall: ServiceStatus::Unhealthy, services, last_check: now, next_check }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
