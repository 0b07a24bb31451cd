// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health probing of the four downstream dependencies.

pub mod probe;
pub mod service;

use std::collections::HashMap;

use serde::Serialize;

/// The four fixed downstream dependencies.
pub const SERVICE_API: &str = "api";
pub const SERVICE_FIREBASE: &str = "firebase";
pub const SERVICE_COGNITO: &str = "cognito";
pub const SERVICE_DATABASE: &str = "database";

pub const SERVICE_NAMES: [&str; 4] =
    [SERVICE_API, SERVICE_FIREBASE, SERVICE_COGNITO, SERVICE_DATABASE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Point-in-time health of one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch ms of the probe that produced this entry.
    pub last_check: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Aggregate snapshot, recomputed wholesale on every probe cycle.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub overall: ServiceStatus,
    pub services: HashMap<String, ServiceHealth>,
    pub last_check: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_check: Option<u64>,
}

/// Non-healthy service entry for the ops query surface.
#[derive(Debug, Clone, Serialize)]
pub struct UnhealthyService {
    pub name: String,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Overall status: healthy iff every service is healthy; unhealthy if any
/// service is unhealthy; degraded otherwise.
pub fn aggregate(services: &HashMap<String, ServiceHealth>) -> ServiceStatus {
    if services.values().any(|s| s.status == ServiceStatus::Unhealthy) {
        return ServiceStatus::Unhealthy;
    }
    if services.values().all(|s| s.status == ServiceStatus::Healthy) {
        return ServiceStatus::Healthy;
    }
    ServiceStatus::Degraded
}
