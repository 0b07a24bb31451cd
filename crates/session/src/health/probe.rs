// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Individual dependency probes. Each probe is infallible and bounded by
//! its own timeout; failures become `ServiceHealth` entries, never errors.

use std::time::{Duration, Instant};

use crate::epoch_ms;
use crate::health::{ServiceHealth, ServiceStatus};

/// API gateway reachability: `GET /health`.
pub async fn probe_api(http: reqwest::Client, base_url: String, timeout: Duration) -> ServiceHealth {
    let url = format!("{base_url}/health");
    timed(timeout, async move {
        match http.get(&url).send().await {
            Ok(resp) => from_status(resp.status().as_u16(), json_details(resp).await),
            Err(e) => unreachable_entry(e.to_string()),
        }
    })
    .await
}

/// Database reachability through the same gateway: `GET /health/database`.
pub async fn probe_database(
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
) -> ServiceHealth {
    let url = format!("{base_url}/health/database");
    timed(timeout, async move {
        match http.get(&url).send().await {
            Ok(resp) => from_status(resp.status().as_u16(), json_details(resp).await),
            Err(e) => unreachable_entry(e.to_string()),
        }
    })
    .await
}

/// Primary IdP liveness: send a deliberately invalid token to the lookup
/// endpoint. The provider's invalid-token rejection proves the endpoint is
/// live, so that specific 400 maps to healthy.
pub async fn probe_firebase(
    http: reqwest::Client,
    lookup_url: String,
    api_key: String,
    timeout: Duration,
) -> ServiceHealth {
    let url = format!("{lookup_url}?key={api_key}");
    timed(timeout, async move {
        let body = serde_json::json!({ "idToken": "health-check-invalid-token" });
        match http.post(&url).json(&body).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let text = resp.text().await.unwrap_or_default();
                if status == 400 && text.contains("INVALID_ID_TOKEN") {
                    // Expected rejection: the endpoint is alive and parsing.
                    return healthy_entry(None);
                }
                from_status(status, None)
            }
            Err(e) => unreachable_entry(e.to_string()),
        }
    })
    .await
}

/// Secondary IdP liveness: a lightweight pool describe-call.
pub async fn probe_cognito(
    http: reqwest::Client,
    endpoint: String,
    pool_id: String,
    timeout: Duration,
) -> ServiceHealth {
    timed(timeout, async move {
        let body = serde_json::json!({ "UserPoolId": pool_id });
        let result = http
            .post(&endpoint)
            .header("X-Amz-Target", "AWSCognitoIdentityProviderService.DescribeUserPool")
            .header("Content-Type", "application/x-amz-json-1.1")
            .body(body.to_string())
            .send()
            .await;
        match result {
            Ok(resp) => from_status(resp.status().as_u16(), None),
            Err(e) => unreachable_entry(e.to_string()),
        }
    })
    .await
}

/// Run `fut` under `timeout`, stamping response time. A timeout maps to an
/// unhealthy entry with the fixed error text "Timeout".
async fn timed<F>(timeout: Duration, fut: F) -> ServiceHealth
where
    F: std::future::Future<Output = ServiceHealth>,
{
    let started = Instant::now();
    match tokio::time::timeout(timeout, fut).await {
        Ok(mut entry) => {
            entry.response_time_ms = Some(started.elapsed().as_millis() as u64);
            entry
        }
        Err(_) => ServiceHealth {
            status: ServiceStatus::Unhealthy,
            response_time_ms: Some(timeout.as_millis() as u64),
            error: Some("Timeout".into()),
            last_check: epoch_ms(),
            details: None,
        },
    }
}

/// Standard status mapping: 2xx healthy, 5xx unhealthy, other 4xx degraded.
fn from_status(status: u16, details: Option<serde_json::Value>) -> ServiceHealth {
    if (200..300).contains(&status) {
        return healthy_entry(details);
    }
    let (state, error) = if status >= 500 {
        (ServiceStatus::Unhealthy, format!("HTTP {status}"))
    } else {
        (ServiceStatus::Degraded, format!("HTTP {status}"))
    };
    ServiceHealth {
        status: state,
        response_time_ms: None,
        error: Some(error),
        last_check: epoch_ms(),
        details,
    }
}

fn healthy_entry(details: Option<serde_json::Value>) -> ServiceHealth {
    ServiceHealth {
        status: ServiceStatus::Healthy,
        response_time_ms: None,
        error: None,
        last_check: epoch_ms(),
        details,
    }
}

fn unreachable_entry(error: String) -> ServiceHealth {
    ServiceHealth {
        status: ServiceStatus::Unhealthy,
        response_time_ms: None,
        error: Some(error),
        last_check: epoch_ms(),
        details: None,
    }
}

async fn json_details(resp: reqwest::Response) -> Option<serde_json::Value> {
    resp.json::<serde_json::Value>().await.ok()
}
