// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error classification: normalize any outbound-call failure at the
//! boundary into a closed taxonomy, then decide recovery exhaustively.

pub mod handler;

use serde::{Deserialize, Serialize};

/// Ambient metadata attached to a failure for classification and logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorContext {
    /// Composite key for retry-attempt tracking. Missing parts default to
    /// the literal "unknown".
    pub fn retry_key(&self) -> String {
        format!(
            "{}_{}",
            self.endpoint.as_deref().unwrap_or("unknown"),
            self.action.as_deref().unwrap_or("unknown"),
        )
    }
}

/// The classifier's verdict. `should_retry` and `should_reauth` are never
/// both true: retry and reauth are mutually exclusive outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorVerdict {
    /// Internal description, for logs only.
    pub message: String,
    /// Safe to display to end users.
    pub user_message: String,
    pub should_retry: bool,
    pub should_reauth: bool,
    /// Milliseconds to wait before retrying, when `should_retry` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub error_code: String,
}

/// Raw capture of a failed outbound call, taken once at the boundary.
#[derive(Debug, Clone, Default)]
pub struct ApiFailure {
    /// HTTP status, when the failure carries one.
    pub status: Option<u16>,
    /// Provider or API error code, when present in the body.
    pub code: Option<String>,
    pub message: String,
    /// `Retry-After` header value in seconds, when present.
    pub retry_after_secs: Option<u64>,
    /// Connection-level failure (no response was received).
    pub offline: bool,
    /// Structured validation details from the response body, when present.
    pub validation: Option<serde_json::Value>,
}

impl ApiFailure {
    /// Capture a failure from an HTTP response that arrived with a
    /// non-success status. Consumes the body.
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status().as_u16();
        let retry_after_secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = resp.text().await.unwrap_or_default();

        let mut code = None;
        let mut message = body.clone();
        let mut validation = None;
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
            code = value
                .get("code")
                .or_else(|| value.get("__type"))
                .or_else(|| value.get("error").and_then(|e| e.get("message")))
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            if let Some(msg) = value.get("message").and_then(|v| v.as_str()) {
                message = msg.to_owned();
            }
            validation = value.get("details").cloned().filter(|d| !d.is_null());
        }

        Self { status: Some(status), code, message, retry_after_secs, offline: false, validation }
    }
}

impl From<reqwest::Error> for ApiFailure {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            code: None,
            message: e.to_string(),
            retry_after_secs: None,
            offline: e.is_connect() || e.is_timeout(),
            validation: None,
        }
    }
}

/// Closed classification taxonomy. Every failure maps to exactly one
/// class; downstream recovery logic matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    AuthExpired,
    AuthInvalidCredentials,
    AuthAccountLocked,
    AuthMfaRequired,
    AuthGeneric,
    Network,
    RateLimited,
    Validation,
    /// HTTP 5xx.
    Server,
    /// 4xx that no earlier rule claimed. Terminal.
    ClientOther,
    Unknown,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::AuthInvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::AuthAccountLocked => "AUTH_ACCOUNT_LOCKED",
            Self::AuthMfaRequired => "AUTH_MFA_REQUIRED",
            Self::AuthGeneric => "AUTH_FAILED",
            Self::Network => "NETWORK_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::Validation => "VALIDATION_ERROR",
            Self::Server => "SERVER_ERROR",
            Self::ClientOther => "CLIENT_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

const EXPIRED_SIGNALS: &[&str] =
    &["TOKEN_EXPIRED", "id-token-expired", "token has expired", "Token expired"];
const INVALID_CREDENTIAL_SIGNALS: &[&str] = &[
    "INVALID_PASSWORD",
    "EMAIL_NOT_FOUND",
    "wrong-password",
    "user-not-found",
    "Incorrect username or password",
];
const LOCKED_SIGNALS: &[&str] = &["USER_DISABLED", "user-disabled", "UserDisabledException", "Account is locked"];
const MFA_SIGNALS: &[&str] = &["MFA_REQUIRED", "SOFTWARE_TOKEN_MFA", "SMS_MFA", "multi-factor"];
const THROTTLE_SIGNALS: &[&str] =
    &["TooManyRequestsException", "QUOTA_EXCEEDED", "ThrottlingException"];
const AUTH_CODE_SIGNALS: &[&str] = &["NotAuthorizedException", "auth/", "UNAUTHENTICATED"];

fn matches_any(failure: &ApiFailure, signals: &[&str]) -> bool {
    signals.iter().any(|s| {
        failure.code.as_deref().is_some_and(|c| c.contains(s)) || failure.message.contains(s)
    })
}

/// Map a raw failure into the taxonomy. First match wins, in the fixed
/// order: auth, network, rate limit, validation, server, unknown.
pub fn classify(failure: &ApiFailure) -> FailureClass {
    // 1. Authentication.
    let is_auth = failure.status == Some(401) || matches_any(failure, AUTH_CODE_SIGNALS);
    if is_auth
        || matches_any(failure, EXPIRED_SIGNALS)
        || matches_any(failure, INVALID_CREDENTIAL_SIGNALS)
        || matches_any(failure, LOCKED_SIGNALS)
        || matches_any(failure, MFA_SIGNALS)
    {
        if matches_any(failure, EXPIRED_SIGNALS) {
            return FailureClass::AuthExpired;
        }
        if matches_any(failure, LOCKED_SIGNALS) {
            return FailureClass::AuthAccountLocked;
        }
        if matches_any(failure, MFA_SIGNALS) {
            return FailureClass::AuthMfaRequired;
        }
        if matches_any(failure, INVALID_CREDENTIAL_SIGNALS) {
            return FailureClass::AuthInvalidCredentials;
        }
        return FailureClass::AuthGeneric;
    }

    // 2. Network: no response ever arrived.
    if failure.offline || (failure.status.is_none() && failure.message.contains("error sending request")) {
        return FailureClass::Network;
    }

    // 3. Rate limiting.
    if failure.status == Some(429) || matches_any(failure, THROTTLE_SIGNALS) {
        return FailureClass::RateLimited;
    }

    // 4. Validation. A details payload on a 5xx is still a server fault;
    // the trigger only applies to client-side or status-less failures.
    let not_server = matches!(failure.status, None | Some(..=499));
    if failure.status == Some(400)
        || failure.code.as_deref().is_some_and(|c| c.contains("Validation"))
        || (failure.validation.is_some() && not_server)
    {
        return FailureClass::Validation;
    }

    // 5. Server.
    match failure.status {
        Some(s) if s >= 500 => FailureClass::Server,
        Some(s) if (400..500).contains(&s) => FailureClass::ClientOther,
        _ => FailureClass::Unknown,
    }
}
