// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery policy: turn a classified failure into an actionable,
//! user-safe verdict with bounded automatic retry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{classify, ApiFailure, ErrorContext, ErrorVerdict, FailureClass};
use crate::token::service::TokenRefreshService;

/// Maximum automatic retries per `(endpoint, action)` key, shared by the
/// network and server failure classes.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Progressive backoff delays, indexed by current attempt count.
const BACKOFF_MS: [u64; 3] = [1000, 2000, 4000];

/// Default wait when a rate-limit response carries no `Retry-After`.
const DEFAULT_RATE_LIMIT_MS: u64 = 60_000;

/// Classifies outbound-call failures and decides recovery. Never errors:
/// every failure resolves to an [`ErrorVerdict`].
pub struct ErrorHandler {
    tokens: Arc<TokenRefreshService>,
    /// Retry budget per composite key. Incremented on retryable failures,
    /// cleared on explicit success signal or once the budget is exhausted.
    attempts: Mutex<HashMap<String, u32>>,
}

impl ErrorHandler {
    pub fn new(tokens: Arc<TokenRefreshService>) -> Arc<Self> {
        Arc::new(Self { tokens, attempts: Mutex::new(HashMap::new()) })
    }

    /// Classify `failure` and return the recovery verdict.
    pub async fn handle_api_error(&self, failure: ApiFailure, context: &ErrorContext) -> ErrorVerdict {
        let class = classify(&failure);
        let key = context.retry_key();
        let attempt = *self.attempts.lock().await.get(&key).unwrap_or(&0);

        tracing::warn!(
            class = class.as_str(),
            status = failure.status,
            code = failure.code.as_deref(),
            message = %failure.message,
            component = context.component.as_deref(),
            endpoint = context.endpoint.as_deref(),
            action = context.action.as_deref(),
            user_id = context.user_id.as_deref(),
            request_id = context.request_id.as_deref(),
            attempt,
            "api error classified"
        );

        match class {
            FailureClass::AuthExpired => self.handle_expired_token(&failure).await,
            FailureClass::AuthInvalidCredentials => terminal(
                class,
                &failure,
                "Your credentials were not accepted. Please check them and try again.",
            ),
            FailureClass::AuthAccountLocked => terminal(
                class,
                &failure,
                "Your account is locked or disabled. Please contact support.",
            ),
            FailureClass::AuthMfaRequired => terminal(
                class,
                &failure,
                "Additional verification is required. Please complete multi-factor authentication.",
            ),
            FailureClass::AuthGeneric => ErrorVerdict {
                message: failure.message.clone(),
                user_message: "Your session is no longer valid. Please sign in again.".into(),
                should_retry: false,
                should_reauth: true,
                retry_after: None,
                error_code: class.as_str().into(),
            },
            FailureClass::Network => {
                self.retry_with_budget(
                    class,
                    &failure,
                    &key,
                    "We're having trouble reaching the server. Please check your connection.",
                )
                .await
            }
            FailureClass::Server => {
                self.retry_with_budget(
                    class,
                    &failure,
                    &key,
                    "The server is having trouble right now. Please try again shortly.",
                )
                .await
            }
            FailureClass::RateLimited => {
                // Server-dictated wait; deliberately exempt from the shared
                // retry budget.
                let wait = failure.retry_after_secs.map(|s| s * 1000).unwrap_or(DEFAULT_RATE_LIMIT_MS);
                ErrorVerdict {
                    message: failure.message.clone(),
                    user_message: "Too many requests. Please wait a moment and try again.".into(),
                    should_retry: true,
                    should_reauth: false,
                    retry_after: Some(wait),
                    error_code: class.as_str().into(),
                }
            }
            FailureClass::Validation => {
                let user_message = validation_message(&failure);
                ErrorVerdict {
                    message: failure.message.clone(),
                    user_message,
                    should_retry: false,
                    should_reauth: false,
                    retry_after: None,
                    error_code: class.as_str().into(),
                }
            }
            FailureClass::ClientOther => {
                terminal(class, &failure, "The request could not be completed.")
            }
            FailureClass::Unknown => {
                terminal(class, &failure, "An unexpected error occurred. Please try again.")
            }
        }
    }

    /// Token-expired recovery: one refresh attempt through the token
    /// service (which de-duplicates concurrent attempts). A successful
    /// refresh means the original call can be retried with fresh
    /// credentials; any failure routes to re-authentication.
    async fn handle_expired_token(&self, failure: &ApiFailure) -> ErrorVerdict {
        let outcome = self.tokens.refresh_token().await;
        if outcome.success {
            tracing::info!("token refreshed after expiry, caller should retry");
            return ErrorVerdict {
                message: failure.message.clone(),
                user_message: "Your session was renewed. Retrying...".into(),
                should_retry: true,
                should_reauth: false,
                retry_after: None,
                error_code: FailureClass::AuthExpired.as_str().into(),
            };
        }
        tracing::warn!(
            err = outcome.error.as_deref(),
            needs_reauth = outcome.needs_reauth,
            "token refresh after expiry failed"
        );
        ErrorVerdict {
            message: outcome.error.unwrap_or_else(|| failure.message.clone()),
            user_message: "Your session has expired. Please sign in again.".into(),
            should_retry: false,
            should_reauth: true,
            retry_after: None,
            error_code: FailureClass::AuthExpired.as_str().into(),
        }
    }

    /// Bounded retry shared by the network and server classes: consume one
    /// unit of the per-key budget, or go terminal once it is spent.
    async fn retry_with_budget(
        &self,
        class: FailureClass,
        failure: &ApiFailure,
        key: &str,
        terminal_user_message: &str,
    ) -> ErrorVerdict {
        let mut attempts = self.attempts.lock().await;
        let count = *attempts.get(key).unwrap_or(&0);
        if count >= MAX_RETRY_ATTEMPTS {
            attempts.remove(key);
            tracing::warn!(key, attempts = count, "retry budget exhausted");
            return terminal(class, failure, terminal_user_message);
        }
        attempts.insert(key.to_owned(), count + 1);
        ErrorVerdict {
            message: failure.message.clone(),
            user_message: "Connection hiccup. Retrying...".into(),
            should_retry: true,
            should_reauth: false,
            retry_after: Some(BACKOFF_MS[count as usize]),
            error_code: class.as_str().into(),
        }
    }

    /// Reset the retry budget for a key. Callers invoke this on eventual
    /// success; the classifier itself only ever observes failures.
    pub async fn clear_retry_attempts(&self, endpoint: &str, action: &str) {
        self.attempts.lock().await.remove(&format!("{endpoint}_{action}"));
    }

    /// Current attempt count for a key (0 for unknown keys).
    pub async fn retry_attempts(&self, endpoint: &str, action: &str) -> u32 {
        *self.attempts.lock().await.get(&format!("{endpoint}_{action}")).unwrap_or(&0)
    }
}

fn terminal(class: FailureClass, failure: &ApiFailure, user_message: &str) -> ErrorVerdict {
    ErrorVerdict {
        message: failure.message.clone(),
        user_message: user_message.into(),
        should_retry: false,
        should_reauth: false,
        retry_after: None,
        error_code: class.as_str().into(),
    }
}

/// Build a user-facing message from structured validation details when
/// present, else fall back to the raw message.
fn validation_message(failure: &ApiFailure) -> String {
    let Some(ref details) = failure.validation else {
        return failure.message.clone();
    };
    match details {
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Object(obj) => {
                        let msg = obj.get("message").and_then(|v| v.as_str())?;
                        match obj.get("field").and_then(|v| v.as_str()) {
                            Some(field) => Some(format!("{field}: {msg}")),
                            None => Some(msg.to_owned()),
                        }
                    }
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                failure.message.clone()
            } else {
                parts.join("; ")
            }
        }
        serde_json::Value::String(s) => s.clone(),
        _ => failure.message.clone(),
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
