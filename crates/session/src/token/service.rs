// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proactive token refresh: keeps the active provider's credential set
//! valid without the caller thinking about expiry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::Mutex;

use crate::epoch_ms;
use crate::task::ScheduledTask;
use crate::token::provider::IdentityProvider;
use crate::token::store::TokenStore;
use crate::token::{ProviderKind, RefreshError, RefreshOutcome, TokenInfo};

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Owns the credential lifecycle for the active provider: proactive
/// renewal on a timer, manual refresh with single-flight de-duplication,
/// and durable persistence of each new token set.
pub struct TokenRefreshService {
    providers: Vec<Arc<dyn IdentityProvider>>,
    default_provider: ProviderKind,
    store: Arc<TokenStore>,
    refresh_margin: Duration,
    refresh_threshold: Duration,
    refresh_timeout: Duration,
    /// In-flight refresh, shared by all concurrent callers.
    inflight: Mutex<Option<SharedRefresh>>,
    /// Single proactive timer; re-armed after every successful refresh.
    timer: Mutex<ScheduledTask>,
    /// Epoch ms of the last successful refresh (0 = none this process).
    last_refresh: AtomicU64,
}

impl TokenRefreshService {
    pub fn new(
        providers: Vec<Arc<dyn IdentityProvider>>,
        default_provider: ProviderKind,
        store: Arc<TokenStore>,
        refresh_margin: Duration,
        refresh_threshold: Duration,
        refresh_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            providers,
            default_provider,
            store,
            refresh_margin,
            refresh_threshold,
            refresh_timeout,
            inflight: Mutex::new(None),
            timer: Mutex::new(ScheduledTask::new()),
            last_refresh: AtomicU64::new(0),
        })
    }

    /// The provider currently in effect: first one with live session
    /// evidence in priority order, else the configured default.
    pub fn active_provider(&self) -> Arc<dyn IdentityProvider> {
        for kind in ProviderKind::PRIORITY {
            let found = self.providers.iter().find(|p| p.kind() == kind);
            if let Some(p) = found {
                if p.has_active_session(&self.store) {
                    return Arc::clone(p);
                }
            }
        }
        self.provider_for(self.default_provider)
    }

    /// Whether any provider has live session evidence in the store.
    pub fn has_session(&self) -> bool {
        self.providers.iter().any(|p| p.has_active_session(&self.store))
    }

    fn provider_for(&self, kind: ProviderKind) -> Arc<dyn IdentityProvider> {
        self.providers
            .iter()
            .find(|p| p.kind() == kind)
            .map(Arc::clone)
            // Construction always registers both providers; fall back to the
            // first if the requested kind is somehow absent.
            .unwrap_or_else(|| Arc::clone(&self.providers[0]))
    }

    /// Refresh the active provider's token set.
    ///
    /// Concurrent callers share one underlying refresh call: if one is
    /// already in flight, this awaits it and returns the same outcome.
    ///
    /// Returns a boxed future: the proactive timer callback awaits this
    /// method from inside `perform_refresh`'s own call graph, and the
    /// concrete future type keeps that recursion well-founded.
    pub fn refresh_token(self: &Arc<Self>) -> BoxFuture<'static, RefreshOutcome> {
        let svc = Arc::clone(self);
        async move {
            let shared = {
                let mut inflight = svc.inflight.lock().await;
                match inflight.as_ref() {
                    Some(fut) => {
                        tracing::debug!("refresh already in flight, awaiting existing attempt");
                        fut.clone()
                    }
                    None => {
                        let owner = Arc::clone(&svc);
                        let fut: SharedRefresh = async move {
                            let outcome = owner.perform_refresh().await;
                            // Clear the slot before waiters resume so a later
                            // caller starts a fresh attempt instead of reading
                            // this completed one.
                            *owner.inflight.lock().await = None;
                            outcome
                        }
                        .boxed()
                        .shared();
                        *inflight = Some(fut.clone());
                        fut
                    }
                }
            };
            shared.await
        }
        .boxed()
    }

    async fn perform_refresh(self: &Arc<Self>) -> RefreshOutcome {
        let provider = self.active_provider();
        let kind = provider.kind();

        let Some(stored) = self.store.get(kind) else {
            tracing::warn!(provider = %kind, "refresh requested with no stored credentials");
            return RefreshOutcome::failed("no stored credentials", true);
        };

        let result = tokio::time::timeout(self.refresh_timeout, provider.refresh(&stored)).await;
        match result {
            Ok(Ok(tokens)) => {
                if let Err(e) = self.store.put(&tokens) {
                    tracing::warn!(provider = %kind, err = %e, "failed to persist refreshed tokens");
                }
                self.last_refresh.store(epoch_ms(), Ordering::Relaxed);
                self.schedule_refresh(kind).await;
                tracing::info!(provider = %kind, expires_at = tokens.expires_at, "token set refreshed");
                RefreshOutcome::ok(tokens)
            }
            Ok(Err(RefreshError::NeedsReauth(msg))) => {
                tracing::warn!(provider = %kind, err = %msg, "refresh rejected, re-authentication required");
                self.timer.lock().await.cancel();
                RefreshOutcome::failed(msg, true)
            }
            Ok(Err(RefreshError::Transient(msg))) => {
                // Transient retry policy belongs to the error classifier.
                tracing::warn!(provider = %kind, err = %msg, "refresh failed");
                RefreshOutcome::failed(msg, false)
            }
            Err(_) => {
                tracing::warn!(provider = %kind, timeout_secs = self.refresh_timeout.as_secs(), "refresh timed out");
                RefreshOutcome::failed("refresh timed out", false)
            }
        }
    }

    /// (Re)arm the proactive refresh timer for `kind`. Always cancels the
    /// prior timer first, so timers never overlap.
    pub async fn schedule_refresh(self: &Arc<Self>, kind: ProviderKind) {
        let delay = self.refresh_delay(kind);
        let svc = Arc::clone(self);
        let mut timer = self.timer.lock().await;
        timer.schedule(delay, async move {
            tracing::debug!(provider = %kind, "proactive refresh timer fired");
            let outcome = svc.refresh_token().await;
            if outcome.needs_reauth {
                tracing::warn!(provider = %kind, "proactive refresh requires re-authentication");
            }
        });
        tracing::debug!(provider = %kind, delay_secs = delay.as_secs(), "proactive refresh scheduled");
    }

    /// Delay until the next proactive refresh: margin before stored expiry
    /// when known, else margin before the provider's nominal lifetime end.
    fn refresh_delay(&self, kind: ProviderKind) -> Duration {
        let lifetime = self.provider_for(kind).token_lifetime();
        let fallback = lifetime.saturating_sub(self.refresh_margin);
        match self.store.get(kind) {
            Some(stored) if stored.expires_at > 0 => {
                let now = epoch_ms();
                let fire_at = stored.expires_at.saturating_sub(self.refresh_margin.as_millis() as u64);
                if fire_at > now {
                    Duration::from_millis(fire_at - now)
                } else {
                    // Already inside the margin window; refresh immediately.
                    Duration::ZERO
                }
            }
            _ => fallback,
        }
    }

    /// Pure read of the active provider's persisted expiry state.
    pub fn token_info(&self) -> Option<TokenInfo> {
        let provider = self.active_provider();
        let stored = self.store.get(provider.kind())?;
        if stored.access_token.is_empty() && stored.id_token.is_empty() {
            return None;
        }
        let now = epoch_ms();
        let last = self.last_refresh.load(Ordering::Relaxed);
        Some(TokenInfo {
            provider: provider.kind(),
            expires_at: stored.expires_at,
            time_until_expiry: stored.expires_at.saturating_sub(now),
            last_refresh: (last > 0).then_some(last),
        })
    }

    /// True when no token info is available or remaining lifetime is at or
    /// below the refresh threshold.
    pub fn needs_refresh(&self) -> bool {
        match self.token_info() {
            Some(info) => info.time_until_expiry <= self.refresh_threshold.as_millis() as u64,
            None => true,
        }
    }

    /// Cancel the proactive timer and drop in-flight state. Called on
    /// logout; the next refresh determines its provider from scratch.
    pub async fn cleanup(&self) {
        self.timer.lock().await.cancel();
        *self.inflight.lock().await = None;
        tracing::debug!("token refresh service cleaned up");
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
