// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellable one-shot timer with a single active handle per concern.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A single scheduled callback. Re-arming always cancels the previous
/// timer first, so at most one callback is pending at any time.
#[derive(Debug, Default)]
pub struct ScheduledTask {
    cancel: Option<CancellationToken>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self { cancel: None }
    }

    /// Arm the timer: after `delay`, run `fut` unless cancelled.
    /// Any previously armed timer is cancelled before the new one starts.
    pub fn schedule<F>(&mut self, delay: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let token = CancellationToken::new();
        let guard = token.clone();
        self.cancel = Some(token);

        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(delay) => fut.await,
            }
        });
    }

    /// Cancel the pending timer, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    /// Whether a timer is currently armed (may have already fired).
    pub fn is_armed(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
