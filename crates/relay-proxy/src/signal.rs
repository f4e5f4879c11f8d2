//! One-shot rendezvous primitives built on [`watch`] channels.
//!
//! A [`Signal`] flips from unfired to fired exactly once. A [`Cancellation`]
//! is a signal that carries a cause. Both are level-triggered: a waiter that
//! subscribes after the flip sees it immediately, so there is no lost wake-up.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::ProxyError;

/// Fire-once completion flag shared between tasks.
#[derive(Clone, Debug)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` only for the call that flipped it.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until fired. Returns immediately if it already was.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

/// Session-wide cancellation with a cause.
#[derive(Clone, Debug)]
pub struct Cancellation {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel with `cause`. The first cause wins; returns `false` if already
    /// cancelled.
    pub fn cancel(&self, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The cancellation error, if cancelled.
    pub fn err(&self) -> Option<ProxyError> {
        self.tx.borrow().clone().map(ProxyError::Cancelled)
    }

    /// Wait until cancelled and return the cancellation error.
    pub async fn cancelled(&self) -> ProxyError {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(cause) => ProxyError::Cancelled(cause.clone().unwrap_or_default()),
            Err(_) => ProxyError::Cancelled(String::new()),
        }
    }

    /// Wait for `signal`, or fail with the cancellation error.
    ///
    /// Cancellation takes priority when both are ready.
    pub async fn wait_for(&self, signal: &Signal) -> Result<(), ProxyError> {
        tokio::select! {
            biased;
            err = self.cancelled() => Err(err),
            _ = signal.wait() => Ok(()),
        }
    }
}
