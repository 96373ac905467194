//! Cooperative cancellation for reconcile passes.
//!
//! A [`CancelHandle`] is held by whoever drives reconciliation (shutdown hook,
//! lease loss, test). Every reconcile entry point receives a [`CancelToken`]
//! and races its network calls against it with [`CancelToken::run`].

use std::future::Future;

use tokio::sync::watch;

use crate::error::{Error, Result};

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Creates a new handle and its first token.
    #[must_use]
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx: Some(rx) })
    }

    /// Returns another token observing this handle.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Returns true once the signal has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Returns `Err(Error::Cancelled)` if the signal has fired.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the signal fires. Pends forever for [`CancelToken::never`]
    /// or when the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Runs `fut` unless cancellation fires first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if the signal fires before `fut` completes,
    /// otherwise whatever `fut` returns.
    pub async fn run<T, E, F>(&self, fut: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancelled() => Err(Error::Cancelled.into()),
            out = fut => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn never_token_runs_to_completion() {
        let token = CancelToken::never();
        let out: Result<u32> = token.run(async { Ok(7) }).await;
        assert_eq!(out.ok(), Some(7));
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn fired_token_short_circuits() {
        let (handle, token) = CancelHandle::new();
        handle.cancel();
        let out: Result<u32> = token.run(async { Ok(7) }).await;
        assert!(matches!(out, Err(Error::Cancelled)));
        assert!(token.check().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_pending_call() {
        let (handle, token) = CancelHandle::new();
        let task = tokio::spawn(async move {
            token
                .run(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, Error>(())
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        let out = task.await.unwrap_or(Ok(()));
        assert!(matches!(out, Err(Error::Cancelled)));
    }
}
