//! Caller-supplied deadline and cancellation for searches and uploads.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Cloneable cancellation token. Cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool { self.inner.cancelled.load(Ordering::SeqCst) }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            // Registered on creation, so a cancel between the check and the
            // await still wakes us.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() { return; }
            notified.await;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: Option<CancelSignal>,
}

impl RequestContext {
    /// No deadline, not cancellable.
    pub fn background() -> Self { Self::default() }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    pub fn is_cancelled(&self) -> bool { self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) }

    /// Drive `fut` to completion unless the deadline passes or the caller
    /// cancels first. The future is dropped in either of those cases.
    pub async fn run<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled(what.to_string()));
        }
        let cancelled = async {
            match &self.cancel {
                Some(c) => c.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            out = fut => out,
            _ = cancelled => Err(Error::Cancelled(what.to_string())),
            _ = expired => Err(Error::Timeout(what.to_string())),
        }
    }
}
