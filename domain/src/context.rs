use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::TaskError;

/// Cancellation and deadline propagation for every I/O-bound operation.
///
/// Modelled on the "context" objects used to gate long-running proof jobs:
/// a shared cancellation flag plus an optional deadline, both checked at
/// every suspension point (network call, database call that can block on
/// the writer lock).
#[derive(Clone, Debug)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context with no deadline and no cancellation, for call sites that
    /// don't care (tests, one-shot CLI invocations).
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Cancel this context and every clone derived from it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Check this context before a suspension point; returns an error if
    /// cancelled or past its deadline so the caller can bail out early
    /// instead of starting I/O that will just be thrown away.
    pub fn check(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            return Err(TaskError::transient("context cancelled"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(TaskError::transient("context deadline exceeded"));
            }
        }
        Ok(())
    }

    /// Run a future, aborting it if the context is cancelled or its deadline
    /// passes first. Used to wrap every network and database call.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TaskError>
    where
        F: std::future::Future<Output = Result<T, TaskError>>,
    {
        self.check()?;
        match self.remaining() {
            Some(remaining) => match tokio::time::timeout(remaining, fut).await {
                Ok(result) => result,
                Err(_) => Err(TaskError::transient("context deadline exceeded")),
            },
            None => fut.await,
        }
    }
}
