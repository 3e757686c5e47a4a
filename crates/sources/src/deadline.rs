//! Deadline Guard: race an operation against a timer.
//!
//! The operation starts immediately on its own task. Whichever of the
//! operation and the timer finishes first decides the outcome:
//!
//! - operation first: its value is used and the timer is dropped unpolled,
//!   so no timeout side effect can follow.
//! - timer first: the caller gets [`Raced::TimedOut`] (or the fallback via
//!   [`DeadlineGuard::race`]) and the operation is left to settle on a
//!   background task, where its late value or panic is logged and discarded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a guarded operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raced<T> {
    Settled(T),
    TimedOut,
    /// The operation's task panicked or was cancelled before settling.
    Aborted(String),
}

type TimeoutHook = Arc<dyn Fn(&str, Duration) + Send + Sync>;

#[derive(Clone)]
pub struct DeadlineGuard {
    label: String,
    budget: Duration,
    on_timeout: Option<TimeoutHook>,
}

impl DeadlineGuard {
    pub fn new(label: impl Into<String>, budget: Duration) -> Self {
        Self {
            label: label.into(),
            budget,
            on_timeout: None,
        }
    }

    /// Run `hook` once each time this guard's timer wins a race.
    pub fn with_timeout_hook(mut self, hook: impl Fn(&str, Duration) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn budget_ms(&self) -> u64 {
        u64::try_from(self.budget.as_millis()).unwrap_or(u64::MAX)
    }

    fn timed_out(&self) {
        warn!(
            source = %self.label,
            budget_ms = self.budget_ms(),
            "Deadline fired, using fallback"
        );
        if let Some(hook) = &self.on_timeout {
            hook(&self.label, self.budget);
        }
    }

    /// Race `op` against this guard's budget.
    ///
    /// A zero budget returns [`Raced::TimedOut`] without starting `op`.
    pub async fn run<F>(&self, op: F) -> Raced<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.budget.is_zero() {
            self.timed_out();
            return Raced::TimedOut;
        }

        let mut task = tokio::spawn(op);

        tokio::select! {
            biased;

            joined = &mut task => match joined {
                Ok(value) => Raced::Settled(value),
                Err(e) => {
                    warn!(source = %self.label, error = %e, "Guarded operation aborted");
                    Raced::Aborted(e.to_string())
                }
            },

            () = tokio::time::sleep(self.budget) => {
                self.timed_out();
                let label = self.label.clone();
                tokio::spawn(async move {
                    match task.await {
                        Ok(_) => debug!(source = %label, "Late result discarded"),
                        Err(e) => debug!(source = %label, error = %e, "Late operation aborted"),
                    }
                });
                Raced::TimedOut
            }
        }
    }

    /// Race `op` against the budget, substituting `fallback` if the timer
    /// wins or the operation aborts.
    pub async fn race<F, T>(&self, op: F, fallback: T) -> T
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match self.run(op).await {
            Raced::Settled(value) => value,
            Raced::TimedOut | Raced::Aborted(_) => fallback,
        }
    }
}

/// One-shot form of [`DeadlineGuard::race`].
pub async fn race<F, T>(op: F, budget: Duration, fallback: T) -> T
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    DeadlineGuard::new("operation", budget).race(op, fallback).await
}
