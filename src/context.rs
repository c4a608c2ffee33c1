//! Per-request execution context.
//!
//! A [`Context`] answers four questions for a handler: when must I be done
//! ([`deadline`](Context::deadline)), has the caller given up
//! ([`done`](Context::done) / [`err`](Context::err)), and what did upstream
//! middleware attach ([`value`](Context::value)).
//!
//! Contexts are immutable. Deriving a child (`with_cancel`, `with_deadline`,
//! `with_value`) returns a new value that inherits everything from its parent;
//! cancelling a parent cancels every child derived from it.

use std::sync::Arc;
use std::time::Duration;

use http::Extensions;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context is no longer live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline, cancellation signal and typed key-value attachments.
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Arc<Extensions>,
}

/// Cancels the context it was created with, and all of that context's children.
#[derive(Clone, Debug)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

impl Context {
    /// The root context. Never cancelled, no deadline, no values.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: Arc::new(Extensions::new()),
        }
    }

    /// A child context plus the handle that cancels it.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let token = self.token.child_token();
        let handle = CancelHandle(token.clone());
        (Self { token, ..self.clone() }, handle)
    }

    /// A child context that expires at `deadline`, or at the parent's
    /// deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            values: Arc::clone(&self.values),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context carrying `value`, keyed by its type. A value of the
    /// same type on the parent is shadowed.
    pub fn with_value<T: Clone + Send + Sync + 'static>(&self, value: T) -> Self {
        let mut values = Extensions::clone(&self.values);
        values.insert(value);
        Self { values: Arc::new(values), ..self.clone() }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the context is cancelled or its deadline passes. Never
    /// resolves for [`background`](Context::background).
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {}
            },
            None => self.token.cancelled().await,
        }
    }

    /// `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
