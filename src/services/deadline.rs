use std::{future::Future, time::Duration};

use tokio::time::{Instant, timeout_at};

use crate::error::{AppError, AppResult};

/// Caller-supplied bound on how long a workflow may keep calling the store.
///
/// Every store call inside a workflow goes through [`Deadline::guard`]; once
/// the instant passes the pending call is dropped and the workflow returns
/// [`AppError::Cancelled`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(duration: Duration) -> Self {
        Self {
            at: Some(Instant::now() + duration),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    pub async fn guard<F: Future>(&self, fut: F) -> AppResult<F::Output> {
        match self.at {
            Some(at) => timeout_at(at, fut).await.map_err(|_| AppError::Cancelled),
            None => Ok(fut.await),
        }
    }
}
