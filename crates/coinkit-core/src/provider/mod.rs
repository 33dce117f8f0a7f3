//! Round-robin provider failover.
//!
//! A [`ProviderPool`] owns a fixed, non-empty list of endpoints and a
//! cursor. [`ProviderPool::perform`] runs an operation against the cursor's
//! endpoint and, on a network error, moves on to the next one, trying each
//! endpoint at most once per call. Successful endpoints stay current, so the
//! pool sticks with a working provider until it fails.
//!
//! The cursor is the only state shared between concurrent calls. It is a
//! single atomic index, advanced with compare-and-swap: two calls failing on
//! the same endpoint at once advance it once, and a lost step only costs
//! fairness, never correctness.

pub mod http;

pub use http::HttpEndpoint;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CoreError;

/// Anything a pool can route requests to.
pub trait Endpoint: Send + Sync {
    /// Base URL (or other identifier) used in logs and diagnostics.
    fn base_url(&self) -> &str;
}

pub struct ProviderPool<E> {
    providers: Vec<Arc<E>>,
    cursor: AtomicUsize,
}

impl<E: Endpoint> ProviderPool<E> {
    pub fn new(providers: Vec<E>) -> Result<Self, CoreError> {
        Self::from_shared(providers.into_iter().map(Arc::new).collect())
    }

    pub fn from_shared(providers: Vec<Arc<E>>) -> Result<Self, CoreError> {
        if providers.is_empty() {
            return Err(CoreError::Config(
                "provider pool needs at least one endpoint".to_owned(),
            ));
        }
        Ok(Self {
            providers,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Base URL of the endpoint the next request will use.
    pub fn host(&self) -> String {
        self.providers[self.current()].base_url().to_owned()
    }

    fn current(&self) -> usize {
        self.cursor.load(Ordering::Acquire) % self.providers.len()
    }

    /// Move the cursor past `from`, unless another call already did.
    fn advance_from(&self, from: usize) -> usize {
        let next = (from + 1) % self.providers.len();
        match self
            .cursor
            .compare_exchange(from, next, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => next,
            Err(moved) => moved % self.providers.len(),
        }
    }

    /// Run `op` with failover.
    ///
    /// Makes at most one attempt per endpoint. Success and non-network
    /// errors return immediately; if every attempt fails with a network
    /// error, the last error is returned.
    pub async fn perform<T, F, Fut>(&self, op: F) -> Result<T, CoreError>
    where
        F: Fn(Arc<E>) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut last_used: Option<usize> = None;
        let mut outcome = None;

        for attempt in 0..self.providers.len() {
            let mut index = self.current();
            if last_used == Some(index) {
                index = self.advance_from(index);
            }
            last_used = Some(index);

            let provider = Arc::clone(&self.providers[index]);
            debug!(attempt, host = provider.base_url(), "provider request");
            let result = op(provider).await;
            match result {
                Err(err) if err.is_network() => {
                    let next = (index + 1) % self.providers.len();
                    warn!(
                        current_host = self.providers[index].base_url(),
                        next_host = self.providers[next].base_url(),
                        error = %err,
                        "provider failed with a network error; switching"
                    );
                    outcome = Some(Err(err));
                }
                other => return other,
            }
        }

        outcome.unwrap_or_else(|| Err(CoreError::Config("provider pool is empty".to_owned())))
    }
}
