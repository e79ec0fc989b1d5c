//! Shared work-admission pool.
//!
//! One [`Admission`] is sized once per fan-out run and shared by the outer
//! tenant loop and every nested [`scatter`](Admission::scatter) inside it.
//! Outer work waits for a permit; nested work only borrows a permit when one
//! is free right now and otherwise runs inline on the caller's task, which
//! already holds a permit. In-flight work therefore never exceeds the pool
//! size, and nested submission can never wait on permits held by its own
//! ancestors.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::error::WorkError;

#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl Admission {
    /// Create a pool admitting `size` concurrent pieces of work (at least 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a permit. Used for top-level work only.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, WorkError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkError::AdmissionClosed)
    }

    /// Take a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Run `f` over every item, in parallel where the pool has room.
    ///
    /// Results come back in item order. A panic in one item becomes
    /// [`WorkError::Panicked`] for that item only.
    pub async fn scatter<I, F, Fut, T>(&self, items: I, f: F) -> Vec<Result<T, WorkError>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, WorkError>> + Send + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        let mut slots: Vec<Option<Result<T, WorkError>>> = Vec::new();
        let mut spawned = JoinSet::new();

        for (idx, item) in items.into_iter().enumerate() {
            slots.push(None);
            match self.try_acquire() {
                Some(permit) => {
                    let f = f.clone();
                    spawned.spawn(async move {
                        let _permit = permit;
                        (idx, guarded(f(item)).await)
                    });
                }
                None => {
                    slots[idx] = Some(guarded(f(item)).await);
                }
            }
        }

        while let Some(joined) = spawned.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                // `guarded` already catches panics; this is cancellation.
                Err(e) => tracing::error!(error = %e, "Nested task did not complete"),
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(WorkError::Other("nested task cancelled".into()))))
            .collect()
    }
}

/// Await `fut`, converting a panic into [`WorkError::Panicked`].
pub(crate) async fn guarded<T, Fut>(fut: Fut) -> Result<T, WorkError>
where
    Fut: Future<Output = Result<T, WorkError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(WorkError::from_panic(payload)),
    }
}
