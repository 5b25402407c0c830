//! Lifecycle tracking for a single in-flight asynchronous operation.
//!
//! An [`OperationController`] owns the idle/pending/resolved/rejected state
//! for one operation at a time and guarantees that a settlement arriving
//! after [`OperationController::dispose`] never mutates state. The underlying
//! operation is not cancelled; only its effect is suppressed.

use std::{future::Future, sync::Arc};

use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

const STATE_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle phase of the tracked operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Idle,
    Pending,
    Resolved,
    Rejected,
}

/// One committed controller state. Replaced wholesale on every transition;
/// `data` is populated iff `Resolved`, `error` iff `Rejected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationState<T, E> {
    pub status: OperationStatus,
    pub data: Option<T>,
    pub error: Option<E>,
}

impl<T, E> OperationState<T, E> {
    /// Initial state with the given status and both value fields unset.
    pub fn seeded(status: OperationStatus) -> Self {
        Self {
            status,
            data: None,
            error: None,
        }
    }

    pub fn pending() -> Self {
        Self::seeded(OperationStatus::Pending)
    }

    pub fn resolved(data: T) -> Self {
        Self {
            status: OperationStatus::Resolved,
            data: Some(data),
            error: None,
        }
    }

    pub fn rejected(error: E) -> Self {
        Self {
            status: OperationStatus::Rejected,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Resolved | OperationStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("operation tracked after controller disposal")]
    Disposed,
}

struct ControllerInner<T, E> {
    state: OperationState<T, E>,
    live: bool,
}

/// Tracks the lifecycle of one asynchronous operation at a time.
///
/// Tracking a new operation while a previous one is still pending replaces
/// the exposed state with a fresh `Pending` but does not cancel the older
/// operation; whichever settlement arrives last wins. Callers that need to
/// discriminate must do so themselves.
pub struct OperationController<T, E> {
    inner: Mutex<ControllerInner<T, E>>,
    states: broadcast::Sender<OperationState<T, E>>,
}

impl<T, E> OperationController<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(seed: OperationStatus) -> Arc<Self> {
        let (states, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(ControllerInner {
                state: OperationState::seeded(seed),
                live: true,
            }),
            states,
        })
    }

    /// The most recently committed state.
    pub async fn snapshot(&self) -> OperationState<T, E> {
        self.inner.lock().await.state.clone()
    }

    /// Every committed transition is published here, in commit order.
    pub fn subscribe_states(&self) -> broadcast::Receiver<OperationState<T, E>> {
        self.states.subscribe()
    }

    /// Begins tracking `operation`: commits `Pending` immediately, then
    /// settles to `Resolved`/`Rejected` when the operation completes. If the
    /// controller was disposed in the meantime, the settlement is discarded
    /// without touching state.
    ///
    /// Returns the settlement task's handle so owners can await teardown.
    /// Calling this after [`dispose`](Self::dispose) is a lifecycle bug in
    /// the caller and fails with [`ControllerError::Disposed`].
    pub async fn track<F>(
        self: &Arc<Self>,
        operation: F,
    ) -> Result<JoinHandle<()>, ControllerError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        {
            let mut guard = self.inner.lock().await;
            if !guard.live {
                warn!("track called after dispose; refusing to start a new operation");
                return Err(ControllerError::Disposed);
            }
            Self::commit(&mut guard, &self.states, OperationState::pending());
        }

        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let settled = operation.await;
            let mut guard = controller.inner.lock().await;
            if !guard.live {
                debug!("discarding settlement for a disposed controller");
                return;
            }
            let next = match settled {
                Ok(data) => OperationState::resolved(data),
                Err(error) => OperationState::rejected(error),
            };
            Self::commit(&mut guard, &controller.states, next);
        }))
    }

    /// Marks the owning consumer as retired. Idempotent. Settlements of
    /// already-tracked operations are discarded from this point on.
    pub async fn dispose(&self) {
        let mut guard = self.inner.lock().await;
        if guard.live {
            guard.live = false;
            debug!("controller disposed; later settlements will be discarded");
        }
    }

    fn commit(
        guard: &mut ControllerInner<T, E>,
        states: &broadcast::Sender<OperationState<T, E>>,
        next: OperationState<T, E>,
    ) {
        guard.state = next.clone();
        let _ = states.send(next);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
