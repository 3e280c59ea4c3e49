//! Response commit protocol.
//!
//! ```text
//! Pending ──hold()──▶ Held ──send()/drop──▶ Preparing ──▶ Finalized
//!    │                                          ▲
//!    └──next tick / drop unheld──▶ AutoFinalizing ─┘
//! ```
//!
//! A [`PendingResponse`] is returned to the code that replied. The response
//! can be held only until the scheduler gets control back: opening it spawns
//! a deferred continuation that yields once and then auto-commits whatever is
//! still pending. Dropping the handle unheld commits right away (the only
//! path when no runtime is running). Holding hands out the single
//! [`HeldResponse`] capability; committing then waits for `send()` (or for
//! the capability to be dropped, so a forgotten send cannot hang the
//! request).
//!
//! Committing runs the response's preparation step at most once. Steps are
//! spawned on the current tokio runtime; responses without one finalize
//! synchronously.

use super::core::{Outcome, Response};
use crate::error::Fault;
use crate::protect::Finalize;
use crate::request::Request;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    Held,
    AutoFinalizing,
    Preparing,
    Finalized,
}

struct CommitTarget {
    request: Request,
    finalize: Finalize,
}

struct CommitCell {
    state: CommitState,
    response: Option<Response>,
    target: Option<CommitTarget>,
}

type SharedCell = Arc<Mutex<CommitCell>>;

/// A produced response that has not been committed yet.
pub struct PendingResponse {
    cell: SharedCell,
}

impl PendingResponse {
    pub(crate) fn open(response: Response, request: Request, finalize: Finalize) -> Self {
        let cell = Arc::new(Mutex::new(CommitCell {
            state: CommitState::Pending,
            response: Some(response),
            target: Some(CommitTarget { request, finalize }),
        }));
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let deferred = Arc::clone(&cell);
            handle.spawn(async move {
                tokio::task::yield_now().await;
                commit(&deferred, CommitState::Pending, CommitState::AutoFinalizing);
            });
        }
        Self { cell }
    }

    /// Handle for an outcome that was delivered without going through the
    /// protocol (faults, close markers, proxied replies).
    pub(crate) fn finalized() -> Self {
        Self {
            cell: Arc::new(Mutex::new(CommitCell {
                state: CommitState::Finalized,
                response: None,
                target: None,
            })),
        }
    }

    #[must_use]
    pub fn state(&self) -> CommitState {
        self.cell.lock().state
    }

    /// Keep the response open until [`HeldResponse::send`].
    ///
    /// Only valid while pending; a second call returns `None` and the first
    /// capability stays the only one.
    pub fn hold(&self) -> Option<HeldResponse> {
        let mut cell = self.cell.lock();
        if cell.state != CommitState::Pending {
            debug!(state = ?cell.state, "hold() ignored: response is not pending");
            return None;
        }
        cell.state = CommitState::Held;
        Some(HeldResponse {
            cell: Arc::clone(&self.cell),
        })
    }

    /// Mutate the response while it is still uncommitted.
    pub fn update<R>(&self, f: impl FnOnce(&mut Response) -> R) -> Option<R> {
        self.cell.lock().response.as_mut().map(f)
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        commit(&self.cell, CommitState::Pending, CommitState::AutoFinalizing);
    }
}

/// The `send()` capability granted by [`PendingResponse::hold`].
pub struct HeldResponse {
    cell: SharedCell,
}

impl HeldResponse {
    #[must_use]
    pub fn state(&self) -> CommitState {
        self.cell.lock().state
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Response) -> R) -> Option<R> {
        self.cell.lock().response.as_mut().map(f)
    }

    /// Commit the held response.
    pub fn send(self) {
        commit(&self.cell, CommitState::Held, CommitState::Preparing);
    }
}

impl Drop for HeldResponse {
    fn drop(&mut self) {
        // No-op after send()
        commit(&self.cell, CommitState::Held, CommitState::Preparing);
    }
}

fn commit(cell: &SharedCell, from: CommitState, via: CommitState) {
    let (response, target) = {
        let mut guard = cell.lock();
        if guard.state != from {
            return;
        }
        guard.state = via;
        match (guard.response.take(), guard.target.take()) {
            (Some(response), Some(target)) => (response, target),
            _ => {
                guard.state = CommitState::Finalized;
                return;
            }
        }
    };
    debug!(from = ?from, via = ?via, "committing response");
    prepare(Arc::clone(cell), response, target);
}

fn prepare(cell: SharedCell, mut response: Response, target: CommitTarget) {
    cell.lock().state = CommitState::Preparing;

    let Some(step) = response.take_preparation() else {
        finish(&cell, &target.finalize, Ok(response));
        return;
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let CommitTarget { request, finalize } = target;
            handle.spawn(async move {
                let outcome = step(response, request).await;
                finish(&cell, &finalize, outcome);
            });
        }
        Err(err) => {
            error!(error = %err, "Response preparation requires a running runtime");
            finish(
                &cell,
                &target.finalize,
                Err(Fault::bad_implementation(
                    "Response preparation requires a running runtime",
                )),
            );
        }
    }
}

fn finish(cell: &SharedCell, finalize: &Finalize, outcome: Outcome) {
    cell.lock().state = CommitState::Finalized;
    finalize.call(outcome);
}
