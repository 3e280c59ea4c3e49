//! # Protected Invocation
//!
//! The fault boundary around user code. [`run_protected`] hands its body a
//! [`Protected`] guard and an [`Exit`]:
//!
//! - `protected.enter(f)` runs `f` and captures any panic raised by it (or by
//!   code it calls before returning), routing it to the exit as a
//!   [`Fault`]. Nothing escapes to the caller of `run_protected`.
//! - `exit.exit(result)` is the single way the operation reports completion.
//!   It is backed by a [`Completion`] token that settles once; every later
//!   attempt is absorbed.
//!
//! A thrown fault and an explicit error completion are indistinguishable to
//! the caller: both come back as `Err(Fault)`.
//!
//! If every handle to the exit is dropped without settling (a reply interface
//! that was discarded, a spawned task that died), the waiter resolves with a
//! fault instead of waiting forever.

use crate::error::Fault;
use crate::response::Outcome;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Settle-once completion token.
///
/// Cloneable; the first `settle` across all clones delivers its value, later
/// ones return `false` and drop theirs.
pub struct Completion<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Completion<T> {
    pub fn channel() -> (Self, CompletionWaiter<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            CompletionWaiter { rx },
        )
    }

    /// Deliver `value` if nothing was delivered yet.
    pub fn settle(&self, value: T) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            Some(tx) => {
                // A dropped waiter means the result is no longer wanted
                if tx.send(value).is_err() {
                    debug!("completion settled after its waiter went away");
                }
                true
            }
            None => {
                debug!("completion already settled; ignoring repeated completion");
                false
            }
        }
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Receiving side of a [`Completion`].
pub struct CompletionWaiter<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> CompletionWaiter<T> {
    /// Wait for the settled value; `None` if every token was dropped unsettled.
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}

/// The completion path of a protected operation.
pub struct Exit<T> {
    completion: Completion<Result<T, Fault>>,
}

impl<T> Clone for Exit<T> {
    fn clone(&self) -> Self {
        Self {
            completion: self.completion.clone(),
        }
    }
}

impl<T> Exit<T> {
    pub fn exit(&self, result: Result<T, Fault>) -> bool {
        self.completion.settle(result)
    }

    pub fn ok(&self, value: T) -> bool {
        self.exit(Ok(value))
    }

    pub fn fail(&self, fault: Fault) -> bool {
        self.exit(Err(fault))
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completion.is_settled()
    }
}

/// Guard passed to the body of [`run_protected`].
pub struct Protected<T> {
    exit: Exit<T>,
}

impl<T> Protected<T> {
    /// Run `f` inside the fault boundary. Returns `false` if it panicked.
    pub fn enter<F: FnOnce()>(&self, f: F) -> bool {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => true,
            Err(panic) => {
                let fault = Fault::from_panic(panic);
                error!(
                    message = %fault.message(),
                    already_completed = self.exit.is_done(),
                    "Handler panicked - converted to fault"
                );
                self.exit.fail(fault);
                false
            }
        }
    }
}

/// Run `body` with a fault boundary and wait for its single completion.
pub async fn run_protected<T, B>(body: B) -> Result<T, Fault>
where
    B: FnOnce(&Protected<T>, Exit<T>),
{
    let (completion, waiter) = Completion::channel();
    let exit = Exit { completion };
    let protected = Protected { exit: exit.clone() };
    body(&protected, exit);
    drop(protected);

    waiter.wait().await.unwrap_or_else(|| {
        error!("Protected operation dropped its exit without completing");
        Err(Fault::bad_implementation(
            "Handler did not reply: reply interface dropped without a response",
        ))
    })
}

/// Once-only sink that a reply interface reports its outcome to.
///
/// The first call runs the wrapped function; later calls are ignored.
#[derive(Clone)]
pub struct Finalize {
    inner: Arc<FinalizeInner>,
}

struct FinalizeInner {
    fired: AtomicBool,
    sink: Box<dyn Fn(Outcome) + Send + Sync>,
}

impl Finalize {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(Outcome) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(FinalizeInner {
                fired: AtomicBool::new(false),
                sink: Box::new(sink),
            }),
        }
    }

    /// Wrap an [`Exit`] directly.
    pub fn to_exit(exit: Exit<crate::response::Response>) -> Self {
        Self::new(move |outcome| {
            exit.exit(outcome);
        })
    }

    pub fn call(&self, outcome: Outcome) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            debug!("finalize already called; ignoring");
            return false;
        }
        (self.inner.sink)(outcome);
        true
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_settles_once() {
        let (completion, waiter) = Completion::channel();
        let twin = completion.clone();
        assert!(completion.settle(1));
        assert!(!twin.settle(2));
        assert!(twin.is_settled());
        assert_eq!(waiter.wait().await, Some(1));
    }

    #[tokio::test]
    async fn test_dropped_completion_resolves_none() {
        let (completion, waiter) = Completion::<u8>::channel();
        drop(completion);
        assert_eq!(waiter.wait().await, None);
    }

    #[tokio::test]
    async fn test_panic_becomes_fault() {
        let result: Result<u8, Fault> = run_protected(|protected, _exit| {
            protected.enter(|| panic!("kaboom"));
        })
        .await;
        let fault = result.unwrap_err();
        assert!(fault.message().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_panic_after_exit_keeps_first_result() {
        let result = run_protected(|protected, exit| {
            protected.enter(move || {
                exit.ok(7);
                panic!("late");
            });
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_double_exit_is_absorbed() {
        let result = run_protected(|protected, exit| {
            protected.enter(move || {
                assert!(exit.ok("first"));
                assert!(!exit.fail(Fault::internal("second")));
            });
        })
        .await;
        assert_eq!(result, Ok("first"));
    }

    #[tokio::test]
    async fn test_async_exit_from_spawned_task() {
        let result = run_protected(|protected, exit| {
            protected.enter(move || {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    exit.ok(42u32);
                });
            });
        })
        .await;
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_finalize_runs_once() {
        use std::sync::atomic::AtomicUsize;
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let finalize = Finalize::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert!(finalize.call(Err(Fault::internal("a"))));
        assert!(!finalize.clone().call(Err(Fault::internal("b"))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
