//! Seam between this crate and the host runtime.
//!
//! Everything in this crate runs on one thread inside a [`tokio::task::LocalSet`]. The host
//! provides three capabilities, all wrapped here:
//!
//! * running a future as an independent unit of work without blocking the caller,
//! * deferring a future until the current unit of work has yielded,
//! * a monotonic clock with a way to sleep until a later tick (see [`crate::Query`]).
//!
//! Callbacks handed to us by users run behind a panic boundary: a panicking listener must not
//! take the rest of the dispatch machinery down with it.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use tracing::warn;

/// Runs `future` as a detached local task.
///
/// # Panics
///
/// Panics if called outside the context of a [`tokio::task::LocalSet`].
pub(crate) fn spawn<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    // Dropping the join handle detaches the task.
    drop(tokio::task::spawn_local(future));
}

/// Runs `future` as a detached local task that only starts once the spawning unit of work
/// and everything scheduled before it has had a chance to run.
///
/// # Panics
///
/// Panics if called outside the context of a [`tokio::task::LocalSet`].
pub(crate) fn defer<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    spawn(async move {
        tokio::task::yield_now().await;
        future.await;
    });
}

/// Drives a user-supplied future to completion, logging and swallowing any panic.
pub(crate) async fn run_isolated<F>(future: F, origin: &'static str)
where
    F: Future<Output = ()>,
{
    if let Err(payload) = AssertUnwindSafe(future).catch_unwind().await {
        report_panic(payload.as_ref(), origin);
    }
}

/// Invokes a user-supplied callback, logging and swallowing any panic.
pub(crate) fn call_isolated<F>(callback: F, origin: &'static str)
where
    F: FnOnce(),
{
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        report_panic(payload.as_ref(), origin);
    }
}

fn report_panic(payload: &(dyn Any + Send), origin: &'static str) {
    let message = format_panic_payload(payload);
    warn!(panic_message = %message, origin, "callback panicked");
}

/// Extracts a human-readable message from a panic payload.
pub(crate) fn format_panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use testing::{run_local, settle};

    use super::*;

    #[test]
    fn format_panic_payload_handles_str() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(format_panic_payload(payload.as_ref()), "static message");
    }

    #[test]
    fn format_panic_payload_handles_string() {
        let payload: Box<dyn Any + Send> = Box::new("owned message".to_string());
        assert_eq!(format_panic_payload(payload.as_ref()), "owned message");
    }

    #[test]
    fn format_panic_payload_handles_unknown() {
        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(
            format_panic_payload(payload.as_ref()),
            "unknown panic payload"
        );
    }

    #[test]
    fn spawn_does_not_run_inline() {
        run_local(async || {
            let ran = Rc::new(Cell::new(false));

            let ran_clone = Rc::clone(&ran);
            spawn(async move { ran_clone.set(true) });

            assert!(!ran.get());
            settle().await;
            assert!(ran.get());
        });
    }

    #[test]
    fn deferred_work_runs_after_work_spawned_later() {
        let order = run_local(async || {
            let order = Rc::new(RefCell::new(Vec::new()));

            let deferred_order = Rc::clone(&order);
            defer(async move { deferred_order.borrow_mut().push("deferred") });

            let spawned_order = Rc::clone(&order);
            spawn(async move { spawned_order.borrow_mut().push("spawned") });

            settle().await;
            order.take()
        });

        assert_eq!(order, vec!["spawned", "deferred"]);
    }

    #[test]
    fn isolated_panics_are_swallowed() {
        run_local(async || {
            let fail = true;

            call_isolated(
                || {
                    if fail {
                        panic!("sync boom");
                    }
                },
                "test",
            );

            run_isolated(
                async {
                    if fail {
                        panic!("async boom");
                    }
                },
                "test",
            )
            .await;
        });
    }
}
