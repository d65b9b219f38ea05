#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and examples in rendezvous packages.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tokio::runtime;
use tokio::task::LocalSet;

/// How long a test body may run (in wall clock time) before the watchdog gives up on it.
const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs an async test body on a single-threaded runtime, guarded by a watchdog.
///
/// The body executes inside a [`LocalSet`] on a tokio current-thread runtime whose clock
/// starts paused. Timers therefore complete as soon as there is nothing else left to do,
/// which keeps time-based tests instant and deterministic.
///
/// The body runs on a dedicated thread. If it does not finish within 10 seconds of wall clock
/// time, the watchdog panics to prevent CI/build systems from hanging.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the body runs on the calling thread. This allows mutation testing to properly detect
/// hanging mutations.
///
/// # Panics
///
/// Panics if the body panics or exceeds the timeout (when not in mutation testing mode).
///
/// # Example
///
/// ```rust
/// use testing::run_local;
///
/// let value = run_local(async || {
///     tokio::task::spawn_local(async { 2 + 2 }).await.unwrap()
/// });
/// assert_eq!(value, 4);
/// ```
pub fn run_local<F, R>(test_fn: F) -> R
where
    F: AsyncFnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return block_on_local(test_fn);
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = block_on_local(test_fn);
        // If this fails, the watchdog has already timed out.
        drop(tx.send(result));
    });

    match rx.recv_timeout(WATCHDOG_TIMEOUT) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded 10-second timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            // Thread panicked, join it to get the panic.
            match test_handle.join() {
                Ok(()) => panic!("Test thread disconnected unexpectedly"),
                Err(e) => std::panic::resume_unwind(e),
            }
        }
    }
}

fn block_on_local<F, R>(test_fn: F) -> R
where
    F: AsyncFnOnce() -> R,
{
    let runtime = runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("test runtime must be constructible");

    LocalSet::new().block_on(&runtime, test_fn())
}

/// Lets every runnable local task make progress before returning.
///
/// With the paused test clock, a short sleep only completes once the runtime has nothing else
/// to do, so anything spawned or woken before this call has run up to its next suspension point.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
