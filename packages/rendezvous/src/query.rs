use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{Deferred, Promise, QueryError, runtime};

const DEFAULT_RESPONDER_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

type Responder<A, T, E> = Rc<dyn Fn(Deferred<T, E>, A) -> LocalBoxFuture<'static, ()>>;

/// How long a request waits for a responder and how often it checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct QueryOptions {
    pub(crate) responder_timeout: Duration,
    pub(crate) poll_interval: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            responder_timeout: DEFAULT_RESPONDER_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl QueryOptions {
    pub(crate) fn with_poll_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "poll interval must be greater than zero");

        self.poll_interval = interval;
        self
    }
}

struct QueryInner<A, T, E> {
    responder: RefCell<Option<Responder<A, T, E>>>,
    options: QueryOptions,
}

/// A single-responder asynchronous request/response rendezvous.
///
/// One party installs a responder with [`on_request()`][Self::on_request] or
/// [`on_request_async()`][Self::on_request_async]; any number of parties call
/// [`request()`][Self::request] and get back a [`Promise`] that the responder settles through
/// the [`Deferred`] it is handed.
///
/// There is at most one responder at a time; installing another one replaces it.
///
/// A request made while no responder is installed waits for one to appear, checking every
/// [`poll_interval`][QueryBuilder::poll_interval], for up to
/// [`responder_timeout`][QueryBuilder::responder_timeout]. If none appears, the request
/// returns a promise rejected with [`QueryError::Timeout`]. That is the only timeout: a
/// responder that never settles its deferred leaves the promise pending forever.
///
/// The responder runs as its own local task. If it panics, the promise is rejected with
/// [`QueryError::ResponderPanicked`] unless the responder had already settled it.
///
/// The query is a cheaply cloneable handle; all clones share the same responder.
///
/// # Panics
///
/// [`request()`][Self::request] panics if called outside the context of a
/// [`tokio::task::LocalSet`].
///
/// # Example
///
/// ```rust
/// use rendezvous::Query;
/// # use tokio::task::LocalSet;
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
/// # LocalSet::new().block_on(&runtime, async {
/// let sum = Query::<(u32, u32), u32>::new();
///
/// sum.on_request(|deferred, (a, b)| deferred.resolve(a + b));
///
/// let promise = sum.request((1, 2)).await;
/// assert_eq!(promise.wait().await, Ok(3));
/// # });
/// ```
pub struct Query<A, T, E = QueryError> {
    inner: Rc<QueryInner<A, T, E>>,
}

impl<A, T, E> Query<A, T, E>
where
    A: 'static,
    T: 'static,
    E: From<QueryError> + 'static,
{
    /// Creates a query with default settings and no responder.
    ///
    /// Use [`Query::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the query.
    #[must_use]
    pub fn builder() -> QueryBuilder<A, T, E> {
        QueryBuilder::new()
    }

    pub(crate) fn with_options(options: QueryOptions) -> Self {
        Self {
            inner: Rc::new(QueryInner {
                responder: RefCell::new(None),
                options,
            }),
        }
    }

    /// Installs `responder` as the only responder, replacing any previous one.
    ///
    /// The responder receives the deferred of a fresh promise and the request arguments. It is
    /// expected to settle the deferred exactly once.
    pub fn on_request<F>(&self, responder: F)
    where
        F: Fn(Deferred<T, E>, A) + 'static,
    {
        let responder = Rc::new(responder);

        self.install(Rc::new(move |deferred: Deferred<T, E>, args: A| {
            let responder = Rc::clone(&responder);
            async move { responder(deferred, args) }.boxed_local()
        }));
    }

    /// Installs a responder that may suspend before settling the request, replacing any previous
    /// responder.
    pub fn on_request_async<F, Fut>(&self, responder: F)
    where
        F: Fn(Deferred<T, E>, A) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let responder = Rc::new(responder);

        self.install(Rc::new(move |deferred: Deferred<T, E>, args: A| {
            let responder = Rc::clone(&responder);
            async move { responder(deferred, args).await }.boxed_local()
        }));
    }

    /// Whether a responder is currently installed.
    #[must_use]
    pub fn has_responder(&self) -> bool {
        self.inner.responder.borrow().is_some()
    }

    /// Sends a request to the responder and returns the promise it will settle.
    ///
    /// Returns as soon as the responder has been dispatched, without waiting for it to run. If
    /// no responder is installed, first waits for one as described in the
    /// [type-level documentation][Self].
    pub async fn request(&self, args: A) -> Promise<T, E> {
        let Some(responder) = self.wait_for_responder().await else {
            debug!(
                timeout = ?self.inner.options.responder_timeout,
                "no responder was installed in time; rejecting request"
            );

            return Promise::rejected(QueryError::Timeout.into());
        };

        let deferred = Deferred::new();
        let promise = deferred.promise();

        runtime::spawn(respond(responder, deferred, args));

        promise
    }

    async fn wait_for_responder(&self) -> Option<Responder<A, T, E>> {
        let started = Instant::now();

        loop {
            if let Some(responder) = self.inner.responder.borrow().as_ref() {
                return Some(Rc::clone(responder));
            }

            if started.elapsed() >= self.inner.options.responder_timeout {
                return None;
            }

            tokio::time::sleep(self.inner.options.poll_interval).await;
        }
    }

    fn install(&self, responder: Responder<A, T, E>) {
        let previous = self.inner.responder.replace(Some(responder));

        if previous.is_some() {
            debug!("replacing query responder");
        }
    }
}

/// Runs one responder invocation, turning a panic into a rejection of the request.
async fn respond<A, T, E>(responder: Responder<A, T, E>, deferred: Deferred<T, E>, args: A)
where
    A: 'static,
    T: 'static,
    E: From<QueryError> + 'static,
{
    let promise = deferred.promise();

    let result = AssertUnwindSafe(async move { responder(deferred, args).await })
        .catch_unwind()
        .await;

    if let Err(payload) = result {
        let message = runtime::format_panic_payload(payload.as_ref());
        warn!(panic_message = %message, "query responder panicked");

        // A responder that settled before panicking keeps its outcome.
        promise.reject_if_pending(QueryError::ResponderPanicked { message }.into());
    }
}

impl<A, T, E> Clone for Query<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A, T, E> Default for Query<A, T, E>
where
    A: 'static,
    T: 'static,
    E: From<QueryError> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, T, E> fmt::Debug for Query<A, T, E> {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("has_responder", &self.inner.responder.borrow().is_some())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Builder for creating a [`Query`] with custom configuration.
#[must_use]
pub struct QueryBuilder<A, T, E> {
    options: QueryOptions,
    _types: PhantomData<fn() -> (A, T, E)>,
}

impl<A, T, E> QueryBuilder<A, T, E>
where
    A: 'static,
    T: 'static,
    E: From<QueryError> + 'static,
{
    fn new() -> Self {
        Self {
            options: QueryOptions::default(),
            _types: PhantomData,
        }
    }

    /// How long a request waits for a responder to be installed before it is rejected with
    /// [`QueryError::Timeout`].
    ///
    /// Defaults to 3 seconds. A zero timeout rejects immediately when no responder is installed.
    pub fn responder_timeout(mut self, timeout: Duration) -> Self {
        self.options.responder_timeout = timeout;
        self
    }

    /// How often a waiting request checks whether a responder has been installed.
    ///
    /// Defaults to 10 milliseconds.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_poll_interval(interval);
        self
    }

    /// Creates the query.
    #[must_use]
    pub fn build(self) -> Query<A, T, E> {
        Query::with_options(self.options)
    }
}

impl<A, T, E> fmt::Debug for QueryBuilder<A, T, E> {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::Cell;

    use static_assertions::assert_not_impl_any;
    use testing::{run_local, settle};

    use super::*;
    use crate::PromiseState;

    assert_not_impl_any!(Query<u32, u32>: Send, Sync);

    #[test]
    fn responder_settles_request() {
        let result = run_local(async || {
            let query = Query::<(u32, u32), u32>::new();
            query.on_request(|deferred, (a, b)| deferred.resolve(a.wrapping_add(b)));

            query.request((2, 5)).await.wait().await
        });

        assert_eq!(result, Ok(7));
    }

    #[test]
    fn request_returns_before_responder_runs() {
        run_local(async || {
            let query = Query::<u32, u32>::new();
            let ran = Rc::new(Cell::new(false));

            let responder_ran = Rc::clone(&ran);
            query.on_request(move |deferred, value| {
                responder_ran.set(true);
                deferred.resolve(value);
            });

            let promise = query.request(1).await;
            assert!(!ran.get());
            assert_eq!(promise.state(), PromiseState::Pending);

            settle().await;
            assert!(ran.get());
            assert_eq!(promise.state(), PromiseState::Resolved);
        });
    }

    #[test]
    fn request_waits_for_late_responder() {
        run_local(async || {
            let query = Query::<u32, u32>::new();

            let late_query = query.clone();
            runtime::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                late_query.on_request(|deferred, value| deferred.resolve(value.wrapping_mul(2)));
            });

            let started = Instant::now();
            let promise = query.request(21).await;

            assert!(started.elapsed() >= Duration::from_secs(1));
            assert!(started.elapsed() < DEFAULT_RESPONDER_TIMEOUT);
            assert_eq!(promise.wait().await, Ok(42));
        });
    }

    #[test]
    fn request_without_responder_times_out() {
        run_local(async || {
            let query = Query::<u32, u32>::new();

            let started = Instant::now();
            let promise = query.request(1).await;

            assert!(started.elapsed() >= DEFAULT_RESPONDER_TIMEOUT);
            assert_eq!(promise.state(), PromiseState::Rejected);
            assert_eq!(promise.wait().await, Err(QueryError::Timeout));
        });
    }

    #[test]
    fn responder_timeout_is_configurable() {
        run_local(async || {
            let query = Query::<u32, u32>::builder()
                .responder_timeout(Duration::from_millis(50))
                .poll_interval(Duration::from_millis(5))
                .build();

            let started = Instant::now();
            let promise = query.request(1).await;

            assert!(started.elapsed() < Duration::from_secs(1));
            assert_eq!(promise.wait().await, Err(QueryError::Timeout));
        });
    }

    #[test]
    #[should_panic]
    fn zero_poll_interval_is_rejected() {
        drop(Query::<u32, u32>::builder().poll_interval(Duration::ZERO));
    }

    #[test]
    fn last_responder_wins() {
        let result = run_local(async || {
            let query = Query::<u32, &'static str>::new();
            query.on_request(|deferred, _| deferred.resolve("first"));
            query.on_request(|deferred, _| deferred.resolve("second"));

            query.request(0).await.wait().await
        });

        assert_eq!(result, Ok("second"));
    }

    #[test]
    fn async_responder_can_suspend() {
        run_local(async || {
            let query = Query::<u64, u64>::new();
            query.on_request_async(|deferred, seconds| {
                let delay = Duration::from_secs(seconds);

                async move {
                    tokio::time::sleep(delay).await;
                    deferred.resolve(seconds);
                }
            });

            let started = Instant::now();
            let promise = query.request(60).await;
            assert!(started.elapsed() < Duration::from_secs(1));

            assert_eq!(promise.wait().await, Ok(60));
            assert!(started.elapsed() >= Duration::from_secs(60));
        });
    }

    #[test]
    fn panicking_responder_rejects_request() {
        let result = run_local(async || {
            let query = Query::<u32, u32>::new();
            query.on_request(|_, value| {
                if value > 0 {
                    panic!("responder failure");
                }
            });

            query.request(1).await.wait().await
        });

        assert_eq!(
            result,
            Err(QueryError::ResponderPanicked {
                message: "responder failure".to_string()
            })
        );
    }

    #[test]
    fn panic_after_settling_keeps_outcome() {
        let result = run_local(async || {
            let query = Query::<u32, u32>::new();
            query.on_request(|deferred, value| {
                deferred.resolve(value);

                if value > 0 {
                    panic!("too late to matter");
                }
            });

            query.request(4).await.wait().await
        });

        assert_eq!(result, Ok(4));
    }

    #[test]
    fn unsettled_request_stays_pending() {
        run_local(async || {
            let query = Query::<u32, u32>::new();
            query.on_request(|_, _| {});

            let promise = query.request(1).await;
            tokio::time::sleep(Duration::from_secs(60)).await;

            assert_eq!(promise.state(), PromiseState::Pending);
        });
    }

    #[test]
    fn has_responder_reflects_installation() {
        let query = Query::<u32, u32>::new();
        assert!(!query.has_responder());

        query.on_request(|deferred, value| deferred.resolve(value));
        assert!(query.clone().has_responder());
    }
}
