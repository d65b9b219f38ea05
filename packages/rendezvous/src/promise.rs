use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::{Outcome, PromiseState, runtime};

type ValueCallback<X> = Box<dyn FnOnce(&X)>;
type SettleCallback = Box<dyn FnOnce()>;

/// Picks the payload a callback list cares about out of an outcome.
type Projection<T, E, X> = fn(&Outcome<T, E>) -> Option<&X>;

/// Picks one of the pending callback lists.
type ListSelector<T, E, X> = fn(&mut Reactions<T, E>) -> &mut Vec<ValueCallback<X>>;

/// Everything registered on a promise while it is still pending.
struct Reactions<T, E> {
    on_resolve: Vec<ValueCallback<T>>,
    on_reject: Vec<ValueCallback<E>>,
    on_cancel: Vec<ValueCallback<E>>,
    on_settle: Vec<SettleCallback>,
    awaiters: Vec<Waker>,
}

impl<T, E> Reactions<T, E> {
    fn on_resolve(&mut self) -> &mut Vec<ValueCallback<T>> {
        &mut self.on_resolve
    }

    fn on_reject(&mut self) -> &mut Vec<ValueCallback<E>> {
        &mut self.on_reject
    }

    fn on_cancel(&mut self) -> &mut Vec<ValueCallback<E>> {
        &mut self.on_cancel
    }
}

impl<T, E> Default for Reactions<T, E> {
    fn default() -> Self {
        Self {
            on_resolve: Vec::new(),
            on_reject: Vec::new(),
            on_cancel: Vec::new(),
            on_settle: Vec::new(),
            awaiters: Vec::new(),
        }
    }
}

enum Slot<T, E> {
    Pending(Reactions<T, E>),
    Settled(Rc<Outcome<T, E>>),
}

/// State shared between a [`Promise`] and its [`Deferred`][crate::Deferred].
pub(crate) struct PromiseCore<T, E> {
    slot: RefCell<Slot<T, E>>,

    /// Set once the settle notification (the `finally()` callbacks) has been scheduled.
    settle_notified: Cell<bool>,
}

impl<T, E> PromiseCore<T, E>
where
    T: 'static,
    E: 'static,
{
    pub(crate) fn pending() -> Self {
        Self {
            slot: RefCell::new(Slot::Pending(Reactions::default())),
            settle_notified: Cell::new(false),
        }
    }

    fn settled(outcome: Outcome<T, E>) -> Self {
        Self {
            slot: RefCell::new(Slot::Settled(Rc::new(outcome))),
            settle_notified: Cell::new(true),
        }
    }

    pub(crate) fn state(&self) -> PromiseState {
        match &*self.slot.borrow() {
            Slot::Pending(_) => PromiseState::Pending,
            Slot::Settled(outcome) => outcome.state(),
        }
    }

    /// Moves the promise out of the pending state.
    ///
    /// Returns `false` without touching anything if the promise is already settled.
    pub(crate) fn settle(&self, outcome: Outcome<T, E>) -> bool {
        let outcome = Rc::new(outcome);

        let reactions = {
            let mut slot = self.slot.borrow_mut();

            let Slot::Pending(reactions) = &mut *slot else {
                return false;
            };

            let reactions = mem::take(reactions);
            *slot = Slot::Settled(Rc::clone(&outcome));
            reactions
        };

        let Reactions {
            on_resolve,
            on_reject,
            on_cancel,
            on_settle,
            awaiters,
        } = reactions;

        // Only one list is ever drained; the callbacks in the other two are dropped unseen.
        match &*outcome {
            Outcome::Resolved(_) => dispatch_all(&outcome, Outcome::resolved, on_resolve),
            Outcome::Rejected(_) => dispatch_all(&outcome, Outcome::rejected, on_reject),
            Outcome::Canceled(_) => dispatch_all(&outcome, Outcome::canceled, on_cancel),
        }

        for waker in awaiters {
            waker.wake();
        }

        self.notify_settled(on_settle);
        true
    }

    /// Schedules the `finally()` callbacks of a settlement.
    ///
    /// They are deferred, so they start only after the outcome callbacks dispatched by the same
    /// settlement.
    fn notify_settled(&self, callbacks: Vec<SettleCallback>) {
        if self.settle_notified.replace(true) || callbacks.is_empty() {
            return;
        }

        runtime::defer(async move {
            for callback in callbacks {
                runtime::call_isolated(callback, "promise finally callback");
            }
        });
    }

    fn register<X>(
        &self,
        select: ListSelector<T, E, X>,
        project: Projection<T, E, X>,
        callback: ValueCallback<X>,
    ) where
        X: 'static,
    {
        match &mut *self.slot.borrow_mut() {
            Slot::Pending(reactions) => select(reactions).push(callback),
            Slot::Settled(outcome) => {
                // Settled the other way: this callback will never be called.
                if project(outcome).is_some() {
                    dispatch(Rc::clone(outcome), project, callback);
                }
            }
        }
    }

    fn register_finally(&self, callback: SettleCallback) {
        match &mut *self.slot.borrow_mut() {
            Slot::Pending(reactions) => reactions.on_settle.push(callback),
            Slot::Settled(_) => runtime::spawn(async move {
                runtime::call_isolated(callback, "promise finally callback");
            }),
        }
    }

    fn poll_outcome(&self, waker: &Waker) -> Option<Rc<Outcome<T, E>>> {
        match &mut *self.slot.borrow_mut() {
            Slot::Pending(reactions) => {
                if !reactions.awaiters.iter().any(|w| w.will_wake(waker)) {
                    reactions.awaiters.push(waker.clone());
                }

                None
            }
            Slot::Settled(outcome) => Some(Rc::clone(outcome)),
        }
    }

    fn outcome(&self) -> Option<Rc<Outcome<T, E>>> {
        match &*self.slot.borrow() {
            Slot::Pending(_) => None,
            Slot::Settled(outcome) => Some(Rc::clone(outcome)),
        }
    }
}

fn dispatch_all<T, E, X>(
    outcome: &Rc<Outcome<T, E>>,
    project: Projection<T, E, X>,
    callbacks: Vec<ValueCallback<X>>,
) where
    T: 'static,
    E: 'static,
    X: 'static,
{
    for callback in callbacks {
        dispatch(Rc::clone(outcome), project, callback);
    }
}

/// Runs one outcome callback as its own local task.
fn dispatch<T, E, X>(
    outcome: Rc<Outcome<T, E>>,
    project: Projection<T, E, X>,
    callback: ValueCallback<X>,
) where
    T: 'static,
    E: 'static,
    X: 'static,
{
    runtime::spawn(async move {
        if let Some(payload) = project(&outcome) {
            runtime::call_isolated(|| callback(payload), "promise callback");
        }
    });
}

/// The consumer side of a single-assignment asynchronous result.
///
/// A promise starts out pending and is settled exactly once, by its paired
/// [`Deferred`][crate::Deferred], into one of three outcomes: resolved with a `T`, rejected with
/// an `E` or canceled with an `E`. Once settled, it never changes again.
///
/// Callbacks registered with [`and_then()`][Self::and_then], [`catch()`][Self::catch],
/// [`canceled()`][Self::canceled] and [`finally()`][Self::finally] never run inline. Callbacks
/// registered before settlement run once the promise settles the matching way; callbacks
/// registered after settlement are dispatched right away with the stored payload. Callbacks
/// for an outcome that did not happen are dropped without being called.
///
/// `finally()` callbacks run for every outcome and always after the outcome-specific callbacks
/// of the same settlement.
///
/// The registration methods return the promise itself so calls can be chained. This only
/// affects registration order; it does not derive new promises.
///
/// The promise is a cheaply cloneable handle; all clones observe the same settlement.
///
/// # Panics
///
/// Callbacks run as local tasks, so registering a callback on a settled promise (or settling a
/// promise that has callbacks) panics outside the context of a [`tokio::task::LocalSet`].
///
/// # Example
///
/// ```rust
/// use rendezvous::Deferred;
/// # use tokio::task::LocalSet;
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # LocalSet::new().block_on(&runtime, async {
/// let deferred = Deferred::<u32, String>::new();
/// let promise = deferred.promise();
///
/// promise
///     .and_then(|value| println!("resolved with {value}"))
///     .catch(|reason| println!("rejected: {reason}"))
///     .finally(|| println!("done"));
///
/// deferred.resolve(42);
///
/// assert_eq!(promise.wait().await, Ok(42));
/// # });
/// ```
pub struct Promise<T, E> {
    core: Rc<PromiseCore<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: 'static,
    E: 'static,
{
    pub(crate) fn from_core(core: Rc<PromiseCore<T, E>>) -> Self {
        Self { core }
    }

    /// Rejects the promise without going through its deferred, which the caller no longer has.
    ///
    /// Returns `false` if the promise had already settled.
    pub(crate) fn reject_if_pending(&self, reason: E) -> bool {
        self.core.settle(Outcome::Rejected(reason))
    }

    /// Creates a promise that is already rejected with `reason`.
    ///
    /// There is no resolved counterpart; resolution always goes through a
    /// [`Deferred`][crate::Deferred].
    #[must_use]
    pub fn rejected(reason: E) -> Self {
        Self::from_core(Rc::new(PromiseCore::settled(Outcome::Rejected(reason))))
    }

    /// Where the promise is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        self.core.state()
    }

    /// The outcome of the promise, if it has settled, without suspending.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<T, E>>
    where
        T: Clone,
        E: Clone,
    {
        self.core.outcome().map(|outcome| (*outcome).clone())
    }

    /// Registers a callback for when the promise is resolved.
    pub fn and_then<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&T) + 'static,
    {
        self.core
            .register(Reactions::on_resolve, Outcome::resolved, Box::new(callback));
        self
    }

    /// Registers a callback for when the promise is rejected.
    pub fn catch<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&E) + 'static,
    {
        self.core
            .register(Reactions::on_reject, Outcome::rejected, Box::new(callback));
        self
    }

    /// Registers a callback for when the promise is canceled.
    pub fn canceled<F>(&self, callback: F) -> &Self
    where
        F: FnOnce(&E) + 'static,
    {
        self.core
            .register(Reactions::on_cancel, Outcome::canceled, Box::new(callback));
        self
    }

    /// Registers a callback for when the promise settles, whatever the outcome.
    pub fn finally<F>(&self, callback: F) -> &Self
    where
        F: FnOnce() + 'static,
    {
        self.core.register_finally(Box::new(callback));
        self
    }

    /// Suspends until the promise settles.
    ///
    /// Resolves to `Ok(value)` if the promise was resolved and to `Err(reason)` if it was
    /// rejected or canceled. If the promise has already settled, the returned future is ready
    /// on its first poll.
    pub fn wait(&self) -> PromiseFuture<'_, T, E> {
        PromiseFuture { promise: self }
    }
}

impl<T> Promise<T, T>
where
    T: Clone + 'static,
{
    /// Suspends until the promise settles and returns the payload, whatever the outcome.
    ///
    /// Only available when values and reasons share a type, as the success flag is discarded.
    pub async fn wait_with_no_result(&self) -> T {
        match self.wait().await {
            Ok(payload) | Err(payload) => payload,
        }
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E>
where
    T: 'static,
    E: 'static,
{
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Future returned by [`Promise::wait()`].
#[must_use = "futures do nothing unless polled"]
pub struct PromiseFuture<'a, T, E> {
    promise: &'a Promise<T, E>,
}

impl<T, E> Future for PromiseFuture<'_, T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.promise
            .core
            .poll_outcome(cx.waker())
            .map_or(Poll::Pending, |outcome| {
                Poll::Ready((*outcome).clone().into_result())
            })
    }
}

impl<T, E> fmt::Debug for PromiseFuture<'_, T, E>
where
    T: 'static,
    E: 'static,
{
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("promise", self.promise)
            .finish()
    }
}
