use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::channel::oneshot;

use crate::connection::ListenerChain;
use crate::dispatch_pool::Job;
use crate::listener_list::{ListenerList, SlotIndex};
use crate::{Connection, Disconnected, DispatchPool};

/// Turns one firing into a unit of work for the dispatch pool.
type Listener<T> = Rc<dyn Fn(T) -> Job>;

struct EventInner<T> {
    listeners: RefCell<ListenerList<Listener<T>>>,
    pool: DispatchPool,
}

impl<T> ListenerChain for EventInner<T> {
    fn unlink(&self, index: SlotIndex) {
        let removed = self.listeners.borrow_mut().unlink(index);

        // The listener may own arbitrary user state, so we drop it only after releasing the list.
        drop(removed);
    }
}

/// A multi-listener broadcast signal carrying a payload of type `T`.
///
/// Listeners register with [`connect()`][Self::connect], [`connect_async()`][Self::connect_async]
/// or [`once()`][Self::once] and receive a clone of the payload every time the event is
/// [fired][Self::fire].
///
/// Firing never runs listeners inline. Each listener invocation is handed to a
/// [`DispatchPool`] worker and runs as its own unit of work, so a listener that suspends does
/// not hold up the caller or the other listeners. Invocations for one firing start in chain
/// order, which is newest listener first.
///
/// The event is a cheaply cloneable handle; all clones share the same listeners.
///
/// # Panics
///
/// Firing, waiting and connecting are fine anywhere, but listener invocations are spawned as
/// local tasks, so [`fire()`][Self::fire] panics if called outside the context of a
/// [`tokio::task::LocalSet`] while any listener is connected.
///
/// # Example
///
/// ```rust
/// use rendezvous::Event;
/// # use tokio::task::LocalSet;
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # LocalSet::new().block_on(&runtime, async {
/// let player_joined = Event::<String>::new();
///
/// let waiter = {
///     let player_joined = player_joined.clone();
///     tokio::task::spawn_local(async move { player_joined.wait().await })
/// };
/// tokio::task::yield_now().await;
///
/// player_joined.fire("ferris".to_string());
///
/// assert_eq!(waiter.await.unwrap().unwrap(), "ferris");
/// # });
/// ```
pub struct Event<T> {
    inner: Rc<EventInner<T>>,
}

impl<T> Event<T>
where
    T: Clone + 'static,
{
    /// Creates an event whose listeners run on a dispatch pool of its own.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pool(DispatchPool::new())
    }

    /// Creates an event whose listeners run on the given (potentially shared) dispatch pool.
    #[must_use]
    pub fn with_pool(pool: DispatchPool) -> Self {
        Self {
            inner: Rc::new(EventInner {
                listeners: RefCell::new(ListenerList::new()),
                pool,
            }),
        }
    }

    /// Registers a listener that is invoked with the payload of every firing.
    ///
    /// The new listener becomes the head of the chain, so it is dispatched before listeners
    /// that were registered earlier.
    pub fn connect<F>(&self, callback: F) -> Connection
    where
        F: Fn(T) + 'static,
    {
        let callback = Rc::new(callback);

        self.install(move |_| {
            Rc::new(move |value: T| {
                let callback = Rc::clone(&callback);
                async move { callback(value) }.boxed_local()
            })
        })
    }

    /// Registers a listener that may suspend while handling a firing.
    ///
    /// Each invocation runs to completion on its own dispatch worker, concurrently with later
    /// firings and other listeners.
    pub fn connect_async<F, Fut>(&self, callback: F) -> Connection
    where
        F: Fn(T) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let callback = Rc::new(callback);

        self.install(move |_| {
            Rc::new(move |value: T| {
                let callback = Rc::clone(&callback);
                async move { callback(value).await }.boxed_local()
            })
        })
    }

    /// Registers a listener that is invoked for at most one firing.
    ///
    /// The listener disconnects itself as soon as a firing selects it, before its callback
    /// runs, so firing the event again (including from within the callback) cannot reach it
    /// a second time.
    pub fn once<F>(&self, callback: F) -> Connection
    where
        F: FnOnce(T) + 'static,
    {
        let callback = Cell::new(Some(callback));

        self.install(move |connection| {
            let connection = connection.clone();

            Rc::new(move |value: T| {
                connection.disconnect();
                let callback = callback.take();

                async move {
                    if let Some(callback) = callback {
                        callback(value);
                    }
                }
                .boxed_local()
            })
        })
    }

    /// Returns a future that resolves with the payload of the next firing.
    ///
    /// The one-shot listener backing the wait is connected by this call, not by the first poll,
    /// so a firing that happens between creating the future and awaiting it is not missed.
    /// Dropping the future disconnects the listener.
    ///
    /// # Errors
    ///
    /// Resolves to [`Disconnected`] if the listener is dropped before the event fires, e.g.
    /// because of [`disconnect_all()`][Self::disconnect_all].
    pub fn wait(&self) -> impl Future<Output = Result<T, Disconnected>> + use<T> {
        let (sender, receiver) = oneshot::channel();

        let connection = self.once(move |value| {
            // The waiter may have given up already, which is fine.
            drop(sender.send(value));
        });

        let connection = scopeguard::guard(connection, |connection| connection.disconnect());

        async move {
            let _connection = connection;
            receiver.await.map_err(|_canceled| Disconnected)
        }
    }

    /// Dispatches `value` to every connected listener.
    ///
    /// The chain is walked forward from its head, following each node's link as it is visited.
    /// A listener's connection state is checked when the walk reaches it. Listeners connected
    /// during the walk become the new head and are therefore not reached by this firing.
    pub fn fire(&self, value: T) {
        let mut cursor = self.inner.listeners.borrow().head();

        while let Some(index) = cursor {
            let (listener, next) = {
                let listeners = self.inner.listeners.borrow();

                let Some((listener, next)) = listeners.visit(index) else {
                    break;
                };

                (listener.map(Rc::clone), next)
            };

            // The list is not borrowed here: a `once()` listener unlinks itself during this call.
            if let Some(listener) = listener {
                self.inner.pool.dispatch(listener(value.clone()));
            }

            cursor = next;
        }
    }

    /// Disconnects every listener.
    ///
    /// Outstanding [`Connection`] handles stay valid but report themselves as disconnected.
    /// Listener invocations that were already dispatched are not interrupted.
    pub fn disconnect_all(&self) {
        let removed = self.inner.listeners.borrow_mut().clear();
        drop(removed);
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Reserves a slot, hands the future connection to `make_listener` and links the result.
    ///
    /// Building the handle first is what allows a listener to capture its own connection.
    fn install<M>(&self, make_listener: M) -> Connection
    where
        M: FnOnce(&Connection) -> Listener<T>,
    {
        let mut listeners = self.inner.listeners.borrow_mut();

        let index = listeners.reserve();
        let inner = Rc::downgrade(&self.inner);
        let chain: Weak<dyn ListenerChain> = inner;
        let connection = Connection::new(index, chain);

        let listener = make_listener(&connection);
        listeners.link_front(index, listener, connection.flag());

        connection
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Event<T>
where
    T: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("listeners", &self.inner.listeners.borrow())
            .field("pool", &self.inner.pool)
            .finish()
    }
}
