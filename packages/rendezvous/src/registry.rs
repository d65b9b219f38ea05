use std::any::{Any, type_name};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::query::QueryOptions;
use crate::{DispatchPool, Event, Query, QueryError, RegistryError};

/// Type-erased instances keyed by name. Every value is the handle type it was created as.
type Entries = RefCell<HashMap<String, Box<dyn Any>>>;

struct RegistryInner {
    events: Entries,
    queries: Entries,
    pool: DispatchPool,
    query_options: QueryOptions,
}

/// Name-addressed lookup of shared [`Event`]s and [`Query`]s.
///
/// Components that know nothing about each other can rendezvous on an event or a query by
/// agreeing on its name. The first lookup of a name creates the instance; every later lookup
/// returns a handle to the same instance. Entries are never removed.
///
/// Events and queries live in separate namespaces, so an event and a query may share a name.
/// A name is bound to the type parameters it was first looked up with; looking it up with
/// other type parameters fails with [`RegistryError::TypeMismatch`].
///
/// Every event created by the registry dispatches its listeners on the registry's shared
/// [`DispatchPool`], and every query created by it uses the registry's query settings.
///
/// The registry is a cheaply cloneable handle meant to be created once and passed to the
/// components that need it.
///
/// # Example
///
/// ```rust
/// use rendezvous::{QueryError, Registry};
/// # use tokio::task::LocalSet;
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
/// # LocalSet::new().block_on(&runtime, async {
/// let registry = Registry::new();
///
/// // One component answers...
/// registry
///     .get_query::<(i64, i64), i64, QueryError>("Sum")
///     .unwrap()
///     .on_request(|deferred, (a, b)| deferred.resolve(a + b));
///
/// // ...and another asks, knowing only the name.
/// let sum = registry.get_query::<(i64, i64), i64, QueryError>("Sum").unwrap();
/// assert_eq!(sum.request((1, 2)).await.wait().await, Ok(3));
/// # });
/// ```
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

impl Registry {
    /// Creates an empty registry with default settings.
    ///
    /// Use [`Registry::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Returns the event registered under `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TypeMismatch`] if `name` is registered as an event with a
    /// different payload type.
    pub fn get_event<T>(&self, name: &str) -> Result<Event<T>, RegistryError>
    where
        T: Clone + 'static,
    {
        get_or_create(&self.inner.events, "event", name, || {
            Event::with_pool(self.inner.pool.clone())
        })
    }

    /// Returns the query registered under `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TypeMismatch`] if `name` is registered as a query with different
    /// argument, value or reason types.
    pub fn get_query<A, T, E>(&self, name: &str) -> Result<Query<A, T, E>, RegistryError>
    where
        A: 'static,
        T: 'static,
        E: From<QueryError> + 'static,
    {
        get_or_create(&self.inner.queries, "query", name, || {
            Query::with_options(self.inner.query_options)
        })
    }

    /// The dispatch pool shared by every event of this registry.
    #[must_use]
    pub fn dispatch_pool(&self) -> &DispatchPool {
        &self.inner.pool
    }

    /// Number of registered events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner.events.borrow().len()
    }

    /// Number of registered queries.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.inner.queries.borrow().len()
    }
}

fn get_or_create<V, C>(
    entries: &Entries,
    kind: &'static str,
    name: &str,
    create: C,
) -> Result<V, RegistryError>
where
    V: Clone + 'static,
    C: FnOnce() -> V,
{
    let mut entries = entries.borrow_mut();

    if let Some(existing) = entries.get(name) {
        return existing
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| RegistryError::TypeMismatch {
                kind,
                name: name.to_string(),
                requested: type_name::<V>(),
            });
    }

    debug!(kind, name, "creating registry entry");

    let created = create();
    entries.insert(name.to_string(), Box::new(created.clone()));

    Ok(created)
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("events", &self.event_count())
            .field("queries", &self.query_count())
            .field("pool", &self.inner.pool)
            .field("query_options", &self.inner.query_options)
            .finish()
    }
}

/// Builder for creating a [`Registry`] with custom configuration.
#[derive(Debug)]
pub struct RegistryBuilder {
    max_idle_workers: Option<usize>,
    query_options: QueryOptions,
}

impl RegistryBuilder {
    fn new() -> Self {
        Self {
            max_idle_workers: None,
            query_options: QueryOptions::default(),
        }
    }

    /// Sets how many finished dispatch workers the shared pool keeps parked for reuse.
    ///
    /// See [`DispatchPoolBuilder::max_idle_workers()`][crate::DispatchPoolBuilder::max_idle_workers].
    #[must_use]
    pub fn max_idle_workers(mut self, count: usize) -> Self {
        self.max_idle_workers = Some(count);
        self
    }

    /// Sets the responder timeout of every query created by the registry.
    ///
    /// See [`QueryBuilder::responder_timeout()`][crate::QueryBuilder::responder_timeout].
    #[must_use]
    pub fn responder_timeout(mut self, timeout: Duration) -> Self {
        self.query_options.responder_timeout = timeout;
        self
    }

    /// Sets the responder poll interval of every query created by the registry.
    ///
    /// See [`QueryBuilder::poll_interval()`][crate::QueryBuilder::poll_interval].
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.query_options = self.query_options.with_poll_interval(interval);
        self
    }

    /// Creates the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        let mut pool = DispatchPool::builder();

        if let Some(count) = self.max_idle_workers {
            pool = pool.max_idle_workers(count);
        }

        Registry {
            inner: Rc::new(RegistryInner {
                events: RefCell::new(HashMap::new()),
                queries: RefCell::new(HashMap::new()),
                pool: pool.build(),
                query_options: self.query_options,
            }),
        }
    }
}
