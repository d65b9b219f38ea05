use std::any::type_name;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::promise::PromiseCore;
use crate::{Outcome, Promise, PromiseState};

/// The producer side of a [`Promise`] and the only way to settle it.
///
/// Each deferred is paired with exactly one promise at construction. The first call to
/// [`resolve()`][Self::resolve], [`reject()`][Self::reject] or [`cancel()`][Self::cancel]
/// settles the promise; every later call is ignored.
///
/// Settling never runs callbacks inline. It returns before any of them has run.
///
/// # Panics
///
/// Settling a promise that has callbacks registered panics outside the context of a
/// [`tokio::task::LocalSet`].
pub struct Deferred<T, E> {
    core: Rc<PromiseCore<T, E>>,
}

impl<T, E> Deferred<T, E>
where
    T: 'static,
    E: 'static,
{
    /// Creates a pending promise and the deferred that settles it.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Rc::new(PromiseCore::pending()),
        }
    }

    /// The promise settled by this deferred.
    #[must_use]
    pub fn promise(&self) -> Promise<T, E> {
        Promise::from_core(Rc::clone(&self.core))
    }

    /// Resolves the promise with `value`, unless it is already settled.
    pub fn resolve(&self, value: T) {
        self.settle(Outcome::Resolved(value));
    }

    /// Rejects the promise with `reason`, unless it is already settled.
    pub fn reject(&self, reason: E) {
        self.settle(Outcome::Rejected(reason));
    }

    /// Cancels the promise with `reason`, unless it is already settled.
    pub fn cancel(&self, reason: E) {
        self.settle(Outcome::Canceled(reason));
    }

    /// Whether the promise is still waiting to be settled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.core.state() == PromiseState::Pending
    }

    fn settle(&self, outcome: Outcome<T, E>) {
        let attempted = outcome.state();

        if !self.core.settle(outcome) {
            trace!(
                attempted = ?attempted,
                current = ?self.core.state(),
                "ignoring settlement of an already settled promise"
            );
        }
    }
}

impl<T, E> Default for Deferred<T, E>
where
    T: 'static,
    E: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Deferred<T, E>
where
    T: 'static,
    E: 'static,
{
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("state", &self.core.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(Deferred<u32, String>: Send, Sync, Clone);

    #[test]
    fn starts_pending() {
        let deferred = Deferred::<u32, String>::new();

        assert!(deferred.is_pending());
        assert_eq!(deferred.promise().state(), PromiseState::Pending);
        assert_eq!(deferred.promise().outcome(), None);
    }

    #[test]
    fn settling_without_callbacks_needs_no_runtime() {
        let deferred = Deferred::<u32, String>::new();
        let promise = deferred.promise();

        deferred.cancel("stop".to_string());
        deferred.resolve(1);

        assert!(!deferred.is_pending());
        assert_eq!(promise.outcome(), Some(Outcome::Canceled("stop".to_string())));
    }

    #[test]
    fn every_promise_handle_observes_the_settlement() {
        let deferred = Deferred::<u32, String>::new();
        let first = deferred.promise();
        let second = first.clone();

        deferred.reject("bad".to_string());

        assert_eq!(first.state(), PromiseState::Rejected);
        assert_eq!(second.state(), PromiseState::Rejected);
        assert_eq!(deferred.promise().outcome(), Some(Outcome::Rejected("bad".to_string())));
    }
}
