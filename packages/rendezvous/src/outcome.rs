/// The terminal result of a [`Promise`][crate::Promise].
///
/// Rejection and cancellation share the reason type `E`; they differ only in which callbacks
/// they reach ([`Promise::catch()`][crate::Promise::catch] versus
/// [`Promise::canceled()`][crate::Promise::canceled]).
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a promise can only ever end in one of these three ways"
)]
pub enum Outcome<T, E> {
    /// The promise was resolved with a value.
    Resolved(T),

    /// The promise was rejected with a reason.
    Rejected(E),

    /// The promise was canceled with a reason.
    Canceled(E),
}

impl<T, E> Outcome<T, E> {
    /// The resolved value, if this is [`Outcome::Resolved`].
    #[must_use]
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Rejected(_) | Self::Canceled(_) => None,
        }
    }

    /// The rejection reason, if this is [`Outcome::Rejected`].
    #[must_use]
    pub fn rejected(&self) -> Option<&E> {
        match self {
            Self::Rejected(reason) => Some(reason),
            Self::Resolved(_) | Self::Canceled(_) => None,
        }
    }

    /// The cancellation reason, if this is [`Outcome::Canceled`].
    #[must_use]
    pub fn canceled(&self) -> Option<&E> {
        match self {
            Self::Canceled(reason) => Some(reason),
            Self::Resolved(_) | Self::Rejected(_) => None,
        }
    }

    /// The state a promise holding this outcome is in.
    #[must_use]
    pub fn state(&self) -> PromiseState {
        match self {
            Self::Resolved(_) => PromiseState::Resolved,
            Self::Rejected(_) => PromiseState::Rejected,
            Self::Canceled(_) => PromiseState::Canceled,
        }
    }

    /// Converts the outcome into a `Result`, folding rejection and cancellation into `Err`.
    ///
    /// # Errors
    ///
    /// Returns the reason if the outcome is a rejection or a cancellation.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Resolved(value) => Ok(value),
            Self::Rejected(reason) | Self::Canceled(reason) => Err(reason),
        }
    }
}

/// Where a [`Promise`][crate::Promise] is in its lifecycle.
///
/// A promise starts out [`Pending`][Self::Pending] and moves to exactly one of the other states,
/// after which it never changes again.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the lifecycle is fixed; adding states would change its meaning"
)]
pub enum PromiseState {
    /// Not settled yet.
    Pending,

    /// Settled with a value.
    Resolved,

    /// Settled with a rejection reason.
    Rejected,

    /// Settled with a cancellation reason.
    Canceled,
}

impl PromiseState {
    /// Whether the promise has reached a terminal state.
    #[must_use]
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant() {
        let resolved: Outcome<u32, &str> = Outcome::Resolved(1);
        let rejected: Outcome<u32, &str> = Outcome::Rejected("bad");
        let canceled: Outcome<u32, &str> = Outcome::Canceled("stop");

        assert_eq!(resolved.resolved(), Some(&1));
        assert_eq!(resolved.rejected(), None);
        assert_eq!(rejected.rejected(), Some(&"bad"));
        assert_eq!(rejected.canceled(), None);
        assert_eq!(canceled.canceled(), Some(&"stop"));
        assert_eq!(canceled.resolved(), None);
    }

    #[test]
    fn into_result_folds_failures() {
        assert_eq!(Outcome::<u32, &str>::Resolved(1).into_result(), Ok(1));
        assert_eq!(Outcome::<u32, &str>::Rejected("bad").into_result(), Err("bad"));
        assert_eq!(Outcome::<u32, &str>::Canceled("stop").into_result(), Err("stop"));
    }

    #[test]
    fn only_pending_is_unsettled() {
        assert!(!PromiseState::Pending.is_settled());
        assert!(PromiseState::Resolved.is_settled());
        assert!(PromiseState::Rejected.is_settled());
        assert!(PromiseState::Canceled.is_settled());
        assert_eq!(
            Outcome::<u32, &str>::Canceled("stop").state(),
            PromiseState::Canceled
        );
    }
}
