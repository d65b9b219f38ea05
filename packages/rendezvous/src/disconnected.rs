use thiserror::Error;

/// Indicates that a one-shot listener was disconnected before the event it waited for fired.
///
/// Returned by [`Event::wait()`][crate::Event::wait] when the event drops its listeners, e.g.
/// via [`Event::disconnect_all()`][crate::Event::disconnect_all].
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
#[error("listener was disconnected before the event fired")]
pub struct Disconnected;
