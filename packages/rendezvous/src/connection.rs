use std::any::type_name;
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::listener_list::SlotIndex;

/// The owner of a listener chain, as seen from a [`Connection`].
///
/// This erases the payload type of the event so that connections are not generic.
pub(crate) trait ListenerChain {
    /// Removes the node at `index` from the chain.
    fn unlink(&self, index: SlotIndex);
}

/// One listener's membership in an [`Event`][crate::Event].
///
/// Returned by [`Event::connect()`][crate::Event::connect] and friends. Use
/// [`disconnect()`][Self::disconnect] to stop receiving the event.
///
/// The handle is cheap to clone; all clones refer to the same membership. Dropping a handle
/// does not disconnect the listener.
#[derive(Clone)]
pub struct Connection {
    connected: Rc<Cell<bool>>,
    index: SlotIndex,
    chain: Weak<dyn ListenerChain>,
}

impl Connection {
    pub(crate) fn new(index: SlotIndex, chain: Weak<dyn ListenerChain>) -> Self {
        Self {
            connected: Rc::new(Cell::new(true)),
            index,
            chain,
        }
    }

    /// The flag shared with the node in the listener chain.
    pub(crate) fn flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.connected)
    }

    /// Whether the listener still receives the event.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    /// Stops the listener from receiving the event.
    ///
    /// Invocations that were already dispatched are not interrupted. Calling this on a
    /// connection that is already disconnected does nothing.
    pub fn disconnect(&self) {
        if !self.connected.replace(false) {
            return;
        }

        if let Some(chain) = self.chain.upgrade() {
            chain.unlink(self.index);
        }
    }
}

impl fmt::Debug for Connection {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("connected", &self.connected.get())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::RefCell;

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(Connection: Send, Sync);

    #[derive(Default)]
    struct RecordingChain {
        unlinked: RefCell<Vec<SlotIndex>>,
    }

    impl ListenerChain for RecordingChain {
        fn unlink(&self, index: SlotIndex) {
            self.unlinked.borrow_mut().push(index);
        }
    }

    #[test]
    fn disconnect_unlinks_once() {
        let chain = Rc::new(RecordingChain::default());
        let weak = Rc::downgrade(&chain);
        let weak: Weak<dyn ListenerChain> = weak;
        let connection = Connection::new(3, weak);

        assert!(connection.is_connected());

        connection.disconnect();
        connection.clone().disconnect();

        assert!(!connection.is_connected());
        assert_eq!(*chain.unlinked.borrow(), vec![3]);
    }

    #[test]
    fn disconnect_after_chain_dropped_is_harmless() {
        let chain = Rc::new(RecordingChain::default());
        let weak = Rc::downgrade(&chain);
        let weak: Weak<dyn ListenerChain> = weak;
        let connection = Connection::new(0, weak);

        drop(chain);
        connection.disconnect();

        assert!(!connection.is_connected());
    }

    #[test]
    fn externally_cleared_flag_skips_unlink() {
        let chain = Rc::new(RecordingChain::default());
        let weak = Rc::downgrade(&chain);
        let weak: Weak<dyn ListenerChain> = weak;
        let connection = Connection::new(1, weak);

        connection.flag().set(false);
        connection.disconnect();

        assert!(chain.unlinked.borrow().is_empty());
    }
}
