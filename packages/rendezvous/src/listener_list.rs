//! Singly-linked chain of event listeners, stored in an arena.
//!
//! Nodes live in a slot vector and link to each other by slot index, so a [`Connection`]
//! can refer to its node without holding a reference into the chain. New listeners are linked
//! at the head. Vacated slots are recycled.
//!
//! Every node shares a `connected` flag with its [`Connection`]. The flag is the source of
//! truth for whether a node still belongs to the chain: a slot index held by a handle whose flag
//! is `false` may already have been recycled and must not be touched.
//!
//! [`Connection`]: crate::Connection

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

pub(crate) type SlotIndex = usize;

pub(crate) struct ListenerList<L> {
    slots: Vec<Option<Node<L>>>,

    /// Indexes of `None` entries in `slots`, available for reuse.
    vacant: Vec<SlotIndex>,

    head: Option<SlotIndex>,
}

struct Node<L> {
    listener: L,
    connected: Rc<Cell<bool>>,
    next: Option<SlotIndex>,
}

impl<L> ListenerList<L> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            head: None,
        }
    }

    pub(crate) fn head(&self) -> Option<SlotIndex> {
        self.head
    }

    /// Claims a slot for a node that is about to be linked via [`Self::link_front()`].
    ///
    /// Splitting the two steps lets the caller build a handle (and a listener that captures it)
    /// before the node exists.
    pub(crate) fn reserve(&mut self) -> SlotIndex {
        if let Some(index) = self.vacant.pop() {
            return index;
        }

        self.slots.push(None);
        self.slots.len().wrapping_sub(1)
    }

    /// Links a new node at the head of the chain, in a slot obtained from [`Self::reserve()`].
    ///
    /// # Panics
    ///
    /// Panics if the slot was not reserved or is already occupied.
    pub(crate) fn link_front(&mut self, index: SlotIndex, listener: L, connected: Rc<Cell<bool>>) {
        let next = self.head;

        let slot = self
            .slots
            .get_mut(index)
            .expect("slot index must come from reserve()");

        assert!(slot.is_none(), "reserved slot {index} is already occupied");

        *slot = Some(Node {
            listener,
            connected,
            next,
        });

        self.head = Some(index);
    }

    /// Returns the node's listener, if the node is still connected, and the index of the next
    /// node in the chain.
    pub(crate) fn visit(&self, index: SlotIndex) -> Option<(Option<&L>, Option<SlotIndex>)> {
        let node = self.slots.get(index)?.as_ref()?;

        let listener = node.connected.get().then_some(&node.listener);
        Some((listener, node.next))
    }

    /// Removes a node from the chain and frees its slot, returning its listener so the caller
    /// can drop it outside of any borrow of the list.
    ///
    /// Walks the chain from the head to find the predecessor. Does nothing if the node is not
    /// in the chain.
    pub(crate) fn unlink(&mut self, index: SlotIndex) -> Option<L> {
        let next = self.node(index)?.next;

        if self.head == Some(index) {
            self.head = next;
        } else {
            let mut cursor = self.head;

            loop {
                // Not reachable from the head; nothing to splice.
                let current = cursor?;
                let node = self.node_mut(current)?;

                if node.next == Some(index) {
                    node.next = next;
                    break;
                }

                cursor = node.next;
            }
        }

        let node = self.slots.get_mut(index)?.take()?;
        self.vacant.push(index);

        Some(node.listener)
    }

    /// Detaches every node, marking each as disconnected. Returns the removed listeners so the
    /// caller can drop them outside of any borrow of the list.
    pub(crate) fn clear(&mut self) -> Vec<L> {
        self.head = None;
        self.vacant.clear();

        self.slots
            .drain(..)
            .flatten()
            .map(|node| {
                node.connected.set(false);
                node.listener
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    fn node(&self, index: SlotIndex) -> Option<&Node<L>> {
        self.slots.get(index)?.as_ref()
    }

    fn node_mut(&mut self, index: SlotIndex) -> Option<&mut Node<L>> {
        self.slots.get_mut(index)?.as_mut()
    }
}

impl<L> fmt::Debug for ListenerList<L> {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.len())
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn push(list: &mut ListenerList<&'static str>, name: &'static str) -> (SlotIndex, Rc<Cell<bool>>) {
        let index = list.reserve();
        let connected = Rc::new(Cell::new(true));
        list.link_front(index, name, Rc::clone(&connected));
        (index, connected)
    }

    fn walk(list: &ListenerList<&'static str>) -> Vec<&'static str> {
        let mut visited = Vec::new();
        let mut cursor = list.head();

        while let Some(index) = cursor {
            let (listener, next) = list.visit(index).expect("chain must only link live nodes");
            visited.extend(listener.copied());
            cursor = next;
        }

        visited
    }

    #[test]
    fn newest_node_is_head() {
        let mut list = ListenerList::new();
        push(&mut list, "a");
        push(&mut list, "b");
        push(&mut list, "c");

        assert_eq!(walk(&list), vec!["c", "b", "a"]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn unlink_head_middle_and_tail() {
        let mut list = ListenerList::new();
        let (a, _) = push(&mut list, "a");
        let (b, _) = push(&mut list, "b");
        let (c, _) = push(&mut list, "c");
        push(&mut list, "d");

        assert_eq!(list.unlink(b), Some("b"));
        assert_eq!(walk(&list), vec!["d", "c", "a"]);

        assert_eq!(list.unlink(a), Some("a"));
        assert_eq!(walk(&list), vec!["d", "c"]);

        assert_eq!(list.unlink(c), Some("c"));
        assert_eq!(walk(&list), vec!["d"]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn unlink_is_idempotent() {
        let mut list = ListenerList::new();
        let (a, _) = push(&mut list, "a");
        push(&mut list, "b");

        assert_eq!(list.unlink(a), Some("a"));
        assert_eq!(list.unlink(a), None);

        assert_eq!(walk(&list), vec!["b"]);
    }

    #[test]
    fn vacant_slots_are_recycled() {
        let mut list = ListenerList::new();
        let (a, _) = push(&mut list, "a");
        push(&mut list, "b");

        drop(list.unlink(a));
        let (c, _) = push(&mut list, "c");

        assert_eq!(a, c);
        assert_eq!(walk(&list), vec!["c", "b"]);
    }

    #[test]
    fn disconnected_nodes_are_skipped_but_still_walked() {
        let mut list = ListenerList::new();
        push(&mut list, "a");
        let (_, b_connected) = push(&mut list, "b");
        push(&mut list, "c");

        b_connected.set(false);

        assert_eq!(walk(&list), vec!["c", "a"]);
    }

    #[test]
    fn clear_disconnects_everything() {
        let mut list = ListenerList::new();
        let (_, a_connected) = push(&mut list, "a");
        let (_, b_connected) = push(&mut list, "b");

        let removed = list.clear();

        assert_eq!(removed.len(), 2);
        assert!(!a_connected.get());
        assert!(!b_connected.get());
        assert!(walk(&list).is_empty());
        assert_eq!(list.len(), 0);
    }
}
