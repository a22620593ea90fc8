//! Change-event protocol
//!
//! Typed notifications published synchronously to subscribers, plus
//! the started/completed bracket events that frame every structural
//! operation. Listeners get a borrow of the event and an unsubscribe
//! handle; they never hold a reference into the model.

use std::fmt;

use crate::models::{ItemId, ItemKind, Position, Section};
use crate::song_structure::PartId;

/// Handle returned by `subscribe`, passed back to `unsubscribe`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    token: u64,
}

struct Listener<E> {
    token: u64,
    callback: Box<dyn FnMut(&E)>,
}

/// Synchronous publish/subscribe fan-out for one event type.
///
/// Dispatch order is subscription order. Everything runs on the
/// caller's thread; a callback must not try to mutate the publishing
/// model (it cannot, short of interior mutability — the model is
/// mutably borrowed while publishing).
pub struct EventBus<E> {
    next_token: u64,
    listeners: Vec<Listener<E>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            next_token: 0,
            listeners: Vec::new(),
        }
    }

    /// Register a listener; keep the handle to unsubscribe later.
    pub fn subscribe(&mut self, callback: impl FnMut(&E) + 'static) -> Subscription {
        let token = self.next_token;
        self.next_token += 1;
        self.listeners.push(Listener {
            token,
            callback: Box::new(callback),
        });
        Subscription { token }
    }

    /// Remove a listener. Returns false if the handle was already
    /// unsubscribed.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.token != subscription.token);
        self.listeners.len() != before
    }

    /// Deliver an event to every listener, in subscription order.
    pub fn publish(&mut self, event: &E) {
        for listener in &mut self.listeners {
            (listener.callback)(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Brackets around a structural operation.
///
/// Every `Started` is eventually followed by exactly one `Completed`
/// with the same `id`, on success and failure alike; `rolled_back`
/// marks the failure path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionEvent {
    Started {
        action: String,
        id: u64,
    },
    Completed {
        action: String,
        id: u64,
        rolled_back: bool,
    },
}

impl ActionEvent {
    pub fn action(&self) -> &str {
        match self {
            ActionEvent::Started { action, .. } => action,
            ActionEvent::Completed { action, .. } => action,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            ActionEvent::Started { id, .. } => *id,
            ActionEvent::Completed { id, .. } => *id,
        }
    }
}

/// Fine-grained lead sheet change notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeEvent {
    ItemAdded {
        id: ItemId,
        kind: ItemKind,
        position: Position,
    },
    ItemRemoved {
        id: ItemId,
        kind: ItemKind,
        position: Position,
    },
    ItemMoved {
        id: ItemId,
        from: Position,
        to: Position,
    },
    SectionMoved {
        id: ItemId,
        from_bar: usize,
        to_bar: usize,
    },
    SectionChanged {
        id: ItemId,
        old: Section,
        new: Section,
    },
    SizeResized {
        old_size: usize,
        new_size: usize,
    },
}

/// Everything a lead sheet listener can receive.
#[derive(Clone, Debug, PartialEq)]
pub enum LeadSheetEvent {
    Change(ChangeEvent),
    Action(ActionEvent),
}

/// Fine-grained song structure change notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum PartChangeEvent {
    PartAdded {
        id: PartId,
        start_bar: usize,
        nb_bars: usize,
    },
    PartRemoved {
        id: PartId,
        start_bar: usize,
        nb_bars: usize,
    },
    PartMoved {
        id: PartId,
        from_bar: usize,
        to_bar: usize,
    },
    PartResized {
        id: PartId,
        old_nb_bars: usize,
        new_nb_bars: usize,
    },
}

/// Everything a song structure listener can receive.
#[derive(Clone, Debug, PartialEq)]
pub enum SongStructureEvent {
    Change(PartChangeEvent),
    Action(ActionEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_publish_reaches_all_listeners_in_order() {
        let mut bus: EventBus<u32> = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let a = seen.clone();
        bus.subscribe(move |e| a.borrow_mut().push(("a", *e)));
        let b = seen.clone();
        bus.subscribe(move |e| b.borrow_mut().push(("b", *e)));

        bus.publish(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut bus: EventBus<u32> = EventBus::new();
        let seen = Rc::new(RefCell::new(0));

        let counter = seen.clone();
        let sub = bus.subscribe(move |_| *counter.borrow_mut() += 1);

        bus.publish(&1);
        assert!(bus.unsubscribe(sub));
        bus.publish(&2);

        assert_eq!(*seen.borrow(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_action_event_accessors() {
        let started = ActionEvent::Started {
            action: "insertBars".into(),
            id: 3,
        };
        assert_eq!(started.action(), "insertBars");
        assert_eq!(started.id(), 3);
    }
}
