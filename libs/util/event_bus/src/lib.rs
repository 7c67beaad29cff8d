// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.
use fxhash::FxHashMap;
use log::error;
use std::{
    cell::{Cell, RefCell},
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
};

/// An event that can travel over an [EventBus]. Each payload variant maps to
/// a stable kind string ("node:click" and friends) that subscribers key on.
pub trait BusEvent {
    fn kind(&self) -> &'static str;
}

/// Handle returned by [EventBus::on]; pass back to [EventBus::off] to
/// unsubscribe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Subscription {
    kind: &'static str,
    id: u64,
}

type Handler<E> = Rc<dyn Fn(&E)>;

/// Single-threaded publisher/subscriber keyed on event kind.
///
/// Handlers are free to subscribe or unsubscribe from inside a callback;
/// the publisher snapshots the handler list before dispatching. A panicking
/// subscriber is caught and logged without aborting the publish.
pub struct EventBus<E: BusEvent> {
    next_id: Cell<u64>,
    subscribers: RefCell<FxHashMap<&'static str, Vec<(u64, Handler<E>)>>>,
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            subscribers: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn on<F>(&self, kind: &'static str, handler: F) -> Subscription
    where
        F: Fn(&E) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, Rc::new(handler)));
        Subscription { kind, id }
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn off(&self, subscription: Subscription) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if let Some(handlers) = subscribers.get_mut(subscription.kind) {
            let before = handlers.len();
            handlers.retain(|(id, _)| *id != subscription.id);
            return handlers.len() != before;
        }
        false
    }

    pub fn publish(&self, event: &E) {
        // Snapshot so handlers may mutate the subscriber table reentrantly.
        let handlers: Vec<Handler<E>> = match self.subscribers.borrow().get(event.kind()) {
            Some(handlers) => handlers.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("subscriber for '{}' panicked; continuing", event.kind());
            }
        }
    }

    pub fn subscriber_count(&self, kind: &'static str) -> usize {
        self.subscribers
            .borrow()
            .get(kind)
            .map_or(0, |handlers| handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Clone, Debug)]
    enum TestEvent {
        Tick(u32),
        Click { x: f32 },
    }

    impl BusEvent for TestEvent {
        fn kind(&self) -> &'static str {
            match self {
                Self::Tick(_) => "tick",
                Self::Click { .. } => "click",
            }
        }
    }

    #[test]
    fn it_dispatches_by_kind() {
        let bus = EventBus::new();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let seen = ticks.clone();
        bus.on("tick", move |e| {
            if let TestEvent::Tick(n) = e {
                seen.borrow_mut().push(*n);
            }
        });
        bus.publish(&TestEvent::Tick(1));
        bus.publish(&TestEvent::Click { x: 0.0 });
        bus.publish(&TestEvent::Tick(2));
        assert_eq!(*ticks.borrow(), vec![1, 2]);
    }

    #[test]
    fn it_unsubscribes() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0u32));
        let seen = count.clone();
        let sub = bus.on("tick", move |_| seen.set(seen.get() + 1));
        bus.publish(&TestEvent::Tick(0));
        assert!(bus.off(sub));
        assert!(!bus.off(sub));
        bus.publish(&TestEvent::Tick(0));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn a_panicking_subscriber_does_not_abort_the_publish() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0u32));
        bus.on("tick", |_| panic!("boom"));
        let seen = count.clone();
        bus.on("tick", move |_| seen.set(seen.get() + 1));
        bus.publish(&TestEvent::Tick(0));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn handlers_may_resubscribe_during_publish() {
        let bus = Rc::new(EventBus::new());
        let inner = bus.clone();
        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        bus.on("tick", move |_| {
            let flag = flag.clone();
            inner.on("tick", move |_| flag.set(true));
        });
        bus.publish(&TestEvent::Tick(0));
        assert!(!fired.get());
        bus.publish(&TestEvent::Tick(1));
        assert!(fired.get());
        assert_eq!(bus.subscriber_count("tick"), 3);
    }
}
