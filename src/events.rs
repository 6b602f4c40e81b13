//! Type-keyed event dispatch.
//!
//! [`EventBus`] is an owned value, not a global: whoever constructs the engine
//! decides who can publish and who can listen. Listeners subscribe per event type
//! and get back a [`Subscription`] handle that revokes exactly that listener, so a
//! collaborator can detach itself without touching anyone else's registrations.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

/// Which mouse button an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    /// Left button
    Left,
    /// Right button
    Right,
    /// Middle button / wheel click
    Middle,
}

/// The window's drawable area changed size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowResized {
    /// New width in pixels
    pub width: u32,
    /// New height in pixels
    pub height: u32,
}

/// A mouse button was pressed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MousePressed {
    /// The button pressed
    pub button: MouseButton,
    /// Cursor x in window coordinates
    pub x: i32,
    /// Cursor y in window coordinates
    pub y: i32,
}

/// A mouse button was released.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouseReleased {
    /// The button released
    pub button: MouseButton,
    /// Cursor x in window coordinates
    pub x: i32,
    /// Cursor y in window coordinates
    pub y: i32,
}

/// The cursor moved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouseMoved {
    /// Cursor x in window coordinates
    pub x: i32,
    /// Cursor y in window coordinates
    pub y: i32,
}

/// Revokes one listener. Returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subscription {
    event: TypeId,
    id: u64,
}

struct Listener {
    id: u64,
    // Downcast to the concrete event type inside the dispatch loop.
    callback: Box<dyn FnMut(&dyn Any)>,
}

/// Publish/subscribe dispatch keyed on the event's type.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<TypeId, Vec<Listener>>,
    next_id: u64,
}

impl EventBus {
    /// A bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every published event of type `T`.
    pub fn subscribe<T, F>(&mut self, mut callback: F) -> Subscription
    where
        T: Any,
        F: FnMut(&T) + 'static,
    {
        let event = TypeId::of::<T>();
        let id = self.next_id;
        self.next_id += 1;

        self.listeners.entry(event).or_default().push(Listener {
            id,
            callback: Box::new(move |any| {
                let event = any.downcast_ref::<T>().expect("listener keyed by TypeId");
                callback(event);
            }),
        });
        Subscription { event, id }
    }

    /// Remove the listener behind `subscription`. Revoking twice is harmless.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        if let Some(listeners) = self.listeners.get_mut(&subscription.event) {
            listeners.retain(|listener| listener.id != subscription.id);
        }
    }

    /// Invoke every listener registered for `T`, in subscription order.
    pub fn publish<T: Any>(&mut self, event: &T) {
        if let Some(listeners) = self.listeners.get_mut(&TypeId::of::<T>()) {
            for listener in listeners {
                (listener.callback)(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, rc::Rc};

    #[test]
    fn listeners_only_see_their_own_event_type() {
        let mut bus = EventBus::new();
        let resizes = Rc::new(Cell::new(0));
        let moves = Rc::new(Cell::new(0));

        {
            let resizes = resizes.clone();
            bus.subscribe::<WindowResized, _>(move |_| resizes.set(resizes.get() + 1));
        }
        {
            let moves = moves.clone();
            bus.subscribe::<MouseMoved, _>(move |_| moves.set(moves.get() + 1));
        }

        bus.publish(&WindowResized {
            width: 800,
            height: 600,
        });
        bus.publish(&MouseMoved { x: 1, y: 2 });
        bus.publish(&MouseMoved { x: 3, y: 4 });

        assert_eq!(resizes.get(), 1);
        assert_eq!(moves.get(), 2);
    }

    #[test]
    fn listeners_receive_the_event_payload() {
        let mut bus = EventBus::new();
        let last = Rc::new(Cell::new((0u32, 0u32)));
        {
            let last = last.clone();
            bus.subscribe::<WindowResized, _>(move |event| {
                last.set((event.width, event.height));
            });
        }
        bus.publish(&WindowResized {
            width: 1920,
            height: 1080,
        });
        assert_eq!(last.get(), (1920, 1080));
    }

    #[test]
    fn unsubscribe_revokes_exactly_one_listener() {
        let mut bus = EventBus::new();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        let subscription = {
            let first = first.clone();
            bus.subscribe::<MousePressed, _>(move |_| first.set(first.get() + 1))
        };
        {
            let second = second.clone();
            bus.subscribe::<MousePressed, _>(move |_| second.set(second.get() + 1));
        }

        let press = MousePressed {
            button: MouseButton::Left,
            x: 0,
            y: 0,
        };
        bus.publish(&press);
        bus.unsubscribe(subscription);
        bus.publish(&press);
        // Revoking again is a no-op.
        bus.unsubscribe(subscription);
        bus.publish(&press);

        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 3);
    }
}
