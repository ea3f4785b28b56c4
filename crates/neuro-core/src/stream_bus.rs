//! Multicast publish/subscribe channel for inter-component data flow
//!
//! Every value published on a bus is delivered, in publish order, to all
//! subscribers registered at the moment of the call. The bus owns its
//! subscriber collection; subscribers hold only a disposal token.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::NeuroError;

type NextFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&NeuroError) + Send + Sync>;
type CompletedFn = Box<dyn Fn() + Send + Sync>;

struct Observer<T> {
    on_next: NextFn<T>,
    on_error: Option<ErrorFn>,
    on_completed: Option<CompletedFn>,
}

struct BusState<T> {
    closed: bool,
    next_id: u64,
    observers: Vec<(u64, Arc<Observer<T>>)>,
}

/// Thread-safe multicast channel. Cloning shares the same underlying bus.
pub struct StreamBus<T> {
    state: Arc<Mutex<BusState<T>>>,
}

impl<T> Clone for StreamBus<T> {
    fn clone(&self) -> Self {
        StreamBus {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for StreamBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

// A panicking subscriber must not leave the bus permanently poisoned.
fn lock<T>(state: &Mutex<BusState<T>>) -> MutexGuard<'_, BusState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> StreamBus<T> {
    pub fn new() -> Self {
        StreamBus {
            state: Arc::new(Mutex::new(BusState {
                closed: false,
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Deliver `value` to every subscriber registered at the moment of the
    /// call, in registration order. Publishing on a disposed bus is a no-op
    /// so that in-flight producers are tolerated during shutdown.
    ///
    /// Callbacks run outside the bus lock: a subscriber may re-enter the bus
    /// (subscribe, dispose, publish) without deadlocking. Subscribers added
    /// during delivery may or may not see the in-flight value.
    pub fn publish(&self, value: T) {
        let snapshot: Vec<Arc<Observer<T>>> = {
            let state = lock(&self.state);
            if state.closed {
                return;
            }
            state
                .observers
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect()
        };
        for observer in snapshot {
            (observer.on_next)(&value);
        }
    }

    /// Register a value callback. The returned token is the only way to
    /// unsubscribe; dropping it leaves the subscription live.
    pub fn subscribe(&self, on_next: impl Fn(&T) + Send + Sync + 'static) -> Subscription<T> {
        self.subscribe_with(on_next, None, None)
    }

    /// Register a subscriber with optional terminal callbacks.
    pub fn subscribe_with(
        &self,
        on_next: impl Fn(&T) + Send + Sync + 'static,
        on_error: Option<ErrorFn>,
        on_completed: Option<CompletedFn>,
    ) -> Subscription<T> {
        let observer = Arc::new(Observer {
            on_next: Box::new(on_next),
            on_error,
            on_completed,
        });
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            if !state.closed {
                state.observers.push((id, observer));
            }
            id
        };
        Subscription {
            id,
            bus: Arc::downgrade(&self.state),
        }
    }

    /// Close the bus and detach every subscriber, delivering `on_completed`
    /// to each. Idempotent; subsequent `publish` calls are silent no-ops.
    pub fn dispose(&self) {
        let detached = {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.observers)
        };
        for (_, observer) in detached {
            if let Some(on_completed) = &observer.on_completed {
                on_completed();
            }
        }
    }

    /// Terminate the bus with an error, delivering `on_error` to every
    /// subscriber before detaching them. Idempotent like `dispose`.
    pub fn fail(&self, error: NeuroError) {
        let detached = {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.observers)
        };
        for (_, observer) in detached {
            if let Some(on_error) = &observer.on_error {
                on_error(&error);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).observers.len()
    }
}

/// Disposal token for one registration on one bus.
pub struct Subscription<T> {
    id: u64,
    bus: Weak<Mutex<BusState<T>>>,
}

impl<T> Subscription<T> {
    /// Detach this subscriber. Benign if the subscription or the whole bus
    /// is already gone.
    pub fn dispose(&self) {
        if let Some(state) = self.bus.upgrade() {
            lock(&state).observers.retain(|(id, _)| *id != self.id);
        }
    }
}
