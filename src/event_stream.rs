//! A minimal broadcast channel for notifying UI observers of parameter changes.
//!
//! This is not a realtime-safe primitive. Emission happens on the UI thread, and both
//! subscribing and emitting may allocate.

use atomic_refcell::AtomicRefCell;
use std::sync::{Arc, Weak};

/// Create a connected emitter/stream pair. The stream only holds a non-owning reference
/// to the emitter, so once the emitter is dropped the stream goes dormant: subscribing
/// through it still succeeds but the returned token is not bound to anything.
pub fn event_channel<T>() -> (EventEmitter<T>, EventStream<T>) {
    let inner = Arc::new(EmitterInner {
        subscribers: AtomicRefCell::new(Vec::new()),
    });
    let stream = EventStream {
        inner: Arc::downgrade(&inner),
    };

    (EventEmitter { inner }, stream)
}

/// The sending half of an [`event_channel()`]. Emission is single-threaded: concurrent
/// `emit()` calls on the same emitter are not supported.
pub struct EventEmitter<T> {
    inner: Arc<EmitterInner<T>>,
}

/// The subscribing half of an [`event_channel()`]. Can be cloned and handed out to
/// anything that wants to observe the emitter.
pub struct EventStream<T> {
    inner: Weak<EmitterInner<T>>,
}

/// Keeps a subscription alive. Once this is dropped the associated callback becomes
/// eligible for removal, which happens lazily during the next `emit()` sweep.
pub struct SubscriptionToken {
    _guard: Arc<TokenGuard>,
}

struct TokenGuard;

struct EmitterInner<T> {
    subscribers: AtomicRefCell<Vec<Subscription<T>>>,
}

struct Subscription<T> {
    token: Weak<TokenGuard>,
    callback: Box<dyn Fn(T) + Send + Sync>,
}

impl<T: Clone> EventEmitter<T> {
    /// Invoke every live callback once, in unspecified order. Subscriptions whose
    /// tokens have been dropped are removed during this sweep. All callback invocations
    /// complete before this function returns.
    ///
    /// Callbacks must not subscribe to or emit on this same emitter, or this will
    /// panic on the re-entrant borrow.
    pub fn emit(&self, value: T) {
        let mut subscribers = self.inner.subscribers.borrow_mut();

        let mut idx = 0;
        while idx < subscribers.len() {
            // Holding the upgraded token keeps the subscription live for the duration
            // of the callback even if the owning token is dropped on another thread.
            match subscribers[idx].token.upgrade() {
                Some(_alive) => {
                    (subscribers[idx].callback)(value.clone());
                    idx += 1;
                }
                None => {
                    subscribers.swap_remove(idx);
                }
            }
        }
    }
}

impl<T> EventStream<T> {
    /// Register a callback, invoked on every `emit()` for as long as the returned token
    /// is alive. If the emitter has already been dropped this is a no-op and the
    /// returned token is unbound.
    pub fn subscribe(&self, callback: impl Fn(T) + Send + Sync + 'static) -> SubscriptionToken {
        let guard = Arc::new(TokenGuard);
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.borrow_mut().push(Subscription {
                token: Arc::downgrade(&guard),
                callback: Box::new(callback),
            });
        }

        SubscriptionToken { _guard: guard }
    }
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
