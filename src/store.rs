//! The authoritative store contract, plus an in-memory reducer store.

use crate::deferred::Deferred;
use crate::error::DispatchError;
use crate::types::{Action, Snapshot, State};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Called after every state transition. Listeners read the new state from
/// the store themselves.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Result of a dispatch that did not fail synchronously.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The store returned a plain value.
    Ready(Value),
    /// The value will be known later.
    Deferred(Deferred),
}

impl DispatchOutcome {
    /// A deferred outcome already rejected with `message`.
    pub fn rejected(message: impl Into<String>) -> Self {
        DispatchOutcome::Deferred(Deferred::rejected(message))
    }
}

impl From<Value> for DispatchOutcome {
    fn from(value: Value) -> Self {
        DispatchOutcome::Ready(value)
    }
}

impl From<Deferred> for DispatchOutcome {
    fn from(deferred: Deferred) -> Self {
        DispatchOutcome::Deferred(deferred)
    }
}

/// Single-shot capability that stops one listener's notifications.
///
/// Dropping it without calling [`Unsubscribe::unsubscribe`] leaves the
/// listener subscribed.
pub struct Unsubscribe {
    inner: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Unsubscribe {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            inner: Some(Box::new(f)),
        }
    }

    /// A handle with nothing to undo.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(f) = self.inner.take() {
            f();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("armed", &self.inner.is_some())
            .finish()
    }
}

/// The single authoritative state store the bridge wraps.
pub trait Store: Send + Sync {
    /// The current state.
    fn get_state(&self) -> Snapshot;

    /// Apply an action. A synchronous failure is reported as `Err`.
    fn dispatch(&self, action: Action) -> std::result::Result<DispatchOutcome, DispatchError>;

    /// Register a listener called after every state transition.
    fn subscribe(&self, listener: Listener) -> Unsubscribe;
}

/// Reducer used by [`MemoryStore`].
pub type Reducer =
    Box<dyn Fn(&State, &Action) -> std::result::Result<State, DispatchError> + Send + Sync>;

struct ListenerSet {
    listeners: Mutex<BTreeMap<u64, Listener>>,
    next_id: AtomicU64,
}

/// A reducer-driven store held in memory.
///
/// `dispatch` runs the reducer against the current state, swaps in the
/// result and then notifies every listener, outside any lock, in
/// subscription order. A reducer error leaves the state untouched and
/// notifies no one.
pub struct MemoryStore {
    state: RwLock<Snapshot>,
    reducer: Reducer,
    /// Serializes reducer runs so transitions are applied one at a time.
    write_lock: Mutex<()>,
    listeners: Arc<ListenerSet>,
}

impl MemoryStore {
    pub fn new<R>(initial: State, reducer: R) -> Self
    where
        R: Fn(&State, &Action) -> std::result::Result<State, DispatchError> + Send + Sync + 'static,
    {
        Self {
            state: RwLock::new(Arc::new(initial)),
            reducer: Box::new(reducer),
            write_lock: Mutex::new(()),
            listeners: Arc::new(ListenerSet {
                listeners: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.listeners.listeners.lock().len()
    }

    /// Replace the whole state, notifying listeners as a dispatch would.
    pub fn replace_state(&self, state: State) {
        {
            let _lock = self.write_lock.lock();
            *self.state.write() = Arc::new(state);
        }
        self.notify();
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self.listeners.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl Store for MemoryStore {
    fn get_state(&self) -> Snapshot {
        Arc::clone(&self.state.read())
    }

    fn dispatch(&self, action: Action) -> std::result::Result<DispatchOutcome, DispatchError> {
        {
            let _lock = self.write_lock.lock();
            let current = self.get_state();
            let next = (self.reducer)(&current, &action)?;
            *self.state.write() = Arc::new(next);
        }
        self.notify();
        Ok(DispatchOutcome::Ready(Value::Null))
    }

    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        let id = self.listeners.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.listeners.lock().insert(id, listener);

        let set = Arc::downgrade(&self.listeners);
        Unsubscribe::new(move || {
            if let Some(set) = set.upgrade() {
                set.listeners.lock().remove(&id);
            }
        })
    }
}
