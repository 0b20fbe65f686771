//! Single-shot asynchronous dispatch results.
//!
//! A [`Deferred`] is the consumer half and a [`Settler`] the producer half of
//! one eventual `Result<Value, String>`. Both halves are consumed by use, so a
//! deferred settles at most once and its callback runs at most once.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Outcome carried by a settled deferred: the resolved value or a rejection
/// message.
pub type Settlement = std::result::Result<Value, String>;

type SettleCallback = Box<dyn FnOnce(Settlement) + Send>;

enum Slot {
    /// Not yet settled; holds the callback once one is attached.
    Pending(Option<SettleCallback>),
    /// Settled before a callback was attached.
    Settled(Settlement),
    /// Callback has run.
    Done,
}

struct Shared {
    slot: Mutex<Slot>,
}

/// A dispatch result that may not be available yet.
pub struct Deferred {
    shared: Arc<Shared>,
}

/// The write half of a [`Deferred`].
pub struct Settler {
    shared: Arc<Shared>,
}

impl Deferred {
    /// Create an unsettled deferred and the handle that settles it.
    pub fn pending() -> (Deferred, Settler) {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Pending(None)),
        });
        (
            Deferred {
                shared: Arc::clone(&shared),
            },
            Settler { shared },
        )
    }

    /// An already resolved deferred.
    pub fn resolved(value: Value) -> Deferred {
        Self::settled(Ok(value))
    }

    /// An already rejected deferred.
    pub fn rejected(message: impl Into<String>) -> Deferred {
        Self::settled(Err(message.into()))
    }

    fn settled(settlement: Settlement) -> Deferred {
        Deferred {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Settled(settlement)),
            }),
        }
    }

    /// Whether a settlement is already available.
    pub fn is_settled(&self) -> bool {
        matches!(*self.shared.slot.lock(), Slot::Settled(_))
    }

    /// Run `callback` exactly once with the settlement.
    ///
    /// Runs immediately on the calling thread if already settled, otherwise on
    /// whichever thread later calls [`Settler::resolve`] or
    /// [`Settler::reject`]. If the settler is dropped unsettled the callback
    /// never runs.
    pub fn on_settle<F>(self, callback: F)
    where
        F: FnOnce(Settlement) + Send + 'static,
    {
        let ready = {
            let mut slot = self.shared.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Done) {
                Slot::Settled(settlement) => Some(settlement),
                Slot::Pending(_) => {
                    *slot = Slot::Pending(Some(Box::new(callback)));
                    return;
                }
                Slot::Done => None,
            }
        };

        if let Some(settlement) = ready {
            callback(settlement);
        }
    }
}

impl Settler {
    pub fn resolve(self, value: Value) {
        self.settle(Ok(value));
    }

    pub fn reject(self, message: impl Into<String>) {
        self.settle(Err(message.into()));
    }

    pub fn settle(self, settlement: Settlement) {
        let callback = {
            let mut slot = self.shared.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Done) {
                Slot::Pending(Some(callback)) => callback,
                Slot::Pending(None) => {
                    *slot = Slot::Settled(settlement);
                    return;
                }
                // A settler only exists for pending slots.
                other => {
                    *slot = other;
                    return;
                }
            }
        };

        callback(settlement);
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl fmt::Debug for Settler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settler").finish_non_exhaustive()
    }
}
