//! Per-endpoint sync state and the patch broadcaster.

use crate::diff::DiffStrategy;
use crate::error::PortError;
use crate::protocol::PortMessage;
use crate::runtime::Port;
use crate::store::{Listener, Store, Unsubscribe};
use crate::types::{EndpointId, Snapshot, State};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::Arc;

struct SyncState {
    /// Last snapshot this endpoint received. `None` until the handshake is out.
    baseline: Option<Snapshot>,
    /// Set once the endpoint is removed; nothing is posted afterwards.
    closed: bool,
}

/// Sync bookkeeping for one registered endpoint.
///
/// Every store notification for this endpoint runs under its lock, so the
/// handshake always precedes the first patch and patches go out in the order
/// the notifications were processed. The lock is reentrant so a port that
/// disconnects from inside `post_message` can still close the endpoint.
pub(crate) struct EndpointSync {
    id: EndpointId,
    port: Arc<dyn Port>,
    diff: DiffStrategy,
    state: ReentrantMutex<RefCell<SyncState>>,
}

impl EndpointSync {
    pub(crate) fn new(id: EndpointId, port: Arc<dyn Port>, diff: DiffStrategy) -> Self {
        Self {
            id,
            port,
            diff,
            state: ReentrantMutex::new(RefCell::new(SyncState {
                baseline: None,
                closed: false,
            })),
        }
    }

    pub(crate) fn port(&self) -> &Arc<dyn Port> {
        &self.port
    }

    /// Subscribe to `store` and send the full-state handshake.
    ///
    /// The baseline is read after subscribing, so no transition can fall
    /// between the handshake state and the first notification. If the
    /// handshake cannot be posted the subscription is closed again.
    pub(crate) fn handshake(
        &self,
        store: &dyn Store,
        listener: Listener,
    ) -> std::result::Result<Unsubscribe, PortError> {
        let guard = self.state.lock();

        let unsubscribe = store.subscribe(listener);
        let baseline = store.get_state();
        let message = PortMessage::PortInitialized {
            endpoint: self.id,
            state: State::clone(&baseline),
        };

        if let Err(e) = self.port.post_message(&message) {
            guard.borrow_mut().closed = true;
            drop(guard);
            unsubscribe.unsubscribe();
            return Err(e);
        }

        guard.borrow_mut().baseline = Some(baseline);
        Ok(unsubscribe)
    }

    /// React to one store transition.
    ///
    /// Posts `diff(baseline, current)` when it is non-empty. The current
    /// state is read under the endpoint lock, so concurrent notifications
    /// never post an older snapshot after a newer one. The baseline only
    /// moves once the patch was accepted by the port.
    pub(crate) fn on_store_change(&self, store: &dyn Store) {
        let guard = self.state.lock();
        let current = store.get_state();

        let changes = {
            let state = guard.borrow();
            if state.closed {
                return;
            }
            let Some(baseline) = state.baseline.as_ref() else {
                return;
            };
            (self.diff)(baseline, &current)
        };

        if changes.is_empty() {
            return;
        }

        let count = changes.len();
        match self.port.post_message(&PortMessage::PatchState(changes)) {
            Ok(()) => {
                let mut state = guard.borrow_mut();
                if !state.closed {
                    state.baseline = Some(current);
                }
                tracing::trace!(endpoint = %self.id, changes = count, "patch sent");
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.id, error = %e, "failed to post patch");
            }
        }
    }

    /// Stop all further delivery to this endpoint.
    pub(crate) fn close(&self) {
        let guard = self.state.lock();
        guard.borrow_mut().closed = true;
    }

    pub(crate) fn baseline(&self) -> Option<Snapshot> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.baseline.clone()
    }
}
