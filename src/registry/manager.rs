//! Channel registry: endpoint identities, subscriptions and teardown.

use crate::diff::DiffStrategy;
use crate::error::Result;
use crate::runtime::Port;
use crate::store::{Listener, Store, Unsubscribe};
use crate::types::{EndpointId, Snapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::endpoint::EndpointSync;

/// A registered endpoint.
struct Endpoint {
    sync: Arc<EndpointSync>,
    unsubscribe: Unsubscribe,
}

impl Endpoint {
    fn teardown(self) {
        self.sync.close();
        self.unsubscribe.unsubscribe();
    }
}

/// Tracks every accepted port and its store subscription.
///
/// Endpoints are keyed by their [`EndpointId`] both on insertion and on
/// removal; the disconnect handler installed on each port carries that id.
/// Each registration opens exactly one store subscription and each removal
/// closes exactly that one.
pub struct ChannelRegistry {
    channel_name: String,
    store: Arc<dyn Store>,
    diff: DiffStrategy,
    /// Active endpoints by ID.
    endpoints: RwLock<HashMap<EndpointId, Endpoint>>,
    /// Counter for generating endpoint IDs.
    next_id: AtomicU64,
}

impl ChannelRegistry {
    pub fn new(
        channel_name: impl Into<String>,
        store: Arc<dyn Store>,
        diff: DiffStrategy,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel_name: channel_name.into(),
            store,
            diff,
            endpoints: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Accept a newly opened port.
    ///
    /// Ports opened under another name are ignored: `Ok(None)`, nothing
    /// allocated, nothing sent. An accepted port gets the next identity, a
    /// store subscription and the handshake, in that order. If the
    /// handshake cannot be delivered nothing is kept and the error is
    /// returned; the identity is not reused.
    pub fn register(self: &Arc<Self>, port: Arc<dyn Port>) -> Result<Option<EndpointId>> {
        if port.name() != self.channel_name {
            return Ok(None);
        }

        let id = EndpointId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let sync = Arc::new(EndpointSync::new(id, Arc::clone(&port), self.diff));

        let unsubscribe = match sync.handshake(&*self.store, self.listener_for(&sync)) {
            Ok(unsubscribe) => unsubscribe,
            Err(e) => {
                tracing::warn!(
                    endpoint = %id,
                    channel = %self.channel_name,
                    error = %e,
                    "handshake failed"
                );
                return Err(e.into());
            }
        };

        self.endpoints
            .write()
            .insert(id, Endpoint { sync, unsubscribe });

        let registry = Arc::downgrade(self);
        port.on_disconnect(Box::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.unregister(id);
            }
        }));

        tracing::debug!(endpoint = %id, channel = %self.channel_name, "endpoint registered");
        Ok(Some(id))
    }

    /// Store listener for one endpoint. Holds only weak references so a
    /// removed endpoint or a dropped store never keeps the other alive.
    fn listener_for(&self, sync: &Arc<EndpointSync>) -> Listener {
        let sync = Arc::downgrade(sync);
        let store = Arc::downgrade(&self.store);
        Arc::new(move || {
            if let (Some(sync), Some(store)) = (sync.upgrade(), store.upgrade()) {
                sync.on_store_change(&*store);
            }
        })
    }

    /// Remove an endpoint and close its subscription.
    ///
    /// Returns false if the id is not registered (already removed).
    pub fn unregister(&self, id: EndpointId) -> bool {
        let removed = self.endpoints.write().remove(&id);
        match removed {
            Some(endpoint) => {
                endpoint.teardown();
                tracing::debug!(
                    endpoint = %id,
                    channel = %self.channel_name,
                    "endpoint unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Remove the endpoint registered for `port`, matched by object identity.
    pub fn unregister_port(&self, port: &Arc<dyn Port>) -> bool {
        match self.find_port(port) {
            Some(id) => self.unregister(id),
            None => false,
        }
    }

    /// The id under which `port` is registered, if any.
    pub fn find_port(&self, port: &Arc<dyn Port>) -> Option<EndpointId> {
        let target = Arc::as_ptr(port).cast::<()>();
        self.endpoints
            .read()
            .iter()
            .find(|(_, endpoint)| Arc::as_ptr(endpoint.sync.port()).cast::<()>() == target)
            .map(|(id, _)| *id)
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.endpoints.read().contains_key(&id)
    }

    /// Get endpoint count.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.read().len()
    }

    /// Registered ids in ascending order.
    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        let mut ids: Vec<_> = self.endpoints.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// The last snapshot `id` is known to have received.
    pub fn baseline(&self, id: EndpointId) -> Option<Snapshot> {
        let sync = self.endpoints.read().get(&id).map(|e| Arc::clone(&e.sync))?;
        sync.baseline()
    }

    /// Remove every endpoint.
    pub fn clear(&self) {
        let drained: Vec<_> = self.endpoints.write().drain().collect();
        for (_, endpoint) in drained {
            endpoint.teardown();
        }
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        for (_, endpoint) in self.endpoints.get_mut().drain() {
            endpoint.teardown();
        }
    }
}
