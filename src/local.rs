//! In-process host runtime.
//!
//! [`LocalRuntime`] implements [`Runtime`] with plain channels so a bridge
//! and its consumers can live in one process: threads, tests, or a host that
//! does its own transport framing around [`LocalClient`].
//!
//! # Example
//!
//! ```ignore
//! let runtime = LocalRuntime::new();
//! let bridge = wrap_store(store, &runtime, BridgeConfig::new("popup"))?;
//!
//! let mut client = runtime.connect("popup");
//! client.sync()?;
//! let pending = client.dispatch(json!({"type": "INCREMENT"}));
//! let reply = pending.recv_timeout(Duration::from_secs(1))?;
//! ```

use crate::error::{PortError, Result};
use crate::mirror::StateMirror;
use crate::protocol::{PortMessage, ResponseEnvelope, DISPATCH_TYPE};
use crate::responder::Reply;
use crate::runtime::{ConnectListener, DisconnectListener, Event, MessageListener, Port, Runtime};
use crate::types::{EndpointId, MessageSender, State};
use crossbeam_channel::{bounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Default number of undelivered messages a port buffers.
pub const DEFAULT_PORT_BUFFER: usize = 1000;

/// Listener list for one host event.
struct Listeners<L> {
    listeners: RwLock<Vec<L>>,
}

impl<L: Clone> Listeners<L> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Copy of the current listeners, so none run under the lock.
    fn snapshot(&self) -> Vec<L> {
        self.listeners.read().clone()
    }
}

impl<L: Clone + Send + Sync> Event<L> for Listeners<L> {
    fn add_listener(&self, listener: L) {
        self.listeners.write().push(listener);
    }
}

/// Deliver a one-off message to every listener. The first reply wins.
fn deliver(
    listeners: &Listeners<MessageListener>,
    message: &Value,
    sender: &MessageSender,
) -> PendingResponse {
    let (tx, rx) = bounded(1);
    let slot = Arc::new(Mutex::new(Some(tx)));
    let mut handled = false;

    for listener in listeners.snapshot() {
        let slot = Arc::clone(&slot);
        let reply = Reply::new(move |envelope| {
            let tx = slot.lock().take();
            if let Some(tx) = tx {
                let _ = tx.send(envelope);
            }
        });
        handled |= listener(message, sender, reply);
    }

    PendingResponse {
        handled,
        receiver: rx,
    }
}

/// The eventual answer to a one-off message.
///
/// If no listener took the message, or every reply handle was dropped
/// unanswered, the receiver reports disconnection.
pub struct PendingResponse {
    handled: bool,
    receiver: Receiver<ResponseEnvelope>,
}

impl PendingResponse {
    /// Whether some listener promised a reply.
    pub fn handled(&self) -> bool {
        self.handled
    }

    pub fn recv(&self) -> std::result::Result<ResponseEnvelope, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> std::result::Result<ResponseEnvelope, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<ResponseEnvelope, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

struct LinkState {
    closed: bool,
    on_disconnect: Vec<DisconnectListener>,
}

/// Connection status shared by both ends of a local port.
struct Link {
    state: Mutex<LinkState>,
}

impl Link {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LinkState {
                closed: false,
                on_disconnect: Vec::new(),
            }),
        })
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn add_listener(&self, listener: DisconnectListener) {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            listener();
        } else {
            state.on_disconnect.push(listener);
        }
    }

    /// Mark closed and run disconnect listeners once, outside the lock.
    fn close(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.on_disconnect)
        };
        for listener in listeners {
            listener();
        }
    }
}

/// Bridge-side end of a local port.
pub struct LocalPort {
    name: String,
    sender: Sender<PortMessage>,
    link: Arc<Link>,
}

impl Port for LocalPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn post_message(&self, message: &PortMessage) -> std::result::Result<(), PortError> {
        if self.link.is_closed() {
            return Err(PortError::Disconnected);
        }
        self.sender
            .try_send(message.clone())
            .map_err(|e| match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    PortError::Transport("port buffer full".to_string())
                }
                crossbeam_channel::TrySendError::Disconnected(_) => PortError::Disconnected,
            })
    }

    fn on_disconnect(&self, listener: DisconnectListener) {
        self.link.add_listener(listener);
    }
}

/// Consumer-side end of a local port.
///
/// Keeps a [`StateMirror`] up to date with what it receives. Dropping the
/// client disconnects the port.
pub struct LocalClient {
    name: String,
    receiver: Receiver<PortMessage>,
    link: Arc<Link>,
    mirror: StateMirror,
    /// Message surface this client's dispatches go through.
    messages: Arc<Listeners<MessageListener>>,
    sender: MessageSender,
}

impl LocalClient {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next message (blocking).
    pub fn recv(&mut self) -> std::result::Result<PortMessage, RecvError> {
        let message = self.receiver.recv()?;
        self.observe(&message);
        Ok(message)
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&mut self) -> std::result::Result<PortMessage, TryRecvError> {
        let message = self.receiver.try_recv()?;
        self.observe(&message);
        Ok(message)
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<PortMessage, RecvTimeoutError> {
        let message = self.receiver.recv_timeout(timeout)?;
        self.observe(&message);
        Ok(message)
    }

    /// Apply every message already waiting. Returns how many there were.
    pub fn sync(&mut self) -> Result<usize> {
        let mut applied = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.mirror.apply(&message)?;
            applied += 1;
        }
        Ok(applied)
    }

    fn observe(&mut self, message: &PortMessage) {
        if let Err(e) = self.mirror.apply(message) {
            tracing::warn!(port = %self.name, error = %e, "could not apply port message");
        }
    }

    /// The mirrored state as of the last message received.
    pub fn state(&self) -> &State {
        self.mirror.state()
    }

    pub fn endpoint_id(&self) -> Option<EndpointId> {
        self.mirror.endpoint_id()
    }

    pub fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    /// Ask the bridge on this client's channel to dispatch `action`.
    pub fn dispatch(&self, action: Value) -> PendingResponse {
        let request = json!({
            "type": DISPATCH_TYPE,
            "portName": self.name,
            "payload": action,
        });
        deliver(&self.messages, &request, &self.sender)
    }

    pub fn is_connected(&self) -> bool {
        !self.link.is_closed()
    }

    /// Close the port. The bridge side is notified synchronously.
    pub fn disconnect(&self) {
        self.link.close();
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        self.link.close();
    }
}

/// A [`Runtime`] whose transport is in-process channels.
pub struct LocalRuntime {
    on_message: Arc<Listeners<MessageListener>>,
    on_message_external: Option<Arc<Listeners<MessageListener>>>,
    on_connect: Arc<Listeners<ConnectListener>>,
    on_connect_external: Option<Arc<Listeners<ConnectListener>>>,
    buffer_size: usize,
}

impl LocalRuntime {
    /// Runtime with both internal and external surfaces.
    pub fn new() -> Self {
        Self {
            on_message: Listeners::new(),
            on_message_external: Some(Listeners::new()),
            on_connect: Listeners::new(),
            on_connect_external: Some(Listeners::new()),
            buffer_size: DEFAULT_PORT_BUFFER,
        }
    }

    /// Runtime exposing only the internal surfaces.
    pub fn without_external() -> Self {
        Self {
            on_message_external: None,
            on_connect_external: None,
            ..Self::new()
        }
    }

    /// Bound on undelivered messages per port.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn supports_external(&self) -> bool {
        self.on_connect_external.is_some()
    }

    /// Open a port named `name` from within the same application.
    pub fn connect(&self, name: &str) -> LocalClient {
        self.connect_as(name, MessageSender::default())
    }

    /// Like [`connect`](Self::connect), with the sender reported on this
    /// client's dispatches.
    pub fn connect_as(&self, name: &str, sender: MessageSender) -> LocalClient {
        self.open(name, sender, &self.on_connect, Arc::clone(&self.on_message))
    }

    /// Open a port from another application context.
    ///
    /// `None` if this runtime has no external surface.
    pub fn connect_external(&self, name: &str, sender: MessageSender) -> Option<LocalClient> {
        let on_connect = self.on_connect_external.as_ref()?;
        let on_message = self.on_message_external.as_ref()?;
        Some(self.open(name, sender, on_connect, Arc::clone(on_message)))
    }

    fn open(
        &self,
        name: &str,
        sender: MessageSender,
        on_connect: &Listeners<ConnectListener>,
        messages: Arc<Listeners<MessageListener>>,
    ) -> LocalClient {
        let (tx, rx) = bounded(self.buffer_size);
        let link = Link::new();
        let port = Arc::new(LocalPort {
            name: name.to_string(),
            sender: tx,
            link: Arc::clone(&link),
        });

        for listener in on_connect.snapshot() {
            listener(Arc::clone(&port) as Arc<dyn Port>);
        }

        LocalClient {
            name: name.to_string(),
            receiver: rx,
            link,
            mirror: StateMirror::new(),
            messages,
            sender,
        }
    }

    /// Send a one-off message on the internal bus.
    pub fn send_message(&self, message: &Value, sender: &MessageSender) -> PendingResponse {
        deliver(&self.on_message, message, sender)
    }

    /// Send a one-off message on the external bus. `None` if unsupported.
    pub fn send_message_external(
        &self,
        message: &Value,
        sender: &MessageSender,
    ) -> Option<PendingResponse> {
        let listeners = self.on_message_external.as_ref()?;
        Some(deliver(listeners, message, sender))
    }
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime for LocalRuntime {
    fn on_message(&self) -> &dyn Event<MessageListener> {
        &*self.on_message
    }

    fn on_message_external(&self) -> Option<&dyn Event<MessageListener>> {
        self.on_message_external
            .as_deref()
            .map(|listeners| listeners as &dyn Event<MessageListener>)
    }

    fn on_connect(&self) -> &dyn Event<ConnectListener> {
        &*self.on_connect
    }

    fn on_connect_external(&self) -> Option<&dyn Event<ConnectListener>> {
        self.on_connect_external
            .as_deref()
            .map(|listeners| listeners as &dyn Event<ConnectListener>)
    }
}
