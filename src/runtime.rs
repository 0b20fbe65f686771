//! Host runtime capabilities the bridge registers against.
//!
//! The host owns the transport. It opens named ports, delivers one-off
//! messages and reports disconnection; the bridge only adds listeners.

use crate::error::PortError;
use crate::protocol::PortMessage;
use crate::responder::Reply;
use crate::types::MessageSender;
use serde_json::Value;
use std::sync::Arc;

/// Receives one-off messages from the bus.
///
/// Returns `true` if the listener took the message and will answer through
/// the reply handle, possibly later.
pub type MessageListener = Arc<dyn Fn(&Value, &MessageSender, Reply) -> bool + Send + Sync>;

/// Receives newly opened ports.
pub type ConnectListener = Arc<dyn Fn(Arc<dyn Port>) + Send + Sync>;

/// Called once when a port's remote side goes away.
pub type DisconnectListener = Box<dyn FnOnce() + Send>;

/// An event the host fires, to which listeners can be added.
pub trait Event<L>: Send + Sync {
    fn add_listener(&self, listener: L);
}

/// The host's message and connection surfaces.
///
/// The external surfaces carry traffic from other application contexts and
/// may be missing on some hosts.
pub trait Runtime {
    fn on_message(&self) -> &dyn Event<MessageListener>;

    fn on_message_external(&self) -> Option<&dyn Event<MessageListener>>;

    fn on_connect(&self) -> &dyn Event<ConnectListener>;

    fn on_connect_external(&self) -> Option<&dyn Event<ConnectListener>>;
}

/// One open, named, bidirectional port to a remote consumer.
pub trait Port: Send + Sync {
    /// The name the remote side opened the port with.
    fn name(&self) -> &str;

    fn post_message(&self, message: &PortMessage) -> std::result::Result<(), PortError>;

    /// Register a callback for disconnection. Ports that are already
    /// disconnected should run it immediately.
    fn on_disconnect(&self, listener: DisconnectListener);
}
