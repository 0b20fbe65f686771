//! # Store Bridge
//!
//! Bridges one authoritative state store to any number of remote consumers
//! that can only talk to it over message ports.
//!
//! ## Core Concepts
//!
//! - **Store**: The single source of truth (`get_state`, `dispatch`, `subscribe`)
//! - **Ports**: Named channels opened by consumers and delivered by the host runtime
//! - **Handshake**: Each accepted port first receives its identity and the full state
//! - **Patches**: Afterwards it only receives diffs against what it last saw
//! - **Dispatch**: Consumers ask the store to apply actions and get exactly one reply
//!
//! ## Example
//!
//! ```ignore
//! use store_bridge::{wrap_store, BridgeConfig, LocalRuntime, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new(initial_state, reducer));
//! let runtime = LocalRuntime::new();
//! let bridge = wrap_store(store, &runtime, BridgeConfig::new("popup"))?;
//!
//! // A consumer connects and receives the handshake
//! let mut popup = runtime.connect("popup");
//! popup.sync()?;
//!
//! // Dispatch an action and wait for the reply
//! let reply = popup.dispatch(json!({"type": "INCREMENT"})).recv()?;
//!
//! // Pull the resulting patch into the consumer's mirror
//! popup.sync()?;
//! ```

pub mod bridge;
pub mod deferred;
pub mod diff;
pub mod error;
pub mod local;
pub mod mirror;
pub mod protocol;
pub mod registry;
pub mod responder;
pub mod runtime;
pub mod store;
pub mod types;

// Re-exports
pub use bridge::{wrap_store, Bridge, BridgeConfig};
pub use deferred::{Deferred, Settlement, Settler};
pub use diff::{apply_patch, shallow_diff, DiffStrategy, PatchStrategy};
pub use error::{BridgeError, DispatchError, PortError, Result};
pub use local::{LocalClient, LocalPort, LocalRuntime, PendingResponse};
pub use mirror::StateMirror;
pub use protocol::{
    DispatchRequest, PortMessage, ResponseEnvelope, DISPATCH_TYPE, PATCH_STATE_TYPE,
    PORT_INITIALIZED,
};
pub use registry::ChannelRegistry;
pub use responder::{DispatchResponder, PromiseResponder, Reply};
pub use runtime::{ConnectListener, DisconnectListener, Event, MessageListener, Port, Runtime};
pub use store::{DispatchOutcome, Listener, MemoryStore, Reducer, Store, Unsubscribe};
pub use types::*;
