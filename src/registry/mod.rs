//! Channel registry and per-endpoint state sync.
//!
//! The registry accepts ports opened under the configured channel name,
//! gives each a stable identity and a store subscription, and tears both
//! down when the port disconnects. Each endpoint keeps its own baseline:
//! on every store change it is sent the diff between that baseline and the
//! current state, if there is one.
//!
//! # Example
//!
//! ```ignore
//! let registry = ChannelRegistry::new("popup", store, shallow_diff);
//!
//! // From the host's connect event
//! if let Some(id) = registry.register(port)? {
//!     println!("endpoint {id} connected");
//! }
//! ```

mod endpoint;
mod manager;

pub use manager::ChannelRegistry;
