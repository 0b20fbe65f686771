//! Consumer-side copy of the bridged state.

use crate::diff::{apply_patch, PatchStrategy};
use crate::error::{BridgeError, Result};
use crate::protocol::PortMessage;
use crate::types::{EndpointId, State};
use std::fmt;

/// Rebuilds the store's state from the messages received on one port.
#[derive(Clone)]
pub struct StateMirror {
    endpoint: Option<EndpointId>,
    state: State,
    patch: PatchStrategy,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::with_patch_strategy(apply_patch)
    }

    /// Mirror for a bridge configured with a non-default differ.
    pub fn with_patch_strategy(patch: PatchStrategy) -> Self {
        Self {
            endpoint: None,
            state: State::new(),
            patch,
        }
    }

    /// Apply one message from the port.
    ///
    /// A patch before the handshake is an error and leaves the mirror as is.
    pub fn apply(&mut self, message: &PortMessage) -> Result<()> {
        match message {
            PortMessage::PortInitialized { endpoint, state } => {
                self.endpoint = Some(*endpoint);
                self.state = state.clone();
                Ok(())
            }
            PortMessage::PatchState(changes) => {
                if self.endpoint.is_none() {
                    return Err(BridgeError::InvalidMessage(
                        "patch received before handshake".to_string(),
                    ));
                }
                self.state = (self.patch)(&self.state, changes);
                Ok(())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Identity assigned by the bridge's handshake.
    pub fn endpoint_id(&self) -> Option<EndpointId> {
        self.endpoint
    }

    pub fn state(&self) -> &State {
        &self.state
    }
}

impl fmt::Debug for StateMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMirror")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeRecord;
    use serde_json::{json, Value};

    #[test]
    fn test_handshake_then_patches() {
        let mut mirror = StateMirror::new();
        assert!(!mirror.is_ready());

        let mut initial = State::new();
        initial.insert("count".to_string(), json!(0));
        initial.insert("user".to_string(), json!("a"));
        mirror
            .apply(&PortMessage::PortInitialized {
                endpoint: EndpointId(4),
                state: initial,
            })
            .unwrap();
        assert_eq!(mirror.endpoint_id(), Some(EndpointId(4)));

        mirror
            .apply(&PortMessage::PatchState(vec![
                ChangeRecord::updated("count", json!(2)),
                ChangeRecord::removed("user"),
            ]))
            .unwrap();

        assert_eq!(Value::Object(mirror.state().clone()), json!({"count": 2}));
    }

    #[test]
    fn test_patch_before_handshake() {
        let mut mirror = StateMirror::new();
        let result = mirror.apply(&PortMessage::PatchState(vec![ChangeRecord::updated(
            "count",
            json!(1),
        )]));

        assert!(matches!(result, Err(BridgeError::InvalidMessage(_))));
        assert!(mirror.state().is_empty());
    }
}
