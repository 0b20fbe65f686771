//! Wire protocol between the bridge and its consumers.

use crate::types::{ChangeRecord, EndpointId, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminant of a consumer's dispatch request.
pub const DISPATCH_TYPE: &str = "chromex.dispatch";

/// Discriminant of a patch pushed to a port.
pub const PATCH_STATE_TYPE: &str = "chromex.patch_state";

/// Discriminant of the handshake sent once per accepted port.
pub const PORT_INITIALIZED: &str = "chromex.port_initialized";

/// Messages the bridge posts down a port.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PortMessage {
    /// Handshake: the assigned identity and the full state.
    #[serde(rename = "chromex.port_initialized")]
    PortInitialized {
        #[serde(rename = "portIndex")]
        endpoint: EndpointId,
        #[serde(rename = "prevState")]
        state: State,
    },

    /// Ordered change-set since the last state this port received.
    #[serde(rename = "chromex.patch_state")]
    PatchState(Vec<ChangeRecord>),
}

/// A consumer's request to dispatch an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "portName")]
    pub port_name: String,
    #[serde(default)]
    pub payload: Value,
}

impl DispatchRequest {
    pub fn new(port_name: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: DISPATCH_TYPE.to_string(),
            port_name: port_name.into(),
            payload,
        }
    }

    /// Extract a dispatch request addressed to `channel_name`.
    ///
    /// Anything else on the bus (other discriminants, other channels,
    /// unparseable shapes) yields `None`.
    pub fn matching(message: &Value, channel_name: &str) -> Option<Self> {
        let obj = message.as_object()?;
        if obj.get("type").and_then(Value::as_str) != Some(DISPATCH_TYPE) {
            return None;
        }
        if obj.get("portName").and_then(Value::as_str) != Some(channel_name) {
            return None;
        }
        serde_json::from_value(message.clone()).ok()
    }
}

/// Reply to a dispatch request: exactly one of a value or an error message.
///
/// On the wire this keeps the `{ error, value }` shape, with the unused side
/// set to `null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub enum ResponseEnvelope {
    Resolved(Value),
    Rejected(String),
}

impl ResponseEnvelope {
    pub fn is_error(&self) -> bool {
        matches!(self, ResponseEnvelope::Rejected(_))
    }

    pub fn into_result(self) -> std::result::Result<Value, String> {
        match self {
            ResponseEnvelope::Resolved(value) => Ok(value),
            ResponseEnvelope::Rejected(message) => Err(message),
        }
    }
}

impl From<std::result::Result<Value, String>> for ResponseEnvelope {
    fn from(result: std::result::Result<Value, String>) -> Self {
        match result {
            Ok(value) => ResponseEnvelope::Resolved(value),
            Err(message) => ResponseEnvelope::Rejected(message),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    value: Value,
}

impl From<ResponseEnvelope> for WireEnvelope {
    fn from(envelope: ResponseEnvelope) -> Self {
        match envelope {
            ResponseEnvelope::Resolved(value) => WireEnvelope { error: None, value },
            ResponseEnvelope::Rejected(message) => WireEnvelope {
                error: Some(message),
                value: Value::Null,
            },
        }
    }
}

impl TryFrom<WireEnvelope> for ResponseEnvelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> std::result::Result<Self, String> {
        match (wire.error, wire.value) {
            (None, value) => Ok(ResponseEnvelope::Resolved(value)),
            (Some(message), Value::Null) => Ok(ResponseEnvelope::Rejected(message)),
            (Some(message), _) => Err(format!(
                "response carries both an error ({message}) and a value"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_wire_shape() {
        let mut state = State::new();
        state.insert("count".to_string(), json!(0));

        let msg = PortMessage::PortInitialized {
            endpoint: EndpointId(3),
            state,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": PORT_INITIALIZED,
                "payload": {"portIndex": 3, "prevState": {"count": 0}}
            })
        );
    }

    #[test]
    fn test_patch_wire_shape() {
        let msg = PortMessage::PatchState(vec![ChangeRecord::updated("count", json!(1))]);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": PATCH_STATE_TYPE,
                "payload": [{"change": "updated", "key": "count", "value": 1}]
            })
        );
    }

    #[test]
    fn test_matching_request() {
        let msg = json!({
            "type": DISPATCH_TYPE,
            "portName": "popup",
            "payload": {"type": "INCREMENT"}
        });

        let request = DispatchRequest::matching(&msg, "popup").unwrap();
        assert_eq!(request.payload, json!({"type": "INCREMENT"}));

        assert!(DispatchRequest::matching(&msg, "settings").is_none());
        let other = json!({"type": "other", "portName": "popup"});
        assert!(DispatchRequest::matching(&other, "popup").is_none());
        assert!(DispatchRequest::matching(&json!("hello"), "popup").is_none());
    }

    #[test]
    fn test_envelope_wire_shape() {
        assert_eq!(
            serde_json::to_value(ResponseEnvelope::Resolved(json!(5))).unwrap(),
            json!({"error": null, "value": 5})
        );
        assert_eq!(
            serde_json::to_value(ResponseEnvelope::Rejected("boom".into())).unwrap(),
            json!({"error": "boom", "value": null})
        );
    }

    #[test]
    fn test_envelope_rejects_both_sides() {
        let parsed: std::result::Result<ResponseEnvelope, _> =
            serde_json::from_value(json!({"error": "boom", "value": 1}));
        assert!(parsed.is_err());

        let ok: ResponseEnvelope = serde_json::from_value(json!({"error": null})).unwrap();
        assert_eq!(ok, ResponseEnvelope::Resolved(Value::Null));
    }
}
