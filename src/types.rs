//! Core types shared by the bridge, the registry and consumers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The store's whole state: a mapping of top-level keys to values.
pub type State = serde_json::Map<String, Value>;

/// An immutable, cheaply shared view of the store's state at one instant.
pub type Snapshot = Arc<State>;

/// An action forwarded to the store's dispatch entry point.
pub type Action = serde_json::Map<String, Value>;

/// Key under which request provenance is merged into a dispatched action.
pub const SENDER_KEY: &str = "_sender";

/// Identity assigned to a registered endpoint.
///
/// Allocated monotonically from zero and never reused for the lifetime of
/// the registry that issued it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub u64);

impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EndpointId({})", self.0)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provenance of an inbound message, as reported by the host runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}

impl MessageSender {
    /// Sender identified only by its id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// One entry of a patch: how a single top-level key differs between two
/// snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChangeRecord {
    /// The key was added or its value replaced.
    Updated { key: String, value: Value },
    /// The key is absent from the newer snapshot.
    Removed { key: String },
}

impl ChangeRecord {
    pub fn updated(key: impl Into<String>, value: Value) -> Self {
        ChangeRecord::Updated {
            key: key.into(),
            value,
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        ChangeRecord::Removed { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            ChangeRecord::Updated { key, .. } | ChangeRecord::Removed { key } => key,
        }
    }

    /// The new value, if the key was updated.
    pub fn new_value(&self) -> Option<&Value> {
        match self {
            ChangeRecord::Updated { value, .. } => Some(value),
            ChangeRecord::Removed { .. } => None,
        }
    }
}
