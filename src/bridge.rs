//! Wiring a store to the host runtime: configuration, setup and the
//! dispatch bridge.

use crate::diff::{shallow_diff, DiffStrategy};
use crate::error::{BridgeError, Result};
use crate::protocol::DispatchRequest;
use crate::registry::ChannelRegistry;
use crate::responder::{DispatchResponder, PromiseResponder, Reply};
use crate::runtime::{ConnectListener, MessageListener, Port, Runtime};
use crate::store::{DispatchOutcome, Store};
use crate::types::{Action, EndpointId, MessageSender, SENDER_KEY};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Bridge configuration.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Name every accepted port and dispatch request must carry. Required.
    pub channel_name: String,

    /// How dispatch outcomes are turned into replies.
    /// Default: [`PromiseResponder`]
    pub dispatch_responder: Option<Arc<dyn DispatchResponder>>,

    /// Differ used for every endpoint's patches.
    /// Default: [`shallow_diff`]
    pub diff_strategy: DiffStrategy,
}

impl BridgeConfig {
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            ..Default::default()
        }
    }

    pub fn with_responder(mut self, responder: Arc<dyn DispatchResponder>) -> Self {
        self.dispatch_responder = Some(responder);
        self
    }

    pub fn with_diff_strategy(mut self, diff_strategy: DiffStrategy) -> Self {
        self.diff_strategy = diff_strategy;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_name: String::new(),
            dispatch_responder: None,
            diff_strategy: shallow_diff,
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("channel_name", &self.channel_name)
            .field("custom_responder", &self.dispatch_responder.is_some())
            .finish_non_exhaustive()
    }
}

/// Connects one store to any number of remote consumers.
pub struct Bridge {
    channel_name: String,
    store: Arc<dyn Store>,
    registry: Arc<ChannelRegistry>,
    responder: Arc<dyn DispatchResponder>,
}

/// Build a bridge for `store` and register it on every surface `runtime`
/// exposes.
///
/// Missing external surfaces are skipped with a warning. A missing channel
/// name is fatal.
pub fn wrap_store(
    store: Arc<dyn Store>,
    runtime: &dyn Runtime,
    config: BridgeConfig,
) -> Result<Arc<Bridge>> {
    let bridge = Bridge::new(store, config)?;
    bridge.attach(runtime);
    Ok(bridge)
}

impl Bridge {
    /// Build a bridge without registering it on a runtime.
    pub fn new(store: Arc<dyn Store>, config: BridgeConfig) -> Result<Arc<Self>> {
        if config.channel_name.is_empty() {
            return Err(BridgeError::MissingChannelName);
        }

        let registry = ChannelRegistry::new(
            config.channel_name.clone(),
            Arc::clone(&store),
            config.diff_strategy,
        );
        let responder = config
            .dispatch_responder
            .unwrap_or_else(|| Arc::new(PromiseResponder));

        Ok(Arc::new(Self {
            channel_name: config.channel_name,
            store,
            registry,
            responder,
        }))
    }

    /// Add the bridge's listeners to the runtime's message and connect
    /// events, internal and external.
    pub fn attach(self: &Arc<Self>, runtime: &dyn Runtime) {
        let on_message = self.message_listener();
        runtime.on_message().add_listener(Arc::clone(&on_message));
        match runtime.on_message_external() {
            Some(event) => event.add_listener(on_message),
            None => tracing::warn!("runtime.onMessageExternal is not supported"),
        }

        let on_connect = self.connect_listener();
        runtime.on_connect().add_listener(Arc::clone(&on_connect));
        match runtime.on_connect_external() {
            Some(event) => event.add_listener(on_connect),
            None => tracing::warn!("runtime.onConnectExternal is not supported"),
        }
    }

    fn message_listener(self: &Arc<Self>) -> MessageListener {
        let bridge = Arc::clone(self);
        Arc::new(move |request: &Value, sender: &MessageSender, reply: Reply| {
            bridge.handle_dispatch(request, sender, reply)
        })
    }

    fn connect_listener(self: &Arc<Self>) -> ConnectListener {
        let bridge = Arc::clone(self);
        Arc::new(move |port: Arc<dyn Port>| {
            // Failures are logged by the registry.
            let _ = bridge.connect(port);
        })
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Accept a port opened by a consumer. See [`ChannelRegistry::register`].
    pub fn connect(&self, port: Arc<dyn Port>) -> Result<Option<EndpointId>> {
        self.registry.register(port)
    }

    /// Handle one message from the bus.
    ///
    /// Returns `false`, leaving `reply` unused, for anything that is not a
    /// dispatch request for this channel. Otherwise forwards the action
    /// (with the sender merged in under `_sender`) to the store, hands the
    /// outcome to the responder and returns `true`: the reply may arrive
    /// after this call returns. A payload that is not an object never reaches
    /// the store; the responder gets it as a rejection.
    pub fn handle_dispatch(&self, request: &Value, sender: &MessageSender, reply: Reply) -> bool {
        let Some(request) = DispatchRequest::matching(request, &self.channel_name) else {
            return false;
        };

        let outcome = match action_from(request.payload, sender) {
            Ok(action) => match self.store.dispatch(action) {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = ?e, "error dispatching action");
                    DispatchOutcome::rejected(e.to_string())
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "dispatch request not forwarded");
                DispatchOutcome::rejected(e.to_string())
            }
        };

        self.responder.respond(outcome, reply);
        true
    }
}

/// Build the action handed to the store: the request payload with the
/// sender merged in under `_sender`. A `null` payload is an empty action.
fn action_from(payload: Value, sender: &MessageSender) -> Result<Action> {
    let mut action = match payload {
        Value::Object(map) => map,
        Value::Null => Action::new(),
        other => {
            return Err(BridgeError::InvalidMessage(format!(
                "dispatch payload must be an object, got {other}"
            )))
        }
    };
    action.insert(SENDER_KEY.to_string(), serde_json::to_value(sender)?);
    Ok(action)
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("channel_name", &self.channel_name)
            .field("endpoints", &self.registry.endpoint_count())
            .finish_non_exhaustive()
    }
}
