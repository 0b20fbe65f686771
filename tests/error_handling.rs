//! Error handling and edge case tests.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use store_bridge::{
    wrap_store, Action, Bridge, BridgeConfig, BridgeError, Deferred, DispatchError,
    DispatchOutcome, EndpointId, Listener, LocalRuntime, MemoryStore, MessageSender, Reply,
    ResponseEnvelope, Runtime, Snapshot, State, Store, Unsubscribe, DISPATCH_TYPE,
};

const TIMEOUT: Duration = Duration::from_millis(500);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn counter_store() -> Arc<MemoryStore> {
    let mut initial = State::new();
    initial.insert("count".to_string(), json!(0));

    Arc::new(MemoryStore::new(initial, |state, action| {
        let mut next = state.clone();
        match action.get("type").and_then(Value::as_str) {
            Some("INCREMENT") => {
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                next.insert("count".to_string(), json!(count + 1));
            }
            Some("THROW") => return Err("Reducer threw: bad payload".into()),
            _ => {}
        }
        Ok(next)
    }))
}

/// Store whose dispatch settles later, on another thread.
struct SlowStore {
    inner: Arc<MemoryStore>,
    reject: bool,
}

impl Store for SlowStore {
    fn get_state(&self) -> Snapshot {
        self.inner.get_state()
    }

    fn dispatch(&self, action: Action) -> Result<DispatchOutcome, DispatchError> {
        self.inner.dispatch(action)?;
        let (deferred, settler) = Deferred::pending();
        let reject = self.reject;
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            if reject {
                settler.reject("remote service unavailable");
            } else {
                settler.resolve(json!({"saved": true}));
            }
        });
        Ok(DispatchOutcome::Deferred(deferred))
    }

    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        self.inner.subscribe(listener)
    }
}

// --- Setup Errors ---

#[test]
fn test_missing_channel_name_is_fatal() {
    let runtime = LocalRuntime::new();
    let result = wrap_store(counter_store(), &runtime, BridgeConfig::default());
    assert!(matches!(result, Err(BridgeError::MissingChannelName)));

    // Nothing was registered on the runtime
    let client = runtime.connect("");
    assert!(client.endpoint_id().is_none());
}

#[test]
fn test_missing_external_surface_degrades() {
    init_tracing();
    let store = counter_store();
    let runtime = LocalRuntime::without_external();

    let bridge = wrap_store(store, &runtime, BridgeConfig::new("popup")).unwrap();

    // Internal surfaces still work
    let mut client = runtime.connect("popup");
    assert_eq!(client.sync().unwrap(), 1);
    assert_eq!(bridge.registry().endpoint_count(), 1);
    assert!(runtime
        .connect_external("popup", MessageSender::default())
        .is_none());
}

// --- Dispatch Errors ---

#[test]
fn test_sync_throw_becomes_error_reply() {
    init_tracing();
    let store = counter_store();
    let runtime = LocalRuntime::new();
    let _bridge = wrap_store(store.clone(), &runtime, BridgeConfig::new("popup")).unwrap();

    let mut client = runtime.connect("popup");
    client.sync().unwrap();

    let reply = client
        .dispatch(json!({"type": "THROW"}))
        .recv_timeout(TIMEOUT)
        .unwrap();
    assert_eq!(
        reply,
        ResponseEnvelope::Rejected("Reducer threw: bad payload".to_string())
    );

    // The bridge keeps working
    let reply = client
        .dispatch(json!({"type": "INCREMENT"}))
        .recv_timeout(TIMEOUT)
        .unwrap();
    assert_eq!(reply, ResponseEnvelope::Resolved(Value::Null));
    client.sync().unwrap();
    assert_eq!(client.state()["count"], 1);
}

#[test]
fn test_deferred_resolution_reply() {
    let store = Arc::new(SlowStore {
        inner: counter_store(),
        reject: false,
    });
    let runtime = LocalRuntime::new();
    let _bridge = wrap_store(store, &runtime, BridgeConfig::new("popup")).unwrap();

    let client = runtime.connect("popup");
    let pending = client.dispatch(json!({"type": "INCREMENT"}));
    assert!(pending.handled());

    assert_eq!(
        pending.recv_timeout(TIMEOUT).unwrap(),
        ResponseEnvelope::Resolved(json!({"saved": true}))
    );
    assert!(pending.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn test_deferred_rejection_reply() {
    init_tracing();
    let store = Arc::new(SlowStore {
        inner: counter_store(),
        reject: true,
    });
    let runtime = LocalRuntime::new();
    let _bridge = wrap_store(store, &runtime, BridgeConfig::new("popup")).unwrap();

    let client = runtime.connect("popup");
    let reply = client
        .dispatch(json!({"type": "INCREMENT"}))
        .recv_timeout(TIMEOUT)
        .unwrap();
    assert_eq!(
        reply,
        ResponseEnvelope::Rejected("remote service unavailable".to_string())
    );
}

#[test]
fn test_never_settling_dispatch_stays_pending() {
    struct StuckStore(Arc<MemoryStore>);

    impl Store for StuckStore {
        fn get_state(&self) -> Snapshot {
            self.0.get_state()
        }

        fn dispatch(&self, _action: Action) -> Result<DispatchOutcome, DispatchError> {
            let (deferred, settler) = Deferred::pending();
            // Leak the settler so the deferred never settles
            std::mem::forget(settler);
            Ok(DispatchOutcome::Deferred(deferred))
        }

        fn subscribe(&self, listener: Listener) -> Unsubscribe {
            self.0.subscribe(listener)
        }
    }

    let runtime = LocalRuntime::new();
    let _bridge = wrap_store(
        Arc::new(StuckStore(counter_store())),
        &runtime,
        BridgeConfig::new("popup"),
    )
    .unwrap();

    let pending = runtime.send_message(
        &json!({"type": DISPATCH_TYPE, "portName": "popup", "payload": {}}),
        &MessageSender::default(),
    );
    assert!(pending.handled());
    assert!(matches!(
        pending.recv_timeout(Duration::from_millis(50)),
        Err(crossbeam_channel::RecvTimeoutError::Timeout)
    ));
}

// --- Mismatched Messages ---

#[test]
fn test_mismatched_messages_are_ignored() {
    let store = counter_store();
    let runtime = LocalRuntime::new();
    let _bridge = wrap_store(store.clone(), &runtime, BridgeConfig::new("popup")).unwrap();

    let messages = [
        json!({"type": DISPATCH_TYPE, "portName": "settings", "payload": {"type": "INCREMENT"}}),
        json!({"type": "chromex.state", "portName": "popup", "payload": {"type": "INCREMENT"}}),
        json!({"portName": "popup"}),
        json!("INCREMENT"),
        Value::Null,
    ];

    for message in &messages {
        let pending = runtime.send_message(message, &MessageSender::default());
        assert!(!pending.handled(), "handled {message}");
        assert!(pending.try_recv().is_err());
    }

    assert_eq!(store.get_state()["count"], 0);
}

#[test]
fn test_mismatched_port_name_has_no_effect() {
    let store = counter_store();
    let runtime = LocalRuntime::new();
    let bridge = wrap_store(store.clone(), &runtime, BridgeConfig::new("popup")).unwrap();

    let mut stranger = runtime.connect("devtools");
    assert_eq!(stranger.sync().unwrap(), 0);
    assert_eq!(bridge.registry().endpoint_count(), 0);
    assert_eq!(store.listener_count(), 0);

    // The first accepted port still gets identity 0
    let mut popup = runtime.connect("popup");
    popup.sync().unwrap();
    assert_eq!(popup.endpoint_id(), Some(EndpointId(0)));
}

#[test]
fn test_other_listeners_on_bus_still_answer() {
    let runtime = LocalRuntime::new();
    let _bridge = wrap_store(counter_store(), &runtime, BridgeConfig::new("popup")).unwrap();

    // Another consumer of the same bus answers its own messages
    runtime.on_message().add_listener(Arc::new(
        |message: &Value, _: &MessageSender, reply: Reply| {
            if message["type"] == "ping" {
                reply.send(ResponseEnvelope::Resolved(json!("pong")));
                return true;
            }
            false
        },
    ));

    let pending = runtime.send_message(&json!({"type": "ping"}), &MessageSender::default());
    assert_eq!(
        pending.recv_timeout(TIMEOUT).unwrap(),
        ResponseEnvelope::Resolved(json!("pong"))
    );
}

// --- Endpoint Isolation ---

#[test]
fn test_failing_port_does_not_affect_others() {
    init_tracing();
    let store = counter_store();
    let runtime = LocalRuntime::new().with_buffer_size(1);
    let _bridge = wrap_store(store.clone(), &runtime, BridgeConfig::new("popup")).unwrap();

    // Never drained: every patch to it fails
    let _stalled = runtime.connect("popup");
    let mut healthy = runtime.connect("popup");

    for _ in 0..3 {
        healthy.sync().unwrap();
        store.dispatch(action("INCREMENT")).unwrap();
    }
    healthy.sync().unwrap();

    assert_eq!(healthy.state()["count"], 3);
}

#[test]
fn test_late_notification_after_disconnect_is_dropped() {
    // A store that keeps every listener it was given, like one that
    // snapshots its listener list before notifying.
    struct CapturingStore {
        inner: Arc<MemoryStore>,
        captured: Mutex<Vec<Listener>>,
    }

    impl Store for CapturingStore {
        fn get_state(&self) -> Snapshot {
            self.inner.get_state()
        }

        fn dispatch(&self, action: Action) -> Result<DispatchOutcome, DispatchError> {
            self.inner.dispatch(action)
        }

        fn subscribe(&self, listener: Listener) -> Unsubscribe {
            self.captured.lock().push(Arc::clone(&listener));
            self.inner.subscribe(listener)
        }
    }

    let store = counter_store();
    let capturing = Arc::new(CapturingStore {
        inner: Arc::clone(&store),
        captured: Mutex::new(Vec::new()),
    });
    let runtime = LocalRuntime::new();
    let bridge = Bridge::new(capturing.clone(), BridgeConfig::new("popup")).unwrap();
    bridge.attach(&runtime);

    let mut client = runtime.connect("popup");
    assert_eq!(client.sync().unwrap(), 1);
    client.disconnect();
    assert_eq!(bridge.registry().endpoint_count(), 0);
    assert_eq!(store.listener_count(), 0);

    store.dispatch(action("INCREMENT")).unwrap();

    // Invoking the stale listener posts nothing and does not panic
    let stale: Vec<Listener> = capturing.captured.lock().clone();
    assert_eq!(stale.len(), 1);
    for listener in &stale {
        listener();
    }
    assert_eq!(client.sync().unwrap(), 0);
    assert_eq!(client.state()["count"], 0);
}

fn action(kind: &str) -> Action {
    let mut action = Action::new();
    action.insert("type".to_string(), json!(kind));
    action
}
