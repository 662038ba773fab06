//! End-to-end client wiring: builder, event handlers, file-backed cursor.
//!
//! Run with: cargo test --test test_client

mod common;

use common::*;
use parking_lot::Mutex;
use skyclust_link::{
    ConnectionState, CursorStore, EventHandlers, FileCursorStore, LinkConfig, RealtimeClient,
    TokenSource,
};
use std::sync::Arc;

fn client_with(
    connector: Arc<MockConnector>,
    rpc: Arc<MockRpc>,
    store: Arc<dyn CursorStore>,
    handlers: EventHandlers,
) -> RealtimeClient {
    RealtimeClient::builder()
        .token("tok")
        .connection_options(fast_options())
        .cursor_store(store)
        .event_handlers(handlers)
        .connector(connector)
        .subscription_rpc(rpc)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_handlers_receive_session_and_events() {
    init_logging();
    let (connector, mut streams) = MockConnector::new();
    let rpc = MockRpc::new();

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let (on_connected, on_vm, on_any) = (log.clone(), log.clone(), log.clone());
    let handlers = EventHandlers::new()
        .on_connected(move |info| on_connected.lock().push(format!("connected:{}", info.connection_id)))
        .on_event("vm-status", move |event| {
            on_vm.lock().push(format!("vm:{}", event.data["vm"].as_str().unwrap_or_default()))
        })
        .on_any_event(move |event| on_any.lock().push(format!("any:{}", event.event_type)));

    let client = client_with(connector, rpc.clone(), Arc::new(skyclust_link::MemoryCursorStore::new()), handlers);
    assert!(client.take_events().is_none());

    client.connect().await.unwrap();
    let stream = next_stream(&mut streams, WAIT).await;
    stream.send(connected("conn-1"));
    let transport = client.transport().clone();
    wait_until(WAIT, || transport.session().is_some()).await;

    let outcome = client.subscribe(&["vm-status"], None, None).await.unwrap();
    assert!(outcome.is_complete());
    assert!(!outcome.subscriber_id.is_empty(), "generated subscriber id");
    assert_eq!(rpc.count(RpcKind::Subscribe, "vm-status"), 1);

    stream.send(frame("1", "vm-status", r#"{"vm":"web-1"}"#));
    stream.send(frame("2", "vpc-created", r#"{"vpc":"v"}"#));
    let seen = log.clone();
    wait_until(WAIT, || seen.lock().len() == 4).await;

    assert_eq!(
        *log.lock(),
        vec!["connected:conn-1", "vm:web-1", "any:vm-status", "any:vpc-created"]
    );
    assert_eq!(client.state(), ConnectionState::Open);

    let status = client.subscription_status().await;
    assert_eq!(status.session_id.as_deref(), Some("conn-1"));

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_file_cursor_survives_client_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream-state.json");

    {
        let (connector, mut streams) = MockConnector::new();
        let store = Arc::new(FileCursorStore::new(&path));
        let client = client_with(connector, MockRpc::new(), store.clone(), EventHandlers::new());
        client.connect().await.unwrap();
        let stream = next_stream(&mut streams, WAIT).await;
        stream.send(connected("conn-1"));
        stream.send(frame("1700000000-8", "vm-status", r#"{"vm":"a"}"#));
        wait_until(WAIT, || {
            store.load().ok().flatten().is_some_and(|c| c.as_str() == "1700000000-8")
        })
        .await;
        client.shutdown().await;
    }

    let (connector, mut streams) = MockConnector::new();
    let client = client_with(
        connector,
        MockRpc::new(),
        Arc::new(FileCursorStore::new(&path)),
        EventHandlers::new(),
    );
    client.connect().await.unwrap();
    let stream = next_stream(&mut streams, WAIT).await;
    assert_eq!(stream.call.cursor.as_deref(), Some("1700000000-8"));
}

#[tokio::test]
async fn test_connect_uses_token_source() {
    init_logging();
    let (connector, mut streams) = MockConnector::new();
    let client = RealtimeClient::builder()
        .token_source(TokenSource::token("from-source"))
        .connector(connector)
        .subscription_rpc(MockRpc::new())
        .build()
        .unwrap();

    client.connect().await.unwrap();
    let stream = next_stream(&mut streams, WAIT).await;
    assert_eq!(stream.call.token, "from-source");
    assert!(client.take_events().is_some());
}

#[tokio::test]
async fn test_builder_from_config() {
    let config = LinkConfig::from_toml_str(
        r#"
[server]
url = "http://localhost:8080"
token = "cfg-token"

[connection]
max_reconnect_attempts = 3

[subscriptions]
pinned = ["system-alert"]
"#,
    )
    .unwrap();

    let client = config.into_builder().unwrap().build().unwrap();
    assert!(client.subscriptions().is_pinned("system-alert"));
    assert!(!client.subscriptions().is_pinned("system-notification"));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
