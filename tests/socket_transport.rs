//! End-to-end tests of the socket route against a scripted server.

use std::time::Duration;

use serde_json::json;

use media_transport::net::{Connection, ConnectionOptions, ConnectionState, LifecycleStream};
use media_transport::protocol::{Envelope, Method, ResponsePayload};
use media_transport::transport::{ReconnectSupervisor, Route};
use media_transport::lifecycle::launch;
use media_transport::{Shutdown, TransportError};

mod common;

use common::{build_selector, socket_config, wait_socket_open, MockSocketServer};

async fn next_state(lifecycle: &mut LifecycleStream) -> Option<ConnectionState> {
    tokio::time::timeout(Duration::from_secs(5), lifecycle.recv())
        .await
        .expect("timed out waiting for lifecycle transition")
}

fn ok(entity: serde_json::Value) -> ResponsePayload {
    ResponsePayload {
        status: 200,
        status_text: "OK".into(),
        entity,
    }
}

#[tokio::test]
async fn test_event_delivered_exactly_once() {
    let mut server = MockSocketServer::start().await;
    let selector = build_selector(&socket_config(&server.url(), "http://127.0.0.1:9"));

    let (_handle, mut events) = selector.subscribe_stream("FileAdded");
    selector.connect();
    wait_socket_open(&selector).await;

    assert_eq!(
        server.next_envelope().await,
        Envelope::Subscribe { topic: "FileAdded".into() }
    );

    server.push(Envelope::Event {
        topic: "FileAdded".into(),
        payload: json!({"id": 7, "path": "/media/a.mkv"}),
    });
    server.push(Envelope::Event {
        topic: "FileRemoved".into(),
        payload: json!({"id": 8}),
    });

    let payload = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, json!({"id": 7, "path": "/media/a.mkv"}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_none(), "event must be delivered once");
}

#[tokio::test]
async fn test_get_over_socket_resolves_with_entity() {
    let mut server = MockSocketServer::start().await;
    let selector = build_selector(&socket_config(&server.url(), "http://127.0.0.1:9"));
    selector.connect();
    wait_socket_open(&selector).await;
    assert_eq!(selector.route(), Route::Socket);

    let call = tokio::spawn({
        let selector = selector.clone();
        async move { selector.get("/api/movies").await }
    });

    let Envelope::Request { id, request } = server.next_envelope().await else {
        panic!("expected a request envelope");
    };
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.url, "/api/movies");
    assert_eq!(request.entity, None);

    server.push(Envelope::Response {
        id,
        response: ok(json!([{"id": 1}])),
    });

    assert_eq!(call.await.unwrap().unwrap(), json!([{"id": 1}]));
}

#[tokio::test]
async fn test_error_status_over_socket_is_api_error() {
    let mut server = MockSocketServer::start().await;
    let selector = build_selector(&socket_config(&server.url(), "http://127.0.0.1:9"));
    selector.connect();
    wait_socket_open(&selector).await;

    let call = tokio::spawn({
        let selector = selector.clone();
        async move { selector.post("/api/movies", json!({"title": "Alien"})).await }
    });

    let Envelope::Request { id, request } = server.next_envelope().await else {
        panic!("expected a request envelope");
    };
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.entity, Some(json!({"title": "Alien"})));

    server.push(Envelope::Response {
        id,
        response: ResponsePayload {
            status: 409,
            status_text: "Conflict".into(),
            entity: json!({"message": "already exists"}),
        },
    });

    let err = call.await.unwrap().unwrap_err();
    let detail = err.api().expect("api error");
    assert_eq!(detail.status, 409);
    assert_eq!(detail.status_text, "Conflict");
    assert_eq!(detail.body, json!({"message": "already exists"}));
    assert_eq!(detail.url, "/api/movies");
}

#[tokio::test]
async fn test_unreadable_response_body_fails_the_call() {
    let mut server = MockSocketServer::start().await;
    let mut config = socket_config(&server.url(), "http://127.0.0.1:9");
    config.timeouts.request_secs = 0;
    let selector = build_selector(&config);
    selector.connect();
    wait_socket_open(&selector).await;

    let call = tokio::spawn({
        let selector = selector.clone();
        async move { selector.get("/api/movies").await }
    });
    let Envelope::Request { id, .. } = server.next_envelope().await else {
        panic!("expected a request envelope");
    };

    server.push_raw(&format!(
        r#"{{"method":"HttpResponse","id":{},"entity":{{"status":"500","statusText":"Internal Server Error"}}}}"#,
        id
    ));

    let result = tokio::time::timeout(Duration::from_secs(3), call)
        .await
        .expect("call must resolve")
        .unwrap();
    assert!(matches!(result, Err(TransportError::Decode(_))));
    assert!(selector.connection().unwrap().is_open());
}

#[tokio::test]
async fn test_lifecycle_reports_open_then_closed() {
    let server = MockSocketServer::start().await;
    let connection = Connection::open(server.url(), ConnectionOptions::default());
    let mut lifecycle = connection.lifecycle();

    assert_eq!(next_state(&mut lifecycle).await, Some(ConnectionState::Open));
    assert!(connection.is_open());

    server.wait_connections(1).await;
    server.drop_connection();

    assert_eq!(next_state(&mut lifecycle).await, Some(ConnectionState::Closed));
    assert_eq!(next_state(&mut lifecycle).await, None);
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_right_after_open_releases_socket() {
    let server = MockSocketServer::start().await;
    for round in 1..=5 {
        let connection = Connection::open(server.url(), ConnectionOptions::default());
        assert!(connection.wait_open().await);
        connection.close();

        assert_eq!(connection.state(), ConnectionState::Closed);
        // The socket task must hang up even though the Connection is still alive.
        server.wait_ended(round).await;
        drop(connection);
    }
}

#[tokio::test]
async fn test_connection_loss_fails_pending_call() {
    let mut server = MockSocketServer::start().await;
    let selector = build_selector(&socket_config(&server.url(), "http://127.0.0.1:9"));
    let connection = selector.connect();
    wait_socket_open(&selector).await;

    let call = tokio::spawn({
        let selector = selector.clone();
        async move { selector.get("/api/movies/1").await }
    });
    assert!(matches!(server.next_envelope().await, Envelope::Request { .. }));

    server.drop_connection();

    let result = tokio::time::timeout(Duration::from_secs(5), call).await.unwrap().unwrap();
    assert!(matches!(result, Err(TransportError::ConnectionLost)));

    connection.closed().await;
    assert_eq!(selector.route(), Route::Fallback);
}

#[tokio::test]
async fn test_malformed_frames_do_not_break_the_connection() {
    let mut server = MockSocketServer::start().await;
    let selector = build_selector(&socket_config(&server.url(), "http://127.0.0.1:9"));
    let (_handle, mut events) = selector.subscribe_stream("MovieUpdated");
    selector.connect();
    wait_socket_open(&selector).await;
    server.next_envelope().await;

    server.push_raw("not json at all");
    server.push_raw(r#"{"method":"HttpResponse","entity":{"status":200}}"#);
    server.push(Envelope::Response { id: 999, response: ok(json!(null)) });
    server.push(Envelope::Event {
        topic: "MovieUpdated".into(),
        payload: json!({"id": 3}),
    });

    let payload = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, json!({"id": 3}));
    assert!(selector.connection().unwrap().is_open());
}

#[tokio::test]
async fn test_reconnect_resubscribes_topics() {
    let mut server = MockSocketServer::start().await;
    let config = socket_config(&server.url(), "http://127.0.0.1:9");
    let selector = build_selector(&config);
    let (_handle, mut events) = selector.subscribe_stream("FileAdded");

    let shutdown = Shutdown::new();
    let supervisor = ReconnectSupervisor::new(selector.clone(), config.reconnect.clone());
    let task = tokio::spawn(supervisor.run(shutdown.subscribe()));

    assert_eq!(
        server.next_envelope().await,
        Envelope::Subscribe { topic: "FileAdded".into() }
    );
    assert_eq!(server.connections(), 1);

    server.drop_connection();

    // The fresh connection announces the topic again.
    assert_eq!(
        server.next_envelope().await,
        Envelope::Subscribe { topic: "FileAdded".into() }
    );
    assert_eq!(server.connections(), 2);
    wait_socket_open(&selector).await;

    server.push(Envelope::Event {
        topic: "FileAdded".into(),
        payload: json!({"id": 11}),
    });
    let payload = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload, json!({"id": 11}));

    shutdown.trigger();
    task.await.unwrap();
    assert!(selector.connection().is_none());
}

#[tokio::test]
async fn test_unsubscribe_after_last_handler() {
    let mut server = MockSocketServer::start().await;
    let selector = build_selector(&socket_config(&server.url(), "http://127.0.0.1:9"));
    selector.connect();
    wait_socket_open(&selector).await;

    let first = selector.subscribe("MovieAdded", |_| {});
    let second = selector.subscribe("MovieAdded", |_| {});
    assert_eq!(
        server.next_envelope().await,
        Envelope::Subscribe { topic: "MovieAdded".into() }
    );

    assert!(selector.unsubscribe(&first));
    assert!(selector.unsubscribe(&second));
    assert!(!selector.unsubscribe(&second));
    assert_eq!(
        server.next_envelope().await,
        Envelope::Unsubscribe { topic: "MovieAdded".into() }
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.drain().is_empty());
}

#[tokio::test]
async fn test_launched_client_signals_readiness() {
    let mut server = MockSocketServer::start().await;
    let client = launch(&socket_config(&server.url(), "http://127.0.0.1:9"), None);

    let ready = tokio::time::timeout(Duration::from_secs(5), client.wait_ready())
        .await
        .unwrap();
    assert!(ready);
    assert_eq!(client.selector.route(), Route::Socket);

    let call = tokio::spawn({
        let selector = client.selector.clone();
        async move { selector.get("/api/system/status").await }
    });
    let Envelope::Request { id, .. } = server.next_envelope().await else {
        panic!("expected a request envelope");
    };
    server.push(Envelope::Response { id, response: ok(json!({"version": "1"})) });
    assert_eq!(call.await.unwrap().unwrap(), json!({"version": "1"}));

    client.shutdown().await;
}

#[tokio::test]
async fn test_readiness_fails_when_supervisor_gives_up() {
    let mut config = socket_config("ws://127.0.0.1:9/events", "http://127.0.0.1:9");
    config.reconnect.enabled = false;
    let client = launch(&config, None);

    let ready = tokio::time::timeout(Duration::from_secs(5), client.wait_ready())
        .await
        .unwrap();
    assert!(!ready);

    client.shutdown().await;
}
