//! End-to-end scenarios over real sockets: a server bound to an ephemeral
//! port, called with the HTTP transport and the socket client.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contractkit_client::{
    CallFailure, CallInput, CallOutcome, ClientError, ClientOptions, ClientSuite, SocketClient,
};
use contractkit_core::schema;
use contractkit_protocol::{Channel, Endpoint, ErrorKind, Registry};
use contractkit_server::{HandlerRequest, HttpServer, ServerConfig, StopMode, Success};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

const AUTHORIZATION: &str = "1234567890";

fn registry() -> Registry {
    Registry::builder()
        .endpoint(
            "getPerson",
            Endpoint::get("/people", schema::object().field("success", schema::boolean()))
                .with_additional_paths(
                    schema::tuple()
                        .item(schema::enumeration(["Bob", "Douglas", "Jeremy"]))
                        .item(schema::enumeration(["Smith", "Jones", "Williams"])),
                )
                .with_headers(
                    schema::object().field("authorization", schema::literal(AUTHORIZATION)),
                ),
        )
        .build()
        .unwrap()
}

/// Starts a people server that records the paths its handler saw.
async fn people_server() -> (HttpServer, SocketAddr, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let mut server = HttpServer::builder(registry(), ServerConfig::default().with_port(0))
        .bind("getPerson", move |request: HandlerRequest| {
            let recorder = recorder.clone();
            async move {
                recorder
                    .lock()
                    .unwrap()
                    .push(request.additional_paths.unwrap_or(Value::Null));
                Ok(Success::ok(json!({ "success": true })))
            }
        })
        .build()
        .unwrap();
    let address = server.start().await.unwrap();
    (server, address, seen)
}

fn suite(address: SocketAddr) -> ClientSuite {
    let options = ClientOptions::new(&format!("http://{}", address))
        .unwrap()
        .with_global_headers(schema::object().field("authorization", schema::string()))
        .with_timeout(Duration::from_secs(5));
    ClientSuite::new(registry(), options)
}

#[tokio::test]
async fn scenario_a_typed_call_reaches_handler() {
    let (mut server, address, seen) = people_server().await;

    let outcome = suite(address)
        .call(
            "getPerson",
            CallInput::new()
                .with_paths(json!(["Bob", "Williams"]))
                .with_headers(json!({ "authorization": AUTHORIZATION })),
        )
        .await
        .unwrap();

    let CallOutcome::Success { data, response } = outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(response.status, 200);
    assert_eq!(data, json!({ "success": true }));
    assert_eq!(*seen.lock().unwrap(), vec![json!(["Bob", "Williams"])]);

    server.stop(StopMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn scenario_b_missing_header_is_rejected_before_the_handler() {
    let (mut server, address, seen) = people_server().await;

    // The typed client refuses to send it.
    let err = suite(address)
        .call("getPerson", CallInput::new().with_paths(json!(["Bob", "Williams"])))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::InvalidInput {
            channel: Channel::Headers,
            ..
        }
    ));

    // A raw request gets a 400 from the server.
    let response = reqwest::get(format!("http://{}/people/Bob/Williams", address))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(body["error"], ErrorKind::InvalidHeaders.as_str());
    assert_eq!(body["zodError"]["issues"][0]["path"], json!(["authorization"]));

    assert!(seen.lock().unwrap().is_empty());
    server.stop(StopMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn wrong_header_value_is_a_transport_failure_when_sent() {
    let (mut server, address, _) = people_server().await;

    // Skip the endpoint literal by calling through a looser contract.
    let loose = Registry::builder()
        .endpoint(
            "getPerson",
            Endpoint::get("/people", schema::any()).with_additional_paths(
                schema::tuple().item(schema::string()).item(schema::string()),
            ),
        )
        .build()
        .unwrap();
    let options = ClientOptions::new(&format!("http://{}", address))
        .unwrap()
        .with_default_header("authorization", "wrong");
    let outcome = ClientSuite::new(loose, options)
        .call("getPerson", CallInput::new().with_paths(json!(["Bob", "Smith"])))
        .await
        .unwrap();

    let Some(failure @ CallFailure::Transport { .. }) = outcome.failure() else {
        panic!("expected a transport failure, got {:?}", outcome);
    };
    assert_eq!(outcome.status(), Some(400));
    assert_eq!(failure.error_body().unwrap().error, "InvalidHeaders");

    server.stop(StopMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn stopped_server_is_a_transport_failure() {
    let (mut server, address, _) = people_server().await;
    server.stop(StopMode::Graceful).await.unwrap();

    let outcome = suite(address)
        .call(
            "getPerson",
            CallInput::new()
                .with_paths(json!(["Bob", "Williams"]))
                .with_headers(json!({ "authorization": AUTHORIZATION })),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        CallOutcome::Failure(CallFailure::Transport { response: None, .. })
    ));
}

async fn chat_server() -> (HttpServer, SocketAddr) {
    let mut server = contractkit_client::demo::server(ServerConfig::default().with_port(0)).unwrap();
    let address = server.start().await.unwrap();
    (server, address)
}

async fn chat_client(address: SocketAddr) -> SocketClient {
    SocketClient::connect(
        &format!("ws://{}/socket", address),
        contractkit_client::demo::socket_definition().unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn scenario_c_socket_echo() {
    let (mut server, address) = chat_server().await;
    let client = chat_client(address).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.listen("message", move |data| {
        let _ = tx.send(data);
    });
    client.emit("sendMessage", json!({ "content": "hi" })).unwrap();

    let message = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no echo received")
        .unwrap();
    assert_eq!(message["content"], "Echo: hi");
    assert!(message["timestamp"].as_f64().unwrap() > 0.0);

    // Exactly one.
    assert!(
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );

    client.close().await;
    server.stop(StopMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn unknown_and_invalid_client_events_are_ignored() {
    let (mut server, address) = chat_server().await;
    let client = chat_client(address).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.listen("message", move |data| {
        let _ = tx.send(data);
    });
    client.emit("shout", json!({ "content": "ignored" })).unwrap();
    client.emit("sendMessage", json!({ "content": 5 })).unwrap();
    client.emit("sendMessage", json!({ "content": "still here" })).unwrap();

    let message = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no echo received")
        .unwrap();
    assert_eq!(message["content"], "Echo: still here");
    assert!(
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );

    client.close().await;
    server.stop(StopMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn persistent_listener_removal() {
    let (mut server, address) = chat_server().await;
    let client = chat_client(address).await;

    let (persistent_tx, mut persistent) = mpsc::unbounded_channel();
    let id = client.listen("message", move |data| {
        let _ = persistent_tx.send(data);
    });

    client.emit("sendMessage", json!({ "content": "one" })).unwrap();
    let first = timeout(Duration::from_secs(5), persistent.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first["content"], "Echo: one");

    assert!(client.remove_listener(id));
    assert!(!client.remove_listener(id));

    // A one-shot listener tells us the next echo has arrived.
    let (once_tx, mut once) = mpsc::unbounded_channel();
    client.listen_once("message", move |data| {
        let _ = once_tx.send(data);
    });
    client.emit("sendMessage", json!({ "content": "two" })).unwrap();
    let second = timeout(Duration::from_secs(5), once.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second["content"], "Echo: two");

    assert!(persistent.try_recv().is_err());
    assert_eq!(client.listener_count(), 0);

    client.close().await;
    server.stop(StopMode::Graceful).await.unwrap();
}

#[tokio::test]
async fn server_emit_reaches_every_session() {
    let (mut server, address) = chat_server().await;
    let first = chat_client(address).await;
    let second = chat_client(address).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    for client in [&first, &second] {
        let tx = tx.clone();
        client.listen("message", move |data| {
            let _ = tx.send(data);
        });
    }

    // Wait until both sessions are registered.
    let socket = server.socket().unwrap().clone();
    timeout(Duration::from_secs(5), async {
        while socket.session_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let delivered = socket
        .emit("message", json!({ "content": "announcement", "timestamp": 1 }))
        .unwrap();
    assert_eq!(delivered, 2);
    for _ in 0..2 {
        let message = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message["content"], "announcement");
    }

    first.close().await;
    second.close().await;
    server.stop(StopMode::Graceful).await.unwrap();
}
