use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use futures::{SinkExt, StreamExt};
use horizon_chat::config::WebSocketConfig;
use horizon_chat::websocket::{Connection, SessionEnd};
use horizon_chat::{AppState, Settings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn other(req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().body(format!("other handler saw {}", req.path()))
}

fn start_server() -> (SocketAddr, AppState, ServerHandle) {
    let _ = tracing_subscriber::fmt::try_init();

    let state = AppState::new(Settings::new_for_test().expect("Failed to load test config"));
    let data = web::Data::new(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(data.upgrade_gate())
            .app_data(data.clone())
            .configure(horizon_chat::routes)
            .route("/other", web::get().to(other))
    })
    .listen(listener)
    .unwrap()
    .workers(1)
    .disable_signals()
    .run();

    let handle = server.handle();
    actix_web::rt::spawn(server);
    (addr, state, handle)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = timeout(WAIT, connect_async(format!("ws://{}/ws", addr)))
        .await
        .expect("connect timed out")
        .expect("upgrade failed");
    ws
}

async fn next_message(ws: &mut Client) -> Message {
    timeout(WAIT, ws.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("websocket error")
}

async fn wait_for_connections(state: &AppState, expected: usize) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while state.pool.connection_count().await != expected {
        assert!(tokio::time::Instant::now() < deadline, "pool never reached {} connections", expected);
        sleep(POLL_INTERVAL).await;
    }
}

/// Sends a raw HTTP/1.1 request and returns the full response text.
async fn raw_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut response))
        .await
        .expect("timed out reading response")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[actix_web::test]
async fn test_echo_and_close_handshake() {
    let (addr, state, handle) = start_server();
    let mut ws = connect(addr).await;
    wait_for_connections(&state, 1).await;

    ws.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(next_message(&mut ws).await, Message::Text("ping".into()));

    ws.send(Message::Text(String::new())).await.unwrap();
    assert_eq!(next_message(&mut ws).await, Message::Text(String::new()));

    let long = "x".repeat(10_000);
    ws.send(Message::Text(long.clone())).await.unwrap();
    assert_eq!(next_message(&mut ws).await, Message::Text(long));

    ws.send(Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "bye".into(),
    })))
    .await
    .unwrap();

    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason, "bye");
        }
        other => panic!("expected close frame, got {:?}", other),
    }

    wait_for_connections(&state, 0).await;
    handle.stop(false).await;
}

#[actix_web::test]
async fn test_sessions_are_independent() {
    let (addr, state, handle) = start_server();
    let first = connect(addr).await;
    let mut second = connect(addr).await;
    wait_for_connections(&state, 2).await;

    // Abruptly drop one client; the other keeps working.
    drop(first);
    wait_for_connections(&state, 1).await;

    second.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(next_message(&mut second).await, Message::Text("still here".into()));

    handle.stop(false).await;
}

#[actix_web::test]
async fn test_shutdown_closes_live_sessions() {
    let (addr, state, handle) = start_server();
    let mut ws = connect(addr).await;

    ws.send(Message::Text("hello".into())).await.unwrap();
    assert_eq!(next_message(&mut ws).await, Message::Text("hello".into()));

    state.shutdown();

    match next_message(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected close frame, got {:?}", other),
    }

    wait_for_connections(&state, 0).await;
    handle.stop(false).await;
}

#[actix_web::test]
async fn test_plain_get_on_endpoint_is_bad_request() {
    let (addr, state, handle) = start_server();

    let response = raw_get(addr, "/ws").await;

    assert!(response.starts_with("HTTP/1.1 400"), "unexpected response: {}", response);
    assert_eq!(state.pool.connection_count().await, 0);
    handle.stop(false).await;
}

#[actix_web::test]
async fn test_other_paths_reach_next_handler() {
    let (addr, _state, handle) = start_server();

    let response = raw_get(addr, "/other").await;

    assert!(response.starts_with("HTTP/1.1 200"), "unexpected response: {}", response);
    assert!(response.ends_with("other handler saw /other"));
    handle.stop(false).await;
}

#[tokio::test]
async fn test_session_over_in_process_socket_pair() {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

    let session = Connection::new(WebSocketConfig::default(), CancellationToken::new());

    let client_side = async move {
        client.send(Message::Text("ping".into())).await.unwrap();
        let echoed = client.next().await.unwrap().unwrap();

        client
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            })))
            .await
            .unwrap();
        let closed = client.next().await.unwrap().unwrap();
        (echoed, closed)
    };

    let (outcome, (echoed, closed)) = tokio::join!(session.run(server), client_side);

    assert_eq!(echoed, Message::Text("ping".into()));
    match closed {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason, "bye");
        }
        other => panic!("expected close frame, got {:?}", other),
    }
    assert!(matches!(outcome.end, SessionEnd::PeerClosed(Some(_))));
    assert_eq!(outcome.messages_processed, 1);
}
