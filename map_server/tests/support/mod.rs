// Shared bootstrapping and websocket helpers for map server integration tests.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use map_editor::interface_adapters::protocol::{
    ClientMessage, CommandMessage, JoinPayload, ServerMessage,
};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

/// Starts the server once per test binary and returns its `http://` base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // A dedicated thread and runtime so the server outlives each `#[tokio::test]` runtime.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{}", addr));
                map_server::run(listener).await.expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

pub fn ws_url() -> String {
    let base = ensure_server();
    format!("ws://{}/ws", base.trim_start_matches("http://"))
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

pub fn unique_room() -> String {
    format!("room-{}", uuid::Uuid::new_v4())
}

pub async fn send(ws: &mut Ws, message: &ClientMessage) {
    let text = serde_json::to_string(message).expect("client message serializes");
    ws.send(Message::Text(text.into()))
        .await
        .expect("send should succeed");
}

pub async fn send_command(ws: &mut Ws, command: CommandMessage) {
    send(ws, &ClientMessage::MapEditorCommand(command)).await;
}

/// Next server message, skipping control frames. Panics after two seconds.
pub async fn next_message(ws: &mut Ws) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<ServerMessage>(&text)
                        .expect("server message parses");
                }
                Some(Ok(Message::Close(frame))) => panic!("server closed the socket: {frame:?}"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("websocket error: {e}"),
                None => panic!("websocket ended"),
            }
        }
    })
    .await
    .expect("server message should arrive in time")
}

/// True if nothing but control frames arrives within `wait`.
pub async fn stays_quiet(ws: &mut Ws, wait: Duration) -> bool {
    tokio::time::timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(_))) => return,
                Some(Ok(_)) => continue,
                _ => return,
            }
        }
    })
    .await
    .is_err()
}

/// Connects, joins `room_id` and returns the socket with the welcome message.
pub async fn join(room_id: &str, last_seq: Option<u64>) -> (Ws, ServerMessage) {
    let (mut ws, _response) = connect_async(ws_url()).await.expect("connect to /ws");
    send(
        &mut ws,
        &ClientMessage::Join(JoinPayload {
            room_id: room_id.to_string(),
            last_seq,
        }),
    )
    .await;
    let welcome = next_message(&mut ws).await;
    (ws, welcome)
}
