//! End-to-end tests against an in-process axum server speaking the ticket + WebSocket protocol.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use matchwire_client::ws::{HttpTicketIssuer, ReconnectConfig, TicketIssuer};
use matchwire_client::{handler, ApiClient, ConnectionConfig, LiveConnection};
use matchwire_shared::{ApiError, EventData, NEW_MESSAGE};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct TestServer {
    tickets: Arc<Mutex<HashSet<String>>>,
    ticket_requests: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
    /// Close the first socket right after pushing the initial events.
    close_first: bool,
    pings: mpsc::UnboundedSender<()>,
    received: mpsc::UnboundedSender<String>,
}

struct ServerHandle {
    url: Url,
    state: TestServer,
    pings: mpsc::UnboundedReceiver<()>,
    received: mpsc::UnboundedReceiver<String>,
}

async fn issue_ticket(State(state): State<TestServer>, headers: HeaderMap) -> Response {
    let n = state.ticket_requests.fetch_add(1, Ordering::SeqCst) + 1;
    let authed = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|cookie| cookie.contains("session_token=good"));
    if !authed {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Not authenticated"})),
        )
            .into_response();
    }
    let ticket = format!("tk-{n}");
    state.tickets.lock().unwrap().insert(ticket.clone());
    Json(json!({ "ticket": ticket })).into_response()
}

async fn ws_upgrade(
    State(state): State<TestServer>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let ticket = params.get("ticket").cloned().unwrap_or_default();
    // Tickets are single use.
    if !state.tickets.lock().unwrap().remove(&ticket) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let conn_no = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    ws.on_upgrade(move |socket| serve_socket(socket, state, conn_no))
}

async fn serve_socket(mut socket: WebSocket, state: TestServer, conn_no: usize) {
    let frames = [
        "pong".to_string(),
        "{garbage".to_string(),
        json!({"type": NEW_MESSAGE, "data": {"room_id": format!("r{conn_no}")}}).to_string(),
    ];
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    if state.close_first && conn_no == 1 {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Text(text) = msg {
            if text.as_str() == "ping" {
                let _ = state.pings.send(());
                let _ = socket.send(Message::Text("pong".into())).await;
            } else {
                let _ = state.received.send(text.as_str().to_owned());
            }
        }
    }
}

async fn start_server(close_first: bool) -> ServerHandle {
    let (pings_tx, pings) = mpsc::unbounded_channel();
    let (received_tx, received) = mpsc::unbounded_channel();
    let state = TestServer {
        tickets: Arc::default(),
        ticket_requests: Arc::default(),
        connections: Arc::default(),
        close_first,
        pings: pings_tx,
        received: received_tx,
    };

    let app = Router::new()
        .route("/api/ws/ticket", post(issue_ticket))
        .route("/api/ws", get(ws_upgrade))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ServerHandle {
        url: Url::parse(&format!("http://{addr}")).unwrap(),
        state,
        pings,
        received,
    }
}

fn connect(server: &ServerHandle, session: Option<&str>) -> LiveConnection {
    let mut config = ConnectionConfig::new(server.url.clone());
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
    };
    config.keepalive_interval = Duration::from_millis(50);
    let api = ApiClient::new(server.url.clone()).with_session_token(session.map(str::to_string));
    LiveConnection::with_api(config, api)
}

fn room_ids(conn: &LiveConnection) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    conn.on(
        NEW_MESSAGE,
        handler(move |data| {
            let room = data
                .get("room_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            tx.send(room)?;
            Ok(())
        }),
    );
    rx
}

#[tokio::test]
async fn delivers_pushed_events() {
    let server = start_server(false).await;
    let conn = connect(&server, Some("good"));
    let mut rooms = room_ids(&conn);

    let room = timeout(WAIT, rooms.recv()).await.unwrap().unwrap();
    assert_eq!(room, "r1");
    assert!(conn.is_connected());

    conn.disconnect();
    timeout(WAIT, conn.closed()).await.unwrap();
    assert!(!conn.is_connected());
    assert_eq!(server.state.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnects_with_a_fresh_ticket_after_server_close() {
    let server = start_server(true).await;
    let conn = connect(&server, Some("good"));
    let mut rooms = room_ids(&conn);

    assert_eq!(timeout(WAIT, rooms.recv()).await.unwrap().unwrap(), "r1");
    assert_eq!(timeout(WAIT, rooms.recv()).await.unwrap().unwrap(), "r2");
    assert!(server.state.ticket_requests.load(Ordering::SeqCst) >= 2);
    assert_eq!(server.state.connections.load(Ordering::SeqCst), 2);

    conn.disconnect();
    timeout(WAIT, conn.closed()).await.unwrap();
}

#[tokio::test]
async fn keepalive_reaches_the_server() {
    let mut server = start_server(false).await;
    let conn = connect(&server, Some("good"));

    for _ in 0..2 {
        timeout(WAIT, server.pings.recv()).await.unwrap().unwrap();
    }
    assert!(conn.is_connected());
    conn.disconnect();
}

#[tokio::test]
async fn send_reaches_the_server() {
    let mut server = start_server(false).await;
    let conn = connect(&server, Some("good"));
    let mut rooms = room_ids(&conn);
    timeout(WAIT, rooms.recv()).await.unwrap().unwrap();

    let mut data = EventData::new();
    data.insert("text".to_string(), json!("gg"));
    conn.send("chat", data).unwrap();

    let text = timeout(WAIT, server.received.recv()).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value, json!({"type": "chat", "data": {"text": "gg"}}));
    conn.disconnect();
}

#[tokio::test]
async fn rejected_session_keeps_retrying_quietly() {
    let server = start_server(false).await;
    let conn = connect(&server, None);

    timeout(WAIT, async {
        while server.state.ticket_requests.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(!conn.is_connected());
    assert_eq!(server.state.connections.load(Ordering::SeqCst), 0);

    conn.disconnect();
    timeout(WAIT, conn.closed()).await.unwrap();
    let requests = server.state.ticket_requests.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.state.ticket_requests.load(Ordering::SeqCst), requests);
}

#[tokio::test]
async fn stalled_ticket_endpoint_times_out() {
    let app = Router::new().route(
        "/api/ws/ticket",
        post(|| async { std::future::pending::<Response>().await }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let api = ApiClient::new(Url::parse(&format!("http://{addr}")).unwrap())
        .with_session_token(Some("good".to_string()))
        .with_timeout(Duration::from_millis(100));
    let issuer = HttpTicketIssuer::new(api, "/api/ws/ticket");

    let result = timeout(WAIT, issuer.issue()).await.unwrap();
    assert!(matches!(result, Err(ApiError::Network(_))));
}
