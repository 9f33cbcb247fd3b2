//! WebSocket transport for run requests.
//!
//! Every text frame carries one JSON event. Frames from the client are
//! decoded into [`ClientEvent`]s and handed to the coordinator; events for
//! the client travel through a bounded per-connection channel drained by a
//! dedicated send task, so output order is the order of emission.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::event::{ClientEvent, ServerEvent};
use crate::orchestrator::{Connection, SessionCoordinator};
use crate::{AppError, Result};

/// Capacity of each connection's outbound event channel.
pub const EVENT_BUFFER: usize = 256;

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the HTTP router serving `/ws` and `/health`.
#[must_use]
pub fn router(coordinator: SessionCoordinator) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(coordinator)
}

/// Parse one inbound text frame.
///
/// # Errors
///
/// Returns `AppError::Transport` when the frame is not a known event.
pub fn decode_frame(text: &str) -> Result<ClientEvent> {
    serde_json::from_str(text).map_err(|err| AppError::Transport(format!("malformed frame: {err}")))
}

/// Serialize one outbound event.
///
/// # Errors
///
/// Returns `AppError::Transport` if serialization fails.
pub fn encode_event(event: &ServerEvent) -> Result<String> {
    serde_json::to_string(event)
        .map_err(|err| AppError::Transport(format!("failed to encode event: {err}")))
}

/// Bind `config`'s address and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Transport` if the listener cannot bind or the server fails.
pub async fn serve(
    config: &GlobalConfig,
    coordinator: SessionCoordinator,
    ct: CancellationToken,
) -> Result<()> {
    let bind = config.bind_addr();
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Transport(format!("failed to bind {bind}: {err}")))?;
    serve_on(listener, coordinator, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Transport` if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    coordinator: SessionCoordinator,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Transport(format!("listener has no address: {err}")))?;
    info!(bind = %local, "starting WebSocket transport");

    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Transport(format!("server error: {err}")))?;

    info!("WebSocket transport shut down");
    Ok(())
}

async fn ws_handler(
    State(coordinator): State<SessionCoordinator>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: SessionCoordinator) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let conn = Connection::new(tx);
    let span = info_span!("connection", connection_id = %conn.id());
    run_connection(socket, coordinator, conn, rx)
        .instrument(span)
        .await;
}

async fn run_connection(
    socket: WebSocket,
    coordinator: SessionCoordinator,
    conn: Connection,
    mut events: mpsc::Receiver<ServerEvent>,
) {
    info!("client connected");
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(
        async move {
            while let Some(event) = events.recv().await {
                let json = match encode_event(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(%err, "dropping unencodable event");
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("socket closed while sending");
                    break;
                }
            }
        }
        .in_current_span(),
    );

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode_frame(text.as_str()) {
                Ok(event) => coordinator.dispatch(&conn, event),
                Err(err) => warn!(%err, "ignoring frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => debug!("binary frame ignored"),
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(err) => {
                warn!(%err, "websocket error");
                break;
            }
        }
    }

    if let Some(report) = coordinator.disconnect(&conn).await {
        debug!(
            removed = report.removed.len(),
            clean = report.is_clean(),
            "disconnect released session files"
        );
    }
    send_task.abort();
    info!("client disconnected");
}
