//! End-to-end tests over a real WebSocket connection.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use code_relay::models::event::{ClientEvent, ExitIndicator, ServerEvent};
use code_relay::transport;

use super::test_helpers::{Harness, EVENT_TIMEOUT};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(h: &Harness) -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let coordinator = h.coordinator.clone();
    tokio::spawn(async move { transport::serve_on(listener, coordinator, server_ct).await });
    (addr, ct)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.expect("connect");
    client
}

async fn send(client: &mut Client, event: &ClientEvent) {
    let json = serde_json::to_string(event).expect("encode");
    client.send(Message::Text(json.into())).await.expect("send");
}

async fn recv(client: &mut Client) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(EVENT_TIMEOUT, client.next())
            .await
            .expect("frame within timeout")
            .expect("socket open")
            .expect("valid frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("server event");
        }
    }
}

#[tokio::test]
async fn interactive_run_over_websocket() {
    let h = Harness::new();
    let (addr, ct) = start_server(&h).await;
    let mut client = connect(addr).await;

    // Garbage is ignored; the connection stays usable.
    client
        .send(Message::Text("not json".into()))
        .await
        .expect("send garbage");

    send(
        &mut client,
        &ClientEvent::RunCode {
            language: "sh".into(),
            code: "printf 'Enter a number: '\nread n\necho \"n=$n\"\n".into(),
        },
    )
    .await;

    assert_eq!(recv(&mut client).await, ServerEvent::output("Enter a number: "));
    assert_eq!(recv(&mut client).await, ServerEvent::InputRequest);

    send(&mut client, &ClientEvent::Input { text: "7".into() }).await;
    assert_eq!(recv(&mut client).await, ServerEvent::output("n=7"));
    assert_eq!(
        recv(&mut client).await,
        ServerEvent::Finished(ExitIndicator::exited(0))
    );

    ct.cancel();
}

#[tokio::test]
async fn closing_socket_tears_down_session() {
    let h = Harness::new();
    let (addr, ct) = start_server(&h).await;
    let mut client = connect(addr).await;

    send(
        &mut client,
        &ClientEvent::RunCode {
            language: "compiled".into(),
            code: "echo up\nexec sleep 30\n".into(),
        },
    )
    .await;
    assert_eq!(recv(&mut client).await, ServerEvent::output("up"));
    assert_eq!(h.coordinator.registry().len(), 1);

    client.close(None).await.expect("close");
    drop(client);

    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !(h.coordinator.registry().is_empty() && h.leftover_files().is_empty()) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session not torn down: {:?}",
            h.leftover_files()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    ct.cancel();
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    let h = Harness::new();
    let (addr, ct) = start_server(&h).await;

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with("ok"), "{response}");

    ct.cancel();
}
