use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose, Engine as _};
use image::{ImageFormat, RgbImage};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use viewguard::relay::{ConnectionRegistry, FrameResponse};
use viewguard::{
    ContrastBackend, DetectorBackend, RelayConfig, RelayHandle, RelayServer, SharedDetector,
    StubBackend,
};

type Client = WebSocket<MaybeTlsStream<TcpStream>>;

fn spawn_relay(backend: impl DetectorBackend + 'static) -> RelayHandle {
    let detector: SharedDetector = Arc::new(Mutex::new(backend));
    let cfg = RelayConfig {
        addr: "127.0.0.1:0".to_string(),
        ..RelayConfig::default()
    };
    RelayServer::new(cfg, detector).spawn().expect("spawn relay")
}

fn http_get(addr: SocketAddr, method: &str, path: &str) -> (String, serde_json::Value) {
    http_request(addr, &format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\n\r\n"))
}

fn http_request(addr: SocketAddr, request: &str) -> (String, serde_json::Value) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    stream.write_all(request.as_bytes()).expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    let (head, body) = response.split_once("\r\n\r\n").expect("response head");
    let status = head.lines().next().unwrap_or_default().to_string();
    (status, serde_json::from_str(body).expect("json body"))
}

fn connect(addr: SocketAddr) -> Client {
    let (socket, _) = tungstenite::connect(format!("ws://{addr}/ws")).expect("ws connect");
    if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout");
    }
    socket
}

fn solid_png(width: u32, height: u32) -> String {
    let image = RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).expect("encode png");
    general_purpose::STANDARD.encode(bytes.into_inner())
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn http_endpoints_describe_the_service() {
    let handle = spawn_relay(ContrastBackend::new());

    let (status, body) = http_get(handle.addr, "GET", "/health");
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, serde_json::json!({"status": "healthy", "model_loaded": true}));

    let (status, body) = http_get(handle.addr, "GET", "/");
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body["status"], "running");
    assert_eq!(body["endpoints"]["websocket"], "/ws");
    assert_eq!(body["endpoints"]["health"], "/health");

    let (status, _) = http_get(handle.addr, "GET", "/missing");
    assert_eq!(status, "HTTP/1.1 404 Not Found");
    let (status, _) = http_get(handle.addr, "POST", "/health");
    assert_eq!(status, "HTTP/1.1 405 Method Not Allowed");
    let (status, _) = http_get(handle.addr, "GET", "/ws");
    assert_eq!(status, "HTTP/1.1 400 Bad Request");

    let (status, body) = http_request(
        handle.addr,
        "GET /ws HTTP/1.1\r\nHost: relay\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 8\r\n\r\n",
    );
    assert_eq!(status, "HTTP/1.1 400 Bad Request");
    assert_eq!(body["error"], "unsupported_websocket_version");
    assert!(handle.registry.is_empty());

    handle.stop().expect("stop relay");
}

#[test]
fn only_frame_messages_get_a_reply() {
    let handle = spawn_relay(ContrastBackend::new());
    let mut client = connect(handle.addr);
    assert!(wait_for(|| handle.registry.len() == 1));

    client
        .send(Message::Text(r#"{"type":"ping","camera_id":9}"#.to_string()))
        .expect("send ping");
    client
        .send(Message::Text("{not json".to_string()))
        .expect("send garbage");
    client
        .send(Message::Binary(vec![1, 2, 3]))
        .expect("send binary");
    let frame = format!(
        r#"{{"type":"frame","data":"{}","camera_id":2,"timestamp":"t-42"}}"#,
        solid_png(32, 24)
    );
    client.send(Message::Text(frame)).expect("send frame");

    // The first reply on the wire answers the frame message.
    let reply = loop {
        match client.read().expect("read reply") {
            Message::Text(text) => break text,
            _ => continue,
        }
    };
    let reply: FrameResponse = serde_json::from_str(&reply).expect("frame response");
    assert_eq!(reply.camera_id, 2);
    assert_eq!(reply.timestamp, serde_json::json!("t-42"));
    assert!(reply.detections.is_empty());
    assert_eq!((reply.frame_width, reply.frame_height), (32, 24));

    client.close(None).expect("close");
    let _ = client.flush();
    assert!(wait_for(|| handle.registry.is_empty()));
    handle.stop().expect("stop relay");
}

#[test]
fn inference_failure_closes_the_connection() {
    let handle = spawn_relay(StubBackend::new().failing_on(0));
    let mut client = connect(handle.addr);
    assert!(wait_for(|| handle.registry.len() == 1));

    let frame = format!(r#"{{"type":"frame","data":"{}"}}"#, solid_png(8, 8));
    client.send(Message::Text(frame)).expect("send frame");

    let closed = loop {
        match client.read() {
            Ok(Message::Close(_)) | Err(_) => break true,
            Ok(Message::Text(_)) => break false,
            Ok(_) => continue,
        }
    };
    assert!(closed);
    assert!(wait_for(|| handle.registry.is_empty()));
    handle.stop().expect("stop relay");
}

#[test]
fn stop_disconnects_open_clients() {
    let handle = spawn_relay(ContrastBackend::new());
    let _client = connect(handle.addr);
    assert!(wait_for(|| handle.registry.len() == 1));

    let registry = handle.registry.clone();
    handle.stop().expect("stop relay");
    assert!(registry.is_empty());
}

#[test]
fn connections_are_tracked_in_a_caller_owned_registry() {
    let registry = Arc::new(ConnectionRegistry::new());
    let detector: SharedDetector = Arc::new(Mutex::new(ContrastBackend::new()));
    let cfg = RelayConfig {
        addr: "127.0.0.1:0".to_string(),
        ..RelayConfig::default()
    };
    let handle = RelayServer::new(cfg, detector)
        .with_registry(registry.clone())
        .spawn()
        .expect("spawn relay");
    assert!(Arc::ptr_eq(&registry, &handle.registry));

    let mut first = connect(handle.addr);
    assert!(wait_for(|| registry.len() == 1));
    assert!(registry.contains(0));
    let _second = connect(handle.addr);
    assert!(wait_for(|| registry.len() == 2));
    assert!(registry.contains(1));

    first.close(None).expect("close");
    let _ = first.flush();
    assert!(wait_for(|| !registry.contains(0)));
    assert_eq!(registry.len(), 1);

    handle.stop().expect("stop relay");
    assert!(registry.is_empty());
}
