use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;

const MAX_REQUEST_BYTES: usize = 8192;
const HEADER_END: &[u8] = b"\r\n\r\n";
const WEBSOCKET_VERSION: &str = "13";

#[derive(Debug)]
pub(crate) struct HttpRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    headers: HashMap<String, String>,
    /// Bytes read past the end of the request head.
    pub(crate) leftover: Vec<u8>,
}

impl HttpRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// `Sec-WebSocket-Key` of a version 13 upgrade request. The error is the
    /// code reported in the 400 body.
    pub(crate) fn websocket_key(&self) -> Result<&str, &'static str> {
        let upgrade = self
            .header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        let connection = self.header("connection").is_some_and(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        });
        if !upgrade || !connection {
            return Err("websocket_upgrade_required");
        }
        if self.header("sec-websocket-version").map(str::trim) != Some(WEBSOCKET_VERSION) {
            return Err("unsupported_websocket_version");
        }
        self.header("sec-websocket-key")
            .ok_or("websocket_upgrade_required")
    }
}

pub(crate) fn read_request<S: Read>(stream: &mut S) -> Result<HttpRequest> {
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let head_len = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before request head"));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(HEADER_END.len()).position(|w| w == HEADER_END) {
            break pos + HEADER_END.len();
        }
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
    };
    let leftover = data.split_off(head_len);

    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        leftover,
    })
}

pub(crate) fn write_json_response<S: Write, T: Serialize>(
    stream: &mut S,
    status: u16,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload)
}

pub(crate) fn write_response<S: Write>(
    stream: &mut S,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nAccess-Control-Allow-Origin: *\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()?;
    Ok(())
}

/// `101 Switching Protocols` for an accepted WebSocket upgrade.
pub(crate) fn write_upgrade_response<S: Write>(stream: &mut S, key: &str) -> Result<()> {
    let accept = tungstenite::handshake::derive_accept_key(key.as_bytes());
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub websocket: &'static str,
    pub health: &'static str,
}

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct ServiceDescriptor {
    pub service: &'static str,
    pub status: &'static str,
    pub model: String,
    pub endpoints: Endpoints,
}

impl ServiceDescriptor {
    pub fn new(model: &str) -> Self {
        Self {
            service: "ViewGuard Detection Server",
            status: "running",
            model: model.to_string(),
            endpoints: Endpoints {
                websocket: super::WS_PATH,
                health: super::HEALTH_PATH,
            },
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub model_loaded: bool,
}

impl Health {
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            model_loaded: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: &'static str,
}

pub(crate) fn set_request_timeout(stream: &std::net::TcpStream) -> Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    Ok(())
}
