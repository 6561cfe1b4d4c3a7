//! Live detection relay.
//!
//! One listener serves the HTTP descriptor endpoints and the `/ws`
//! WebSocket. Each accepted connection gets its own thread running a
//! receive, detect, send loop; the detector is shared behind a mutex.

pub mod http;
pub mod protocol;
pub mod registry;

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tungstenite::protocol::Role;
use tungstenite::{Message, WebSocket};

use crate::detect::{DetectParams, SharedDetector};
use http::{ErrorBody, Health, ServiceDescriptor};
pub use protocol::{handle_text, BoxScore, FrameMessage, FrameResponse, Inbound};
pub use registry::{ConnectionId, ConnectionRegistry};

pub const WS_PATH: &str = "/ws";
pub const HEALTH_PATH: &str = "/health";

pub const DEFAULT_ADDR: &str = "0.0.0.0:8001";
pub const DEFAULT_ENGINE_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_ENGINE_IOU: f32 = 0.7;

/// How often blocked loops look at the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub addr: String,
    /// Reported as `model` by `GET /`.
    pub model_label: String,
    /// Thresholds handed to the engine before the per-message filter.
    pub engine: DetectParams,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            model_label: "YOLOv8n".to_string(),
            engine: DetectParams::person(DEFAULT_ENGINE_CONFIDENCE, DEFAULT_ENGINE_IOU),
        }
    }
}

#[derive(Debug)]
pub struct RelayHandle {
    pub addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RelayHandle {
    /// Stop accepting, close open connections and wait for every thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("relay accept thread panicked"))?;
        }
        Ok(())
    }
}

pub struct RelayServer {
    cfg: RelayConfig,
    detector: SharedDetector,
    registry: Arc<ConnectionRegistry>,
}

struct ConnectionContext {
    cfg: RelayConfig,
    detector: SharedDetector,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<AtomicBool>,
}

impl RelayServer {
    pub fn new(cfg: RelayConfig, detector: SharedDetector) -> Self {
        Self {
            cfg,
            detector,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Use an externally owned registry.
    pub fn with_registry(mut self, registry: Arc<ConnectionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn spawn(self) -> Result<RelayHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let registry = self.registry.clone();
        let ctx = Arc::new(ConnectionContext {
            cfg: self.cfg,
            detector: self.detector,
            registry: self.registry,
            shutdown: shutdown.clone(),
        });
        let join = std::thread::spawn(move || {
            if let Err(err) = run_relay(listener, ctx) {
                log::error!("detection relay stopped: {}", err);
            }
        });
        log::info!("detection relay listening on {}", addr);

        Ok(RelayHandle {
            addr,
            registry,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_relay(listener: TcpListener, ctx: Arc<ConnectionContext>) -> Result<()> {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let result = loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break Ok(());
        }
        workers.retain(|worker| !worker.is_finished());
        match listener.accept() {
            Ok((stream, peer)) => {
                let ctx = ctx.clone();
                workers.push(std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, peer, &ctx) {
                        log::warn!("relay request from {} rejected: {:#}", peer, err);
                    }
                }));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(err) => break Err(err.into()),
        }
    };
    for worker in workers {
        if worker.join().is_err() {
            log::error!("relay connection thread panicked");
        }
    }
    result
}

fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    http::set_request_timeout(&stream)?;

    let request = http::read_request(&mut stream)?;
    if request.method != "GET" {
        return http::write_json_response(
            &mut stream,
            405,
            &ErrorBody {
                error: "method_not_allowed",
            },
        );
    }
    match request.path.as_str() {
        "/" => http::write_json_response(
            &mut stream,
            200,
            &ServiceDescriptor::new(&ctx.cfg.model_label),
        ),
        HEALTH_PATH => http::write_json_response(&mut stream, 200, &Health::healthy()),
        WS_PATH => match request.websocket_key() {
            Ok(key) => {
                http::write_upgrade_response(&mut stream, key)?;
                stream.set_read_timeout(Some(SOCKET_POLL_INTERVAL))?;
                let socket = WebSocket::from_partially_read(
                    stream,
                    request.leftover,
                    Role::Server,
                    None,
                );
                serve_websocket(socket, peer, ctx)
            }
            Err(error) => http::write_json_response(&mut stream, 400, &ErrorBody { error }),
        },
        _ => http::write_json_response(&mut stream, 404, &ErrorBody { error: "not_found" }),
    }
}

fn serve_websocket(
    mut socket: WebSocket<TcpStream>,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) -> Result<()> {
    let id = ctx.registry.register(peer)?;
    let result = receive_loop(&mut socket, id, ctx);
    ctx.registry.deregister(id)?;
    result
}

fn receive_loop(
    socket: &mut WebSocket<TcpStream>,
    id: ConnectionId,
    ctx: &ConnectionContext,
) -> Result<()> {
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            close_quietly(socket);
            return Ok(());
        }
        let message = match socket.read() {
            Ok(message) => message,
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(());
            }
            Err(err) => {
                log::info!("client {} dropped: {}", id, err);
                return Ok(());
            }
        };

        match message {
            Message::Text(text) => match handle_text(&text, &ctx.detector, &ctx.cfg.engine) {
                Ok(Some(response)) => {
                    let payload = serde_json::to_string(&response)?;
                    if let Err(err) = socket.send(Message::Text(payload)) {
                        log::info!("client {} dropped while sending: {}", id, err);
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    log::error!("error in websocket for client {}: {:#}", id, err);
                    close_quietly(socket);
                    return Ok(());
                }
            },
            Message::Binary(_) => log::debug!("client {} sent a binary frame; ignored", id),
            // Close replies are queued by tungstenite; the next read ends the loop.
            _ => {}
        }
    }
}

fn close_quietly(socket: &mut WebSocket<TcpStream>) {
    if socket.close(None).is_ok() {
        let _ = socket.flush();
    }
}
