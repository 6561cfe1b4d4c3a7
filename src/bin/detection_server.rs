//! detection_server - live person detection relay
//!
//! This daemon:
//! 1. Loads the configured detector backend (ONNX model by default)
//! 2. Serves `GET /` and `GET /health`
//! 3. Accepts WebSocket clients on `/ws` and answers every frame message
//!    with the person boxes found in it

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use viewguard::{BackendRegistry, ObjectClass, RelayServer, ViewguardConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "ViewGuard live detection relay")]
struct Args {
    /// Listen address (host:port).
    #[arg(long)]
    addr: Option<String>,

    /// Detector backend (tract|contrast, or stub for a dry run).
    #[arg(long)]
    backend: Option<String>,

    /// Path to the ONNX model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Model name reported by `GET /`.
    #[arg(long)]
    model_label: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ViewguardConfig::load()?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(backend) = args.backend {
        config.detector.backend = backend;
    }
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    if let Some(label) = args.model_label {
        config.server.model_label = label;
    }
    config.validate()?;

    log::info!("starting ViewGuard detection server...");
    let registry = BackendRegistry::from_settings(&config.detector)?;
    let detector = registry.backend_for_class(ObjectClass::Person)?;

    let handle = RelayServer::new(config.relay_config(), detector).spawn()?;
    log::info!(
        "websocket endpoint ws://{}/ws, health http://{}/health",
        handle.addr,
        handle.addr
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("detection_server waiting for shutdown signal (Ctrl-C)...");
    rx.recv()
        .map_err(|_| anyhow!("shutdown channel closed unexpectedly"))?;
    log::info!(
        "shutdown signal received, closing {} connection(s)...",
        handle.registry.len()
    );
    handle.stop()?;

    Ok(())
}
