//! # adjacency-daemon
//!
//! Pipe-driven shell around the adjacency proximity engine.
//!
//! This binary provides:
//! - JSON-lines input on stdin: location observations and commands
//! - JSON-lines output on stdout: proximity transition events
//! - Debounce timers driven by the tokio runtime
//! - Structured logging to file and stderr-visible stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, explicit config
//! cargo run --package adjacency-daemon -- ./config.toml
//!
//! # Production, config from /etc/adjacency/config.toml
//! ADJACENCY_ENV=production ./adjacency-daemon
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use adjacency_core::{
    AdjacencyEngine, EngineConfig, EntityId, Observation, RefreshRequester, SystemClock,
};

mod logging;

/// One line of stdin input.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum InboundMessage {
    /// A location observation for the anchor or one of the targets.
    Observation(Observation),
    /// Ask the location sources for fresh fixes and recompute now.
    Refresh,
    /// Dump every pair snapshot and the aggregate view to stdout.
    Snapshot,
}

/// Refresh call-outs have nowhere to go in a pipe-driven deployment; log
/// them so an operator-side wrapper can react.
struct LoggingRequester;

impl RefreshRequester for LoggingRequester {
    fn request_location_update(&mut self, entity_id: &EntityId) {
        info!(entity = %entity_id, "location refresh requested");
    }
}

fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(arg) = std::env::args().nth(1) {
        return Ok(PathBuf::from(arg));
    }
    Ok(EngineConfig::default_path()?)
}

async fn wait_until(deadline: Option<DateTime<Utc>>) {
    let Some(at) = deadline else {
        return std::future::pending().await;
    };
    let remaining = (at - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);
    tokio::time::sleep(remaining).await;
}

fn handle_line(engine: &mut AdjacencyEngine<SystemClock>, line: &str) {
    let message: InboundMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, "unparseable input line dropped");
            return;
        }
    };

    match message {
        InboundMessage::Observation(observation) => {
            if let Err(err) = engine.observe(observation) {
                warn!(%err, "observation rejected");
            }
        }
        InboundMessage::Refresh => engine.force_refresh(),
        InboundMessage::Snapshot => {
            let dump = serde_json::json!({
                "kind": "snapshot",
                "pairs": engine.snapshots(),
                "aggregate": engine.aggregate_snapshot(),
            });
            println!("{dump}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("ADJACENCY_ENV").as_deref() == Ok("production");
    logging::init(is_production)?;

    let path = config_path()?;
    let config = EngineConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    info!(config = %path.display(), anchor = %config.anchor, "starting adjacency-daemon");

    let mut engine = AdjacencyEngine::new(config)?;
    engine.set_requester(Box::new(LoggingRequester));
    engine.subscribe(|event| match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(err) => error!(%err, "event serialization failed"),
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => handle_line(&mut engine, &line),
                None => break,
            },
            () = wait_until(engine.next_deadline()) => {
                engine.run_due_timers();
            }
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}
