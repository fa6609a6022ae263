// SPDX-License-Identifier: Apache-2.0
//! Minimal Unix-socket detect-ingress daemon.
//!
//! Accepts newline-delimited JSON [`DetectRequest`]s on a Unix socket and
//! writes back newline-delimited JSON [`DetectResponse`]s, running every
//! request through a single shared [`Coordinator`]. Routing, HTTP, and
//! sidecar integration are out of scope here — this binary exists so an
//! operator can exercise the engine locally (spec.md §1).

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use epe_config::{ConfigService, EngineConfig};
use epe_config_fs::FsConfigStore;
use epe_coordinator::Coordinator;
use epe_protocol::DetectRequest;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DaemonPrefs {
    socket_path: String,
}

impl Default for DaemonPrefs {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/epe-daemon.sock".to_string(),
        }
    }
}

fn now_ms() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config: Option<ConfigService<FsConfigStore>> =
        FsConfigStore::new().map(ConfigService::new).ok();

    let prefs: DaemonPrefs = config
        .as_ref()
        .and_then(|c| c.load::<DaemonPrefs>("daemon").ok().flatten())
        .unwrap_or_default();
    if let Some(cfg) = &config {
        let _ = cfg.save("daemon", &prefs);
    }

    let engine_config: EngineConfig = config
        .as_ref()
        .and_then(|c| c.load::<EngineConfig>("engine").ok().flatten())
        .unwrap_or_default();
    if let Some(cfg) = &config {
        let _ = cfg.save("engine", &engine_config);
    }

    let coordinator = Arc::new(Coordinator::new(&engine_config)?);

    let socket_path = prefs.socket_path.clone();
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;
    info!("epe-daemon listening at {}", socket_path);

    loop {
        let (stream, _) = listener.accept().await?;
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, coordinator).await {
                warn!(?err, "client handler error");
            }
        });
    }
}

async fn handle_client(stream: UnixStream, coordinator: Arc<Coordinator>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut rng = rand::thread_rng();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<DetectRequest>(&line) {
            Ok(request) => {
                coordinator
                    .on_detect_fail_closed(request, now_ms(), None, &mut rng)
                    .await
            }
            Err(err) => {
                warn!(?err, "dropping malformed detect request");
                continue;
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        if writer.write_all(&encoded).await.is_err() {
            break;
        }
    }

    Ok(())
}
