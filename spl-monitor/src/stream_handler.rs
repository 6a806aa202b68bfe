use std::{net::SocketAddr, sync::Arc};

use serde::Deserialize;
use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info, warn};

use spl_rollup::{Result, RollupError};

use crate::db::{Reading, SoundData};

/// Longest line accepted on the live stream before it is discarded.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// One live message from the monitoring client.
#[derive(Debug, Deserialize)]
struct LiveReading {
    dbfs: f64,
}

pub struct StreamHandler {
    data: Arc<SoundData>,
}

impl StreamHandler {
    pub fn new(data: Arc<SoundData>) -> Self {
        Self { data }
    }

    /// Record one JSON line `{"dbfs": <number>}` at the current time.
    pub async fn handle_message(&self, line: &[u8]) -> Result<Reading> {
        let reading: LiveReading = serde_json::from_slice(line)
            .map_err(|e| RollupError::validation(format!("malformed reading: {}", e)))?;

        let recorded = self.data.submit(reading.dbfs, None).await?;
        debug!("Live reading: dbfs={} spl={}", reading.dbfs, recorded.spl);
        Ok(recorded)
    }

    /// Process one line and produce the newline-terminated reply.
    ///
    /// Failures are reported back on the stream; the connection stays open.
    pub async fn reply_to(&self, line: &[u8]) -> Vec<u8> {
        let reply = match self.handle_message(line).await {
            Ok(reading) => json!({ "spl": reading.spl, "timestamp": reading.timestamp }),
            Err(e) => {
                if e.is_validation() {
                    warn!("Rejected live reading: {}", e);
                } else {
                    error!("Failed to record live reading: {}", e);
                }
                json!({ "error": e.to_string() })
            }
        };

        let mut bytes = reply.to_string().into_bytes();
        bytes.push(b'\n');
        bytes
    }
}

/// Accept live-stream connections until the listener fails.
pub async fn run_stream_server(
    listener: TcpListener,
    data: Arc<SoundData>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New stream connection from {}", addr);
                let data = data.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_stream_connection(stream, addr, data).await {
                        error!("Error handling stream connection from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Serve one newline-delimited JSON connection.
pub async fn handle_stream_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    data: Arc<SoundData>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handler = StreamHandler::new(data);
    let mut buffer = vec![0u8; 8192];
    let mut leftover = Vec::new();
    // Set after an overflow until the rest of that line has been dropped
    let mut discarding = false;

    loop {
        let n = match stream.read(&mut buffer).await {
            Ok(0) => {
                info!("Stream connection from {} closed", addr);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                error!("Error reading from {}: {}", addr, e);
                break;
            }
        };

        leftover.extend_from_slice(&buffer[..n]);

        if discarding {
            match leftover.iter().position(|&b| b == b'\n') {
                Some(newline_pos) => {
                    leftover.drain(..=newline_pos);
                    discarding = false;
                }
                None => {
                    leftover.clear();
                    continue;
                }
            }
        }

        while let Some(newline_pos) = leftover.iter().position(|&b| b == b'\n') {
            let line = leftover[..newline_pos].trim_ascii();

            if !line.is_empty() {
                let reply = handler.reply_to(line).await;
                stream.write_all(&reply).await?;
            }

            leftover.drain(..=newline_pos);
        }

        if leftover.len() > MAX_LINE_BYTES {
            warn!("Discarding oversized line from {}", addr);
            leftover.clear();
            discarding = true;
            let reply = json!({ "error": "line too long" }).to_string() + "\n";
            stream.write_all(reply.as_bytes()).await?;
        }
    }

    Ok(())
}
