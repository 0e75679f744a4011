//! Long-lived client for the upstream telemetry feed.
//!
//! Maintains a WebSocket connection to the configured endpoint, handing one
//! frame at a time to the ingestor (the previous frame is fully processed
//! before the next is read). Any connect failure, transport error, close or
//! read timeout tears the connection down; the loop waits a fixed delay and
//! reconnects indefinitely.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use sqlx::PgPool;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{error, info, warn};

use crate::hub::{AlertSink, FanoutHub};
use crate::ingest;
use crate::thresholds::ThresholdTable;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn run(url: String, pool: PgPool, hub: Arc<FanoutHub>, table: ThresholdTable) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(url = %url, "connected to telemetry feed");
                if let Err(e) = read_frames(stream, &pool, hub.as_ref(), &table).await {
                    warn!(error = %e, "telemetry connection lost");
                }
            }
            Err(e) => error!(error = %e, url = %url, "telemetry connect failed"),
        }
        info!("reconnecting to telemetry feed");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn read_frames<S>(
    stream: WebSocketStream<S>,
    pool: &PgPool,
    sink: &dyn AlertSink,
    table: &ThresholdTable,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut tx, mut rx) = stream.split();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                tx.send(Message::Ping(Vec::new()))
                    .await
                    .context("heartbeat ping failed")?;
            }
            read = tokio::time::timeout(READ_TIMEOUT, rx.next()) => {
                let message = match read {
                    Err(_) => bail!("no frame within {}s", READ_TIMEOUT.as_secs()),
                    Ok(None) => bail!("stream ended"),
                    Ok(Some(message)) => message.context("transport error")?,
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                        Ok(raw) => ingest::process_telemetry(pool, sink, table, raw).await,
                        Err(e) => warn!(error = %e, "invalid JSON frame dropped"),
                    },
                    Message::Close(frame) => bail!("close frame received: {frame:?}"),
                    Message::Ping(payload) => {
                        tx.send(Message::Pong(payload)).await.context("pong failed")?;
                    }
                    _ => {}
                }
            }
        }
    }
}
