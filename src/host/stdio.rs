//! Stdin/stdout NDJSON bridge for the message router.
//!
//! Reads newline-delimited [`InboundEnvelope`]s, routes them through the
//! [`Router`](crate::host::router::Router), and writes [`OutboundEnvelope`]s (one per delivered `SHOW`)
//! as newline-delimited JSON. A line that cannot be accepted produces an
//! [`ErrorEnvelope`] and is skipped.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::MeanAiConfig;
use crate::error::{MeanAiError, Result};
use crate::host::contract::{
    BackgroundMessage, ErrorEnvelope, InboundEnvelope, OutboundEnvelope,
};
use crate::host::router::{Background, RouterEvent, router_channel};
use crate::host::transport::TabTransport;
use crate::model::LanguageModel;
use crate::tab::TabId;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

/// Transport writing `SHOW` envelopes as JSON lines.
///
/// A tab is listening from its `CONTENT_READY` until its `TAB_CLOSED`.
pub struct StdioTransport {
    attached: Mutex<HashSet<TabId>>,
    lines: mpsc::UnboundedSender<String>,
}

impl StdioTransport {
    pub fn new(lines: mpsc::UnboundedSender<String>) -> Self {
        Self {
            attached: Mutex::new(HashSet::new()),
            lines,
        }
    }

    fn is_attached(&self, tab: TabId) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&tab)
    }
}

#[async_trait]
impl TabTransport for StdioTransport {
    async fn deliver(&self, tab: TabId, message: &BackgroundMessage) -> Result<()> {
        if !self.is_attached(tab) {
            return Err(MeanAiError::DeliveryFailed(format!("{tab} is not listening")));
        }
        let line = to_line(&OutboundEnvelope::new(tab, message.clone()))?;
        self.lines
            .send(line)
            .map_err(|_| MeanAiError::DeliveryFailed("stdout writer closed".to_owned()))
    }

    fn on_ready(&self, tab: TabId) {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tab);
    }

    fn on_closed(&self, tab: TabId) {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);
    }
}

/// Run the bridge on the process's stdin and stdout until stdin closes.
pub async fn run_stdio_bridge(config: &MeanAiConfig, model: Arc<dyn LanguageModel>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::BufWriter::new(tokio::io::stdout());
    run_bridge(stdin, stdout, config, model).await?;
    Ok(())
}

/// Run the bridge over arbitrary streams and return the writer once every
/// queued line has been written.
///
/// Three concurrent tasks:
///
/// 1. **Reader** (this task) parses input lines and sends them through a
///    router client, waiting for each ack so messages from one input stream
///    are routed in order.
/// 2. **Router** runs [`Router::run`](crate::host::router::Router::run).
/// 3. **Writer** owns the output stream and writes queued lines.
///
/// On EOF the client is dropped, the router drains in-flight explain
/// cycles, and the writer finishes once the last line has been flushed.
pub async fn run_bridge<R, W>(
    input: R,
    output: W,
    config: &MeanAiConfig,
    model: Arc<dyn LanguageModel>,
) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let writer_handle = tokio::spawn(run_writer(output, line_rx));

    let transport = Arc::new(StdioTransport::new(line_tx.clone()));
    let background = Background::from_config(config, model, transport);
    let (client, router) = router_channel(
        config.host.request_capacity,
        config.host.event_capacity,
        background,
    );
    let event_handle = tokio::spawn(log_events(client.subscribe_events()));
    let router_handle = tokio::spawn(router.run());

    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("input closed (EOF); shutting down bridge");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to read input; shutting down bridge");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: InboundEnvelope = match serde_json::from_str(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse inbound envelope");
                reply_error(&line_tx, format!("failed to parse inbound envelope: {e}"));
                continue;
            }
        };
        if let Err(e) = envelope.validate() {
            reply_error(&line_tx, format!("invalid inbound envelope: {e}"));
            continue;
        }

        match client.send(envelope.tab_id, envelope.message).await {
            Ok(dispatch) => {
                tracing::debug!(tab_id = %envelope.tab_id, ?dispatch, "message routed");
            }
            Err(e) => {
                tracing::error!(error = %e, "message dispatch failed");
                reply_error(&line_tx, format!("dispatch failed: {e}"));
            }
        }
    }

    drop(client);
    if let Err(e) = router_handle.await {
        tracing::error!(error = %e, "router task failed");
    }
    event_handle.abort();
    let _ = event_handle.await;
    drop(line_tx);

    writer_handle
        .await
        .map_err(|e| MeanAiError::Channel(format!("writer task failed: {e}")))?
}

async fn run_writer<W>(mut output: W, mut lines: mpsc::UnboundedReceiver<String>) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(output)
}

async fn log_events(mut events: broadcast::Receiver<RouterEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(?event, "router event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event logger lagged; some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn reply_error(lines: &mpsc::UnboundedSender<String>, message: String) {
    match to_line(&ErrorEnvelope::new(message)) {
        Ok(line) => {
            let _ = lines.send(line);
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize error envelope"),
    }
}

fn to_line<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| MeanAiError::Protocol(format!("failed to serialize envelope: {e}")))
}
