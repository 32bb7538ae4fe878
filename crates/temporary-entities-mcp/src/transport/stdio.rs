//! Stdio transport: JSON-RPC lines on stdin, responses and notifications on stdout.

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;

use temporary_entities::EntityEvent;

use crate::protocol::ProtocolHandler;
use crate::types::{envelope_value, event_notification, JsonRpcError, McpError, McpResult, RequestId};

use super::framing;

/// Stdio transport for desktop MCP clients.
pub struct StdioTransport {
    handler: ProtocolHandler,
    events: Option<broadcast::Receiver<EntityEvent>>,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self { handler, events: None }
    }

    /// Forward finished timers to the client as notifications.
    pub fn with_events(mut self, events: broadcast::Receiver<EntityEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Serve until stdin reaches EOF.
    pub async fn run(&mut self) -> McpResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        let handler = &self.handler;
        let events = &mut self.events;

        tracing::info!("Stdio transport started");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.map_err(McpError::Io)? else {
                        tracing::info!("EOF on stdin, shutting down");
                        break;
                    };
                    if let Some(response) = respond(handler, &line).await {
                        write_frame(&mut stdout, &response).await?;
                    }
                }
                event = recv_event(events) => {
                    if let Some(notification) = event.as_ref().and_then(event_notification) {
                        write_frame(&mut stdout, &envelope_value(&notification)).await?;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn respond(handler: &ProtocolHandler, line: &str) -> Option<serde_json::Value> {
    if line.trim().is_empty() {
        return None;
    }

    match framing::parse_message(line) {
        Ok(msg) => handler.handle_message(msg).await,
        Err(e) => {
            tracing::warn!("Parse error: {e}");
            Some(envelope_value(&JsonRpcError::new(RequestId::Null, e.code(), e.to_string())))
        }
    }
}

/// Next event from the channel. Pends forever without a channel, and drops
/// the channel once it closes.
async fn recv_event(events: &mut Option<broadcast::Receiver<EntityEvent>>) -> Option<EntityEvent> {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };

    match rx.recv().await {
        Ok(event) => Some(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!("Notification stream lagged, skipped {skipped} events");
            None
        }
        Err(broadcast::error::RecvError::Closed) => {
            *events = None;
            None
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(out: &mut W, value: &serde_json::Value) -> McpResult<()> {
    let framed = framing::frame_message(value)?;
    out.write_all(framed.as_bytes()).await.map_err(McpError::Io)?;
    out.flush().await.map_err(McpError::Io)?;
    Ok(())
}
