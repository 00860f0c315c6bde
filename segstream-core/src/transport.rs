//! Transport contract and the WebSocket client used to receive segments

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use tungstenite::Message;

use crate::error::SegstreamError;
use crate::protocol::Command;

/// Inbound frame as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Binary segment frame
    Binary(Bytes),
    /// Textual control frame
    Text(String),
}

impl Frame {
    /// Whether this frame carries binary payload
    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }

    /// Length of the frame body in bytes
    pub fn len(&self) -> usize {
        match self {
            Frame::Binary(data) => data.len(),
            Frame::Text(text) => text.len(),
        }
    }

    /// Whether the frame body is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving half handed to the engine when a transport opens
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

/// Parameters used to open the transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OpenParams {
    /// Stream URL (ws:// or wss://)
    pub url: String,
    /// Optional start position passed as `from=`
    pub from: Option<String>,
    /// Video selector(s)
    pub video: String,
    /// Audio selector(s)
    pub audio: String,
}

impl OpenParams {
    /// Create open parameters for a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Final URL with `from` and `tracks` query parameters appended
    pub fn to_url(&self) -> String {
        let mut params = Vec::new();
        if let Some(from) = self.from.as_deref().filter(|f| !f.is_empty()) {
            params.push(format!("from={}", from));
        }
        if !self.video.is_empty() || !self.audio.is_empty() {
            params.push(format!("tracks={}{}", self.video, self.audio));
        }
        if params.is_empty() {
            return self.url.clone();
        }
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, sep, params.join("&"))
    }
}

/// Rewrite an http(s) URL into its ws(s) equivalent
pub fn http_to_ws(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Trait for transport implementations
#[async_trait]
pub trait Transport: Send {
    /// Open the connection; frames are delivered through the returned receiver
    async fn open(&mut self, params: &OpenParams) -> Result<FrameReceiver, SegstreamError>;

    /// Queue a command string for sending
    fn send(&mut self, command: &Command) -> Result<(), SegstreamError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), SegstreamError>;

    /// Check if transport is connected
    fn is_connected(&self) -> bool;
}

/// WebSocket transport client
#[derive(Debug)]
pub struct WebSocketTransport {
    config: ConnectionConfig,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    endpoint: Option<String>,
}

impl WebSocketTransport {
    /// Create a transport with the given configuration
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            outbound: None,
            reader: None,
            writer: None,
            endpoint: None,
        }
    }

    /// URL of the current connection, if any
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&mut self, params: &OpenParams) -> Result<FrameReceiver, SegstreamError> {
        if self.is_connected() {
            self.close().await?;
        }

        let url = params.to_url();
        let (ws_stream, _) = tokio::time::timeout(self.config.timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| SegstreamError::Timeout {
                operation: format!("websocket connect to {}", url),
                duration: self.config.timeout,
            })?
            .map_err(|e| SegstreamError::transport(format!("WebSocket connection failed: {}", e)))?;

        info!("WebSocket connected: {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    warn!("WebSocket send failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let frame = match message {
                    Ok(Message::Binary(data)) => Frame::Binary(Bytes::from(data)),
                    Ok(Message::Text(text)) => Frame::Text(text),
                    Ok(Message::Close(reason)) => {
                        debug!("WebSocket closed by peer: {:?}", reason);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("WebSocket receive failed: {}", e);
                        break;
                    }
                };
                if frame_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        self.outbound = Some(out_tx);
        self.reader = Some(reader);
        self.writer = Some(writer);
        self.endpoint = Some(url);
        Ok(frame_rx)
    }

    fn send(&mut self, command: &Command) -> Result<(), SegstreamError> {
        let outbound = self.outbound.as_ref().ok_or(SegstreamError::NotConnected)?;
        debug!("WebSocket send: {:?}", command.to_wire());
        outbound
            .send(Message::Text(command.to_wire()))
            .map_err(|_| SegstreamError::transport("writer task has stopped"))
    }

    async fn close(&mut self) -> Result<(), SegstreamError> {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(None));
        }
        if let Some(mut writer) = self.writer.take() {
            // A peer that stops reading leaves the writer parked in send
            if tokio::time::timeout(self.config.timeout, &mut writer)
                .await
                .is_err()
            {
                warn!("WebSocket writer did not finish within {:?}, aborting", self.config.timeout);
                writer.abort();
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(endpoint) = self.endpoint.take() {
            info!("WebSocket closed: {}", endpoint);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.outbound
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_params_url() {
        let mut params = OpenParams::new("ws://host/stream/mse_ld");
        assert_eq!(params.to_url(), "ws://host/stream/mse_ld");

        params.from = Some("1500000000".to_string());
        params.video = "v1".to_string();
        params.audio = "a1".to_string();
        assert_eq!(
            params.to_url(),
            "ws://host/stream/mse_ld?from=1500000000&tracks=v1a1"
        );

        let params = OpenParams {
            url: "ws://host/s?token=x".to_string(),
            from: None,
            video: String::new(),
            audio: "a2".to_string(),
        };
        assert_eq!(params.to_url(), "ws://host/s?token=x&tracks=a2");
    }

    #[test]
    fn test_http_to_ws() {
        assert_eq!(http_to_ws("http://a/b"), "ws://a/b");
        assert_eq!(http_to_ws("https://a/b"), "wss://a/b");
        assert_eq!(http_to_ws("ws://a/b"), "ws://a/b");
    }

    #[test]
    fn test_send_without_connection() {
        let mut transport = WebSocketTransport::default();
        assert!(!transport.is_connected());
        let err = transport.send(&Command::Resume).unwrap_err();
        assert_eq!(err.error_code(), "NOT_CONNECTED");
    }
}
