//! In-process transport
//!
//! Frames are pushed by the owner instead of arriving from the network, and
//! commands are recorded instead of sent. Clones share the same connection.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use segstream_core::{
    BinarySegment, Command, Frame, FrameReceiver, OpenParams, SegstreamError, Transport,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct LoopbackState {
    frames: Option<mpsc::UnboundedSender<Frame>>,
    opened: Vec<OpenParams>,
    sent: Vec<String>,
    closes: usize,
    fail_next_open: Option<String>,
}

/// Transport fed from the same process
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    /// Create a closed transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a text frame; returns false when not connected
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.push(Frame::Text(text.into()))
    }

    /// Deliver a binary segment frame for `track_id`
    pub fn push_segment(&self, track_id: u32, payload: impl Into<Bytes>) -> bool {
        let segment = BinarySegment {
            track_id,
            payload: payload.into(),
        };
        self.push(Frame::Binary(segment.encode()))
    }

    /// Deliver a raw frame
    pub fn push(&self, frame: Frame) -> bool {
        match self.state.lock().frames.as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Commands sent so far, as wire strings
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Parameters of every open, in order
    pub fn opened(&self) -> Vec<OpenParams> {
        self.state.lock().opened.clone()
    }

    /// Number of closes
    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    /// Make the next open fail with `reason`
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state.lock().fail_next_open = Some(reason.into());
    }

    /// Drop the connection as if the peer went away
    pub fn disconnect(&self) {
        self.state.lock().frames = None;
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&mut self, params: &OpenParams) -> Result<FrameReceiver, SegstreamError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next_open.take() {
            return Err(SegstreamError::transport(reason));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.frames = Some(tx);
        state.opened.push(params.clone());
        debug!("loopback opened: {}", params.to_url());
        Ok(rx)
    }

    fn send(&mut self, command: &Command) -> Result<(), SegstreamError> {
        let mut state = self.state.lock();
        if state.frames.is_none() {
            return Err(SegstreamError::NotConnected);
        }
        state.sent.push(command.to_wire());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SegstreamError> {
        let mut state = self.state.lock();
        state.frames = None;
        state.closes += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().frames.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_after_open() {
        let mut transport = LoopbackTransport::new();
        assert!(!transport.push_text("early"));
        assert!(transport.send(&Command::Resume).is_err());

        let mut frames = transport.open(&OpenParams::new("ws://local")).await.unwrap();
        assert!(transport.push_segment(2, Bytes::from_static(b"x")));
        assert!(transport.push_text("{}"));
        transport.send(&Command::Pause).unwrap();

        assert_eq!(
            frames.recv().await,
            Some(Frame::Binary(Bytes::from_static(&[0, 0, 0, 2, b'x'])))
        );
        assert_eq!(frames.recv().await, Some(Frame::Text("{}".to_string())));
        assert_eq!(transport.sent(), vec!["pause".to_string()]);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert_eq!(frames.recv().await, None);
    }
}
