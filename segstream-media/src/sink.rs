//! Sink contract: the per-track consumer of appended media

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::SinkResult;
use crate::tracks::{BufferMode, TimeRange};

/// A playback sink for one elementary stream.
///
/// `append` and `remove` only start work. The sink reports completion
/// through the [`SinkNotifier`] it was created with, once per operation.
pub trait MediaSink: Send {
    /// Start appending a payload
    fn append(&mut self, payload: Bytes) -> SinkResult<()>;

    /// Start removing `[start, end)` from the buffer
    fn remove(&mut self, start: f64, end: f64) -> SinkResult<()>;

    /// Whether an append or remove is still in progress
    fn is_busy(&self) -> bool;

    /// Buffered intervals in presentation order
    fn buffered(&self) -> SinkResult<Vec<TimeRange>>;

    /// Reset the sink's parser state, dropping any partially appended data
    fn abort(&mut self) -> SinkResult<()> {
        Ok(())
    }

    /// Change how appended segments are placed on the timeline
    fn set_mode(&mut self, _mode: BufferMode) -> SinkResult<()> {
        Ok(())
    }
}

/// Completion notification raised by a sink
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEvent {
    /// Track owning the sink
    pub track_id: u32,
    /// What happened
    pub kind: SinkEventKind,
}

/// Kind of sink notification
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEventKind {
    /// An append or remove finished; the sink is idle again
    UpdateEnd,
    /// An append or remove failed after it was started
    Error(String),
}

/// Handle a sink uses to report completion back to its track queue
#[derive(Debug, Clone)]
pub struct SinkNotifier {
    track_id: u32,
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl SinkNotifier {
    /// Create a notifier for `track_id` writing into `tx`
    pub fn new(track_id: u32, tx: mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self { track_id, tx }
    }

    /// Track this notifier reports for
    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// Report that the sink became idle
    pub fn notify_idle(&self) {
        self.emit(SinkEventKind::UpdateEnd);
    }

    /// Report an asynchronous failure
    pub fn notify_error(&self, reason: impl Into<String>) {
        self.emit(SinkEventKind::Error(reason.into()));
    }

    fn emit(&self, kind: SinkEventKind) {
        // The session may already be torn down; late notifications are dropped.
        if self
            .tx
            .send(SinkEvent {
                track_id: self.track_id,
                kind,
            })
            .is_err()
        {
            trace!("dropping sink notification for track {}", self.track_id);
        }
    }
}
