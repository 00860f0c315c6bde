//! Event system for playback callbacks

use chrono::{DateTime, TimeZone, Utc};
use segstream_core::{MediaInfo, SegstreamError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::SessionState;

/// Events raised by a player
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Presentation position moved
    Progress {
        /// Position as a UTC timestamp in seconds
        utc: f64,
    },
    /// Stream metadata from an init segment
    MediaInfo {
        /// Declared streams
        info: MediaInfo,
    },
    /// A dispatch error was counted, or the session was stopped because of errors
    Error {
        /// Stable error code
        code: &'static str,
        /// Human readable message
        message: String,
        /// Whether the session was stopped
        fatal: bool,
    },
    /// Playback paused
    Paused,
    /// Session state changed
    StateChanged {
        /// New state
        state: SessionState,
    },
}

impl PlayerEvent {
    /// Build an error event from an error
    pub fn error(error: &SegstreamError, fatal: bool) -> Self {
        PlayerEvent::Error {
            code: error.error_code(),
            message: error.to_string(),
            fatal,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::Progress { .. } => "progress",
            PlayerEvent::MediaInfo { .. } => "media_info",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::Paused => "paused",
            PlayerEvent::StateChanged { .. } => "state_changed",
        }
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(self, PlayerEvent::Error { .. })
    }

    /// Progress position as a date, if this is a progress event
    pub fn progress_time(&self) -> Option<DateTime<Utc>> {
        match self {
            PlayerEvent::Progress { utc } => {
                let millis = (utc * 1000.0).round() as i64;
                Utc.timestamp_millis_opt(millis).single()
            }
            _ => None,
        }
    }
}

/// Stream of player events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<PlayerEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<PlayerEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<PlayerEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<PlayerEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Drain every event already delivered
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Event handler for callback-style event processing
#[derive(Debug)]
pub struct EventHandler {
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    /// Create a handler that calls `callback` for every event, in order
    pub fn new<F>(mut callback: F) -> Self
    where
        F: FnMut(PlayerEvent) + Send + 'static,
    {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PlayerEvent>();

        let task_handle = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!("processing event: {}", event.event_type());
                callback(event);
            }
        });

        Self {
            event_tx,
            _task_handle: task_handle,
        }
    }

    /// Get a sender for events
    pub fn sender(&self) -> mpsc::UnboundedSender<PlayerEvent> {
        self.event_tx.clone()
    }
}

/// Fan-out of events to every subscriber
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<PlayerEvent>>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self, tx: mpsc::UnboundedSender<PlayerEvent>) {
        self.subscribers.push(tx);
    }

    pub(crate) fn emit(&mut self, event: PlayerEvent) {
        // Dropped streams unsubscribe themselves
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
