//! Track-switch and seek coordination state
//!
//! A seek leaves the coordinator waiting for the next init segment, which
//! resets the sinks instead of flushing them. A track switch holds back every
//! binary frame until the server answers with a control frame; the held
//! frames are then replayed in arrival order.

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;

/// Coordinator state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SwitchState {
    /// No transition in progress
    #[default]
    Idle,
    /// A seek was sent; the next init segment belongs to the new position
    Seeking,
    /// A track switch was sent; binary frames are held until acknowledged
    AwaitingAck {
        /// Binary frames received since the request
        missed: VecDeque<Bytes>,
        /// A seek is also outstanding
        after_seek: bool,
    },
}

impl SwitchState {
    /// Whether the next init segment follows a seek
    pub fn after_seek(&self) -> bool {
        match self {
            SwitchState::Idle => false,
            SwitchState::Seeking => true,
            SwitchState::AwaitingAck { after_seek, .. } => *after_seek,
        }
    }

    /// Whether binary frames are being held back
    pub fn is_awaiting_ack(&self) -> bool {
        matches!(self, SwitchState::AwaitingAck { .. })
    }

    /// Number of frames held back
    pub fn missed_len(&self) -> usize {
        match self {
            SwitchState::AwaitingAck { missed, .. } => missed.len(),
            _ => 0,
        }
    }

    /// Record that a seek was sent
    pub fn mark_seek(&mut self) {
        match self {
            SwitchState::AwaitingAck { after_seek, .. } => *after_seek = true,
            _ => *self = SwitchState::Seeking,
        }
    }

    /// Record that a track switch was sent. Frames already held from an
    /// earlier unacknowledged switch stay queued.
    pub fn begin_switch(&mut self) {
        if self.is_awaiting_ack() {
            return;
        }
        *self = SwitchState::AwaitingAck {
            missed: VecDeque::new(),
            after_seek: self.after_seek(),
        };
    }

    /// Hold a binary frame; hands it back when no switch is pending
    pub fn hold(&mut self, frame: Bytes) -> Result<(), Bytes> {
        match self {
            SwitchState::AwaitingAck { missed, .. } => {
                missed.push_back(frame);
                Ok(())
            }
            _ => Err(frame),
        }
    }

    /// End a pending switch, returning the held frames in arrival order
    pub fn acknowledge(&mut self) -> Option<VecDeque<Bytes>> {
        match std::mem::take(self) {
            SwitchState::AwaitingAck { missed, after_seek } => {
                if after_seek {
                    *self = SwitchState::Seeking;
                }
                Some(missed)
            }
            other => {
                *self = other;
                None
            }
        }
    }

    /// Consume the after-seek marker; returns whether it was set
    pub fn clear_after_seek(&mut self) -> bool {
        match self {
            SwitchState::Seeking => {
                *self = SwitchState::Idle;
                true
            }
            SwitchState::AwaitingAck { after_seek, .. } => std::mem::replace(after_seek, false),
            SwitchState::Idle => false,
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::Idle => write!(f, "idle"),
            SwitchState::Seeking => write!(f, "seeking"),
            SwitchState::AwaitingAck { missed, .. } => {
                write!(f, "awaiting ack ({} held)", missed.len())
            }
        }
    }
}
