//! Playback session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing is playing
    #[default]
    Idle,
    /// Frames are being delivered to the sinks
    Playing,
    /// Delivery paused; frames are ignored
    Paused,
    /// Teardown in progress
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Per-session bookkeeping. A new session starts on every play from idle,
/// so counters never leak from one stream into the next.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    state: SessionState,
    /// Segments appended since the last flush resync
    pub appended_count: usize,
    /// Errors counted toward the stop threshold
    pub error_count: u32,
    /// Binary frames held back during track switches
    pub missed_frames: u64,
}

impl PlaybackSession {
    /// Fresh idle session
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: SessionState::Idle,
            appended_count: 0,
            error_count: 0,
            missed_frames: 0,
        }
    }

    /// Session id used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// When the session was created
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `state`; returns false if already there
    pub fn transition(&mut self, state: SessionState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }

    /// Count one error; returns true once `threshold` is reached
    pub fn count_error(&mut self, threshold: u32) -> bool {
        self.error_count = self.error_count.saturating_add(1);
        self.error_count >= threshold
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_have_distinct_ids() {
        assert_ne!(PlaybackSession::new().id(), PlaybackSession::new().id());
    }

    #[test]
    fn test_transition_reports_changes() {
        let mut session = PlaybackSession::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.transition(SessionState::Playing));
        assert!(!session.transition(SessionState::Playing));
        assert_eq!(session.state().to_string(), "playing");
    }

    #[test]
    fn test_error_threshold() {
        let mut session = PlaybackSession::new();
        assert!(!session.count_error(3));
        assert!(!session.count_error(3));
        assert!(session.count_error(3));
        assert_eq!(session.error_count, 3);
    }
}
