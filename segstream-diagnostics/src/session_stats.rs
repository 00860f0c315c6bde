//! Session counters snapshot

use chrono::{DateTime, Utc};
use segstream_media::TrackStats;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Per-track counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    /// Track id
    pub track_id: u32,
    /// Server-side selector
    pub selector: String,
    /// Content kind ("video"/"audio")
    pub kind: String,
    /// Segments still queued
    pub queued: usize,
    /// Delivery statistics
    pub stats: TrackStats,
}

/// Snapshot of a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session id used in logs
    pub session_id: Uuid,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// Session state name
    pub state: String,
    /// Appended segment count (flush retry bound)
    pub appended_count: usize,
    /// Errors counted toward the stop threshold
    pub error_count: u32,
    /// Binary frames held back during a track switch so far
    pub missed_frames: u64,
    /// Removals issued by the flush engine
    pub flush_removals: u64,
    /// Flush ranges abandoned at the retry bound
    pub flushes_abandoned: u64,
    /// Per-track counters
    pub tracks: Vec<TrackReport>,
}

impl SessionStats {
    /// Empty snapshot for a session
    pub fn new(session_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            started_at,
            state: "idle".to_string(),
            appended_count: 0,
            error_count: 0,
            missed_frames: 0,
            flush_removals: 0,
            flushes_abandoned: 0,
            tracks: Vec::new(),
        }
    }

    /// Total segments appended across tracks
    pub fn segments_appended(&self) -> u64 {
        self.tracks.iter().map(|t| t.stats.segments_appended).sum()
    }

    /// JSON form for dumps
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            warn!(session_id = %self.session_id, "stats serialization failed: {}", e);
            format!("{{\"error\":\"{}\"}}", e)
        })
    }

    /// Time elapsed since the session was created
    pub fn uptime(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_totals_and_json() {
        let started_at = Utc::now() - chrono::Duration::seconds(30);
        let mut stats = SessionStats::new(Uuid::new_v4(), started_at);
        stats.tracks.push(TrackReport {
            track_id: 1,
            selector: "v1".to_string(),
            kind: "video".to_string(),
            queued: 0,
            stats: TrackStats {
                segments_appended: 4,
                ..Default::default()
            },
        });
        stats.tracks.push(TrackReport {
            track_id: 2,
            selector: "a1".to_string(),
            kind: "audio".to_string(),
            queued: 2,
            stats: TrackStats {
                segments_appended: 3,
                ..Default::default()
            },
        });
        assert_eq!(stats.segments_appended(), 7);
        assert!(stats.uptime(Utc::now()) >= chrono::Duration::seconds(30));

        let json = stats.to_json();
        let back: SessionStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
        assert_eq!(back.started_at, started_at);
    }
}
