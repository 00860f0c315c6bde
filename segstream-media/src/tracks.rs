//! Segment and time range types

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of segment payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Initialization data (codec configuration)
    Init,
    /// Media data
    Media,
}

/// One unit of initialization or media data for a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    track_id: u32,
    kind: SegmentKind,
    payload: Bytes,
}

impl Segment {
    /// Create an initialization segment
    pub fn init(track_id: u32, payload: Bytes) -> Self {
        Self {
            track_id,
            kind: SegmentKind::Init,
            payload,
        }
    }

    /// Create a media segment
    pub fn media(track_id: u32, payload: Bytes) -> Self {
        Self {
            track_id,
            kind: SegmentKind::Media,
            payload,
        }
    }

    /// Track id the segment was tagged with on the wire
    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// Segment kind
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the segment, returning its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Half-open buffered interval `[start, end)` in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the interval
    pub start: f64,
    /// End of the interval
    pub end: f64,
}

impl TimeRange {
    /// Create a new range
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Length of the range
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// Whether the range covers nothing
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Intersection with `[start, end)`, if non-empty
    pub fn intersect(&self, start: f64, end: f64) -> Option<TimeRange> {
        let range = TimeRange::new(self.start.max(start), self.end.min(end));
        (!range.is_empty()).then_some(range)
    }
}

/// How a sink places appended segments on its timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
    /// Timestamps inside the segments decide placement
    Segments,
    /// Segments are placed back to back in append order
    #[default]
    Sequence,
}

impl std::str::FromStr for BufferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "segments" => Ok(BufferMode::Segments),
            "sequence" => Ok(BufferMode::Sequence),
            other => Err(format!(
                "invalid buffer mode {:?}, should be \"segments\" or \"sequence\"",
                other
            )),
        }
    }
}

/// Per-track delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackStats {
    /// Segments handed to the sink
    pub segments_appended: u64,
    /// Payload bytes handed to the sink
    pub bytes_appended: u64,
    /// Largest queue length observed
    pub queue_high_water: usize,
    /// Removals issued on behalf of flushes
    pub removals_issued: u64,
    /// Appends or removals the sink rejected
    pub sink_errors: u64,
}
