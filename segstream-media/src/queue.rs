//! Per-track FIFO queues in front of the sinks

use segstream_core::{ContentKind, SegstreamError};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::error::SinkResult;
use crate::sink::MediaSink;
use crate::tracks::{BufferMode, Segment, TimeRange, TrackStats};

/// What happened to a segment handed to a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The payload went straight to the sink
    Appended,
    /// The payload waits in the track queue
    Queued,
}

/// One elementary stream: its sink and the queue feeding it
pub struct Track {
    id: u32,
    kind: ContentKind,
    selector: String,
    sink: Box<dyn MediaSink>,
    queue: VecDeque<Segment>,
    stats: TrackStats,
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("selector", &self.selector)
            .field("queued", &self.queue.len())
            .field("busy", &self.sink.is_busy())
            .finish()
    }
}

impl Track {
    /// Create a track around a sink
    pub fn new(
        id: u32,
        kind: ContentKind,
        selector: impl Into<String>,
        sink: Box<dyn MediaSink>,
    ) -> Self {
        Self {
            id,
            kind,
            selector: selector.into(),
            sink,
            queue: VecDeque::new(),
            stats: TrackStats::default(),
        }
    }

    /// Track id
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Content kind
    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    /// Server-side selector ("v1", "a1", ...)
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Whether the sink is mid-operation
    pub fn is_busy(&self) -> bool {
        self.sink.is_busy()
    }

    /// Number of segments waiting
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Delivery statistics
    pub fn stats(&self) -> &TrackStats {
        &self.stats
    }

    /// Buffered intervals reported by the sink
    pub fn buffered(&self) -> SinkResult<Vec<TimeRange>> {
        self.sink.buffered()
    }

    /// Hand a segment to the track.
    ///
    /// The payload goes straight to the sink only when the sink is idle, the
    /// queue is empty and `hold` is false; otherwise it joins the queue tail.
    /// A rejected append drops the segment.
    pub fn enqueue(&mut self, segment: Segment, hold: bool) -> Result<Delivery, SegstreamError> {
        if hold || self.sink.is_busy() || !self.queue.is_empty() {
            self.queue.push_back(segment);
            self.stats.queue_high_water = self.stats.queue_high_water.max(self.queue.len());
            return Ok(Delivery::Queued);
        }
        self.append(segment)?;
        Ok(Delivery::Appended)
    }

    /// Append the queue head if the sink is idle.
    ///
    /// Returns `Ok(true)` when a segment was appended.
    pub fn drain_one(&mut self) -> Result<bool, SegstreamError> {
        if self.sink.is_busy() {
            return Ok(false);
        }
        match self.queue.pop_front() {
            Some(segment) => self.append(segment).map(|_| true),
            None => Ok(false),
        }
    }

    /// Start removing `[start, end)` from the sink
    pub fn remove(&mut self, start: f64, end: f64) -> Result<(), SegstreamError> {
        self.stats.removals_issued += 1;
        self.sink.remove(start, end).map_err(|e| {
            self.stats.sink_errors += 1;
            e.for_track(self.id)
        })
    }

    /// Reset the sink parser and apply a buffer mode
    pub fn reset_sink(&mut self, mode: BufferMode) -> Result<(), SegstreamError> {
        self.sink.abort().map_err(|e| e.for_track(self.id))?;
        self.sink.set_mode(mode).map_err(|e| e.for_track(self.id))
    }

    /// Drop every queued segment
    pub fn clear_queue(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    fn append(&mut self, segment: Segment) -> Result<(), SegstreamError> {
        let len = segment.payload().len() as u64;
        match self.sink.append(segment.into_payload()) {
            Ok(()) => {
                self.stats.segments_appended += 1;
                self.stats.bytes_appended += len;
                Ok(())
            }
            Err(e) => {
                self.stats.sink_errors += 1;
                warn!("append rejected on track {}: {}", self.id, e);
                Err(e.for_track(self.id))
            }
        }
    }
}

/// All tracks of a session, with routing by track id
#[derive(Debug, Default)]
pub struct TrackSet {
    tracks: Vec<Track>,
    audio_track_id: Option<u32>,
}

impl TrackSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track; at most one audio track is allowed
    pub fn add(&mut self, track: Track) -> Result<(), SegstreamError> {
        if self.tracks.iter().any(|t| t.id == track.id) {
            return Err(SegstreamError::InvalidState {
                expected: format!("no track with id {}", track.id),
                actual: "duplicate track id".to_string(),
            });
        }
        if track.kind == ContentKind::Audio {
            if let Some(existing) = self.audio_track_id {
                return Err(SegstreamError::InvalidState {
                    expected: "a single audio track".to_string(),
                    actual: format!("audio tracks {} and {}", existing, track.id),
                });
            }
            self.audio_track_id = Some(track.id);
        }
        debug!("track {} ({}) added", track.id, track.kind);
        self.tracks.push(track);
        Ok(())
    }

    /// Id of the audio track, if any
    pub fn audio_track_id(&self) -> Option<u32> {
        self.audio_track_id
    }

    /// Resolve a wire track id to the track that should receive it.
    ///
    /// Known ids map to themselves. Unknown ids go to the first non-audio
    /// track, since only the audio id is stable across stream switches.
    pub fn resolve(&self, track_id: u32) -> Option<u32> {
        if self.tracks.iter().any(|t| t.id == track_id) {
            return Some(track_id);
        }
        self.tracks
            .iter()
            .find(|t| t.kind != ContentKind::Audio)
            .map(|t| t.id)
    }

    /// Track by id
    pub fn get(&self, track_id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    /// Mutable track by id
    pub fn get_mut(&mut self, track_id: u32) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == track_id)
    }

    /// Iterate over tracks in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// Iterate mutably over tracks in creation order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether no sinks exist yet
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Sum of buffered interval counts across sinks. Sinks that cannot be
    /// queried contribute nothing.
    pub fn buffered_interval_count(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| match t.buffered() {
                Ok(ranges) => ranges.len(),
                Err(e) => {
                    warn!("error while accessing buffered ranges of track {}: {}", t.id, e);
                    0
                }
            })
            .sum()
    }

    /// Drop all tracks and their queues
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.audio_track_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySink;
    use crate::sink::SinkNotifier;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn track(id: u32, kind: ContentKind) -> (Track, crate::memory::MemorySinkHandle) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = MemorySink::new(SinkNotifier::new(id, tx));
        let handle = sink.handle();
        (Track::new(id, kind, format!("t{}", id), Box::new(sink)), handle)
    }

    fn seg(id: u32, byte: u8) -> Segment {
        Segment::media(id, Bytes::from(vec![byte]))
    }

    #[test]
    fn test_enqueue_appends_when_idle() {
        let (mut t, sink) = track(1, ContentKind::Video);
        assert_eq!(t.enqueue(seg(1, 1), false).unwrap(), Delivery::Appended);
        assert!(t.is_busy());
        assert_eq!(t.enqueue(seg(1, 2), false).unwrap(), Delivery::Queued);
        assert_eq!(t.queued(), 1);
        assert_eq!(sink.appended().len(), 1);
    }

    #[test]
    fn test_drain_preserves_fifo_order() {
        let (mut t, sink) = track(1, ContentKind::Video);
        for b in 0..5u8 {
            t.enqueue(seg(1, b), false).unwrap();
        }
        while t.queued() > 0 {
            sink.complete();
            assert!(t.drain_one().unwrap());
        }
        let order: Vec<u8> = sink.appended().iter().map(|p| p[0]).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert_eq!(t.stats().segments_appended, 5);
        assert_eq!(t.stats().queue_high_water, 4);
    }

    #[test]
    fn test_hold_queues_even_when_idle() {
        let (mut t, sink) = track(1, ContentKind::Video);
        assert_eq!(t.enqueue(seg(1, 7), true).unwrap(), Delivery::Queued);
        assert!(sink.appended().is_empty());
        assert!(t.drain_one().unwrap());
        assert_eq!(sink.appended().len(), 1);
    }

    #[test]
    fn test_rejected_append_drops_segment() {
        let (mut t, sink) = track(1, ContentKind::Video);
        sink.fail_next_append("decode error");
        assert!(t.enqueue(seg(1, 1), false).is_err());
        assert_eq!(t.queued(), 0);
        assert_eq!(t.stats().sink_errors, 1);
        assert!(!t.is_busy());
    }

    #[test]
    fn test_routing_by_audio_id() {
        let mut set = TrackSet::new();
        set.add(track(1, ContentKind::Video).0).unwrap();
        set.add(track(2, ContentKind::Audio).0).unwrap();
        assert_eq!(set.audio_track_id(), Some(2));
        assert_eq!(set.resolve(2), Some(2));
        assert_eq!(set.resolve(1), Some(1));
        assert_eq!(set.resolve(7), Some(1));

        assert!(set.add(track(3, ContentKind::Audio).0).is_err());
        assert!(set.add(track(1, ContentKind::Video).0).is_err());
    }
}
