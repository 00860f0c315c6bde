//! Flush engine: range removal across sinks
//!
//! Removal is asynchronous, so a flush advances one removal per sink-idle
//! notification. Two things keep it finite: slivers shorter than
//! `min_removal_length` are never removed, and the number of removals per
//! range is capped by the number of segments ever appended.

use segstream_core::SegstreamError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::queue::TrackSet;

/// Default minimum length (seconds) a removal must cover
pub const MIN_REMOVAL_LENGTH: f64 = 0.5;

/// A pending removal request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlushRange {
    /// Start of the range
    pub start: f64,
    /// End of the range, possibly infinite
    pub end: f64,
    /// Restrict the flush to one track
    pub track_filter: Option<u32>,
}

impl FlushRange {
    /// Everything on every track
    pub fn all() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
            track_filter: None,
        }
    }

    /// `[start, end)` on every track
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            track_filter: None,
        }
    }

    /// Restrict to a single track
    pub fn for_track(mut self, track_id: u32) -> Self {
        self.track_filter = Some(track_id);
        self
    }
}

/// Tuning for removal behaviour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlushPolicy {
    /// Intersections shorter than this are ignored
    pub min_removal_length: f64,
    /// Remove the whole requested range in one call when its end is
    /// unbounded, for sinks that mis-handle multi-interval removal
    pub whole_range_when_unbounded: bool,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            min_removal_length: MIN_REMOVAL_LENGTH,
            whole_range_when_unbounded: false,
        }
    }
}

/// Result of one flush step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Every range has been flushed
    Completed,
    /// A removal was issued; resume on the next sink-idle notification
    Pending,
    /// A sink is mid-append; resume on the next sink-idle notification
    Blocked,
}

enum RangeOutcome {
    Done,
    Removing,
    Blocked,
}

/// Queue of flush ranges and the loop that drains it
#[derive(Debug, Default)]
pub struct FlushEngine {
    ranges: VecDeque<FlushRange>,
    retries: usize,
    policy: FlushPolicy,
    removals_total: u64,
    abandoned_total: u64,
}

impl FlushEngine {
    /// Create an engine with a policy
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Queue a range behind any range already in flight
    pub fn request(&mut self, range: FlushRange) {
        debug!(
            "flush requested [{}, {}) filter {:?}",
            range.start, range.end, range.track_filter
        );
        self.ranges.push_back(range);
    }

    /// Whether a flush is queued or in flight
    pub fn is_pending(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether a flush touches `track_id`
    pub fn is_pending_for(&self, track_id: u32) -> bool {
        self.ranges
            .iter()
            .any(|r| r.track_filter.map_or(true, |id| id == track_id))
    }

    /// Removals issued for the range in flight
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Removals issued over the engine's lifetime
    pub fn removals_total(&self) -> u64 {
        self.removals_total
    }

    /// Ranges given up because the retry bound was hit
    pub fn abandoned_total(&self) -> u64 {
        self.abandoned_total
    }

    /// Active policy
    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Drop all queued ranges
    pub fn reset(&mut self) {
        self.ranges.clear();
        self.retries = 0;
    }

    /// Advance the flush.
    ///
    /// `appended` is the session's appended-segment count; it bounds the
    /// removals per range and is recomputed from the sinks once the queue
    /// empties.
    pub fn step(&mut self, tracks: &mut TrackSet, appended: &mut usize) -> FlushStatus {
        while let Some(range) = self.ranges.front().copied() {
            match self.flush_range(range, tracks, *appended) {
                RangeOutcome::Done => {
                    self.ranges.pop_front();
                    self.retries = 0;
                }
                RangeOutcome::Removing => return FlushStatus::Pending,
                RangeOutcome::Blocked => return FlushStatus::Blocked,
            }
        }

        *appended = tracks.buffered_interval_count();
        info!("buffer flushed, {} buffered ranges remain", *appended);
        FlushStatus::Completed
    }

    fn flush_range(
        &mut self,
        range: FlushRange,
        tracks: &mut TrackSet,
        appended: usize,
    ) -> RangeOutcome {
        for track in tracks.iter_mut() {
            if range.track_filter.is_some_and(|id| id != track.id()) {
                continue;
            }
            if track.is_busy() {
                warn!("cannot flush track {}, sink update in progress", track.id());
                return RangeOutcome::Blocked;
            }

            let buffered = match track.buffered() {
                Ok(buffered) => buffered,
                Err(e) => {
                    let err = e.for_track(track.id());
                    warn!("skipping track {} during flush: {}", track.id(), err);
                    continue;
                }
            };

            for interval in buffered {
                let (start, end) =
                    if self.policy.whole_range_when_unbounded && range.end.is_infinite() {
                        (range.start, range.end)
                    } else {
                        (interval.start.max(range.start), interval.end.min(range.end))
                    };

                if end.min(interval.end) - start <= self.policy.min_removal_length {
                    continue;
                }

                if self.retries >= appended {
                    let err = SegstreamError::Consistency {
                        reason: format!(
                            "flush of [{}, {}) needs more than {} removals",
                            range.start, range.end, appended
                        ),
                    };
                    warn!("abort flushing: {}", err);
                    self.abandoned_total += 1;
                    return RangeOutcome::Done;
                }

                self.retries += 1;
                self.removals_total += 1;
                debug!(
                    "flush track {} [{}, {}) of [{}, {})",
                    track.id(),
                    start,
                    end,
                    interval.start,
                    interval.end
                );
                match track.remove(start, end) {
                    Ok(()) => return RangeOutcome::Removing,
                    Err(e) => {
                        warn!("removal failed: {}", e);
                        break;
                    }
                }
            }
        }
        RangeOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySink, MemorySinkHandle};
    use crate::queue::Track;
    use crate::sink::SinkNotifier;
    use crate::tracks::{Segment, TimeRange};
    use bytes::Bytes;
    use segstream_core::ContentKind;
    use tokio::sync::mpsc;

    fn set_with(ranges: &[Vec<TimeRange>]) -> (TrackSet, Vec<MemorySinkHandle>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut set = TrackSet::new();
        let mut handles = Vec::new();
        for (i, r) in ranges.iter().enumerate() {
            let id = i as u32 + 1;
            let sink = MemorySink::new(SinkNotifier::new(id, tx.clone()));
            let handle = sink.handle();
            handle.set_buffered(r.clone());
            let kind = if i == 0 {
                ContentKind::Video
            } else {
                ContentKind::Audio
            };
            set.add(Track::new(id, kind, format!("t{}", id), Box::new(sink)))
                .unwrap();
            handles.push(handle);
        }
        (set, handles)
    }

    fn three_intervals() -> Vec<TimeRange> {
        vec![
            TimeRange::new(0.0, 2.0),
            TimeRange::new(3.0, 5.0),
            TimeRange::new(6.0, 8.0),
        ]
    }

    #[test]
    fn test_one_removal_per_idle_notification() {
        let (mut tracks, handles) = set_with(&[three_intervals()]);
        let mut engine = FlushEngine::default();
        let mut appended = 3;

        engine.request(FlushRange::all());
        for expected in 1..=3 {
            assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Pending);
            assert_eq!(handles[0].removals().len(), expected);
            handles[0].complete();
        }
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Completed);
        assert_eq!(handles[0].removals().len(), 3);
        assert!(!engine.is_pending());
        assert_eq!(appended, 0);
    }

    #[test]
    fn test_blocked_while_appending() {
        let (mut tracks, handles) = set_with(&[three_intervals()]);
        tracks
            .get_mut(1)
            .unwrap()
            .enqueue(Segment::media(1, Bytes::from_static(b"x")), false)
            .unwrap();

        let mut engine = FlushEngine::default();
        let mut appended = 4;
        engine.request(FlushRange::all());
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Blocked);
        assert!(engine.is_pending());
        assert!(handles[0].removals().is_empty());
    }

    #[test]
    fn test_retry_bound_abandons_range() {
        let (mut tracks, handles) = set_with(&[three_intervals()]);
        let mut engine = FlushEngine::default();
        let mut appended = 1;

        engine.request(FlushRange::all());
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Pending);
        handles[0].complete();
        // Second removal would exceed the bound of one appended segment
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Completed);
        assert_eq!(handles[0].removals().len(), 1);
        assert_eq!(engine.abandoned_total(), 1);
        assert_eq!(appended, 2);
    }

    #[test]
    fn test_slivers_are_ignored() {
        let (mut tracks, handles) = set_with(&[vec![
            TimeRange::new(0.0, 0.4),
            TimeRange::new(1.0, 1.5),
        ]]);
        let mut engine = FlushEngine::default();
        let mut appended = 10;

        engine.request(FlushRange::all());
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Completed);
        assert!(handles[0].removals().is_empty());
        assert_eq!(appended, 2);
    }

    #[test]
    fn test_track_filter_and_partial_range() {
        let (mut tracks, handles) =
            set_with(&[vec![TimeRange::new(0.0, 10.0)], vec![TimeRange::new(0.0, 10.0)]]);
        let mut engine = FlushEngine::default();
        let mut appended = 5;

        engine.request(FlushRange::new(2.0, 4.0).for_track(2));
        assert!(engine.is_pending_for(2));
        assert!(!engine.is_pending_for(1));
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Pending);
        assert!(handles[0].removals().is_empty());
        assert_eq!(handles[1].removals(), vec![TimeRange::new(2.0, 4.0)]);
        handles[1].complete();
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Completed);
        assert_eq!(appended, 3);
    }

    #[test]
    fn test_whole_range_policy() {
        let (mut tracks, handles) = set_with(&[three_intervals()]);
        let mut engine = FlushEngine::new(FlushPolicy {
            whole_range_when_unbounded: true,
            ..FlushPolicy::default()
        });
        let mut appended = 3;

        engine.request(FlushRange::all());
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Pending);
        assert_eq!(
            handles[0].removals(),
            vec![TimeRange::new(0.0, f64::INFINITY)]
        );
        handles[0].complete();
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Completed);
        assert_eq!(handles[0].removals().len(), 1);
    }

    #[test]
    fn test_ranges_queue_in_order() {
        let (mut tracks, handles) = set_with(&[vec![TimeRange::new(0.0, 10.0)]]);
        let mut engine = FlushEngine::default();
        let mut appended = 4;

        engine.request(FlushRange::new(0.0, 2.0));
        engine.request(FlushRange::new(8.0, 10.0));
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Pending);
        handles[0].complete();
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Pending);
        handles[0].complete();
        assert_eq!(engine.step(&mut tracks, &mut appended), FlushStatus::Completed);
        assert_eq!(
            handles[0].removals(),
            vec![TimeRange::new(0.0, 2.0), TimeRange::new(8.0, 10.0)]
        );
        assert_eq!(handles[0].buffered(), vec![TimeRange::new(2.0, 8.0)]);
    }
}
