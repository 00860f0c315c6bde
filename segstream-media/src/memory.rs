//! In-memory sink
//!
//! Keeps appended payloads and a synthetic timeline instead of decoding.
//! Every append advances the timeline by a fixed segment duration, so
//! buffered ranges behave like a real sink's in sequence mode. Completion is
//! either manual (`MemorySinkHandle::complete`) or immediate.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{SinkError, SinkResult};
use crate::sink::{MediaSink, SinkNotifier};
use crate::tracks::{BufferMode, TimeRange};

#[derive(Debug)]
struct MemorySinkState {
    busy: bool,
    auto_complete: bool,
    detached: bool,
    segment_duration: f64,
    cursor: f64,
    mode: BufferMode,
    buffered: Vec<TimeRange>,
    appended: Vec<Bytes>,
    removals: Vec<TimeRange>,
    aborts: usize,
    fail_next_append: Option<String>,
    fail_next_remove: Option<String>,
}

/// Sink that buffers into memory
#[derive(Debug)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
    notifier: SinkNotifier,
}

/// Shared view on a [`MemorySink`] for driving and inspecting it
#[derive(Debug, Clone)]
pub struct MemorySinkHandle {
    state: Arc<Mutex<MemorySinkState>>,
    notifier: SinkNotifier,
}

impl MemorySink {
    /// Sink that stays busy until [`MemorySinkHandle::complete`] is called
    pub fn new(notifier: SinkNotifier) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemorySinkState {
                busy: false,
                auto_complete: false,
                detached: false,
                segment_duration: 1.0,
                cursor: 0.0,
                mode: BufferMode::default(),
                buffered: Vec::new(),
                appended: Vec::new(),
                removals: Vec::new(),
                aborts: 0,
                fail_next_append: None,
                fail_next_remove: None,
            })),
            notifier,
        }
    }

    /// Sink that completes every operation immediately
    pub fn auto_complete(notifier: SinkNotifier) -> Self {
        let sink = Self::new(notifier);
        sink.state.lock().auto_complete = true;
        sink
    }

    /// Set how much timeline each append covers
    pub fn with_segment_duration(self, seconds: f64) -> Self {
        self.state.lock().segment_duration = seconds;
        self
    }

    /// Handle sharing this sink's state
    pub fn handle(&self) -> MemorySinkHandle {
        MemorySinkHandle {
            state: self.state.clone(),
            notifier: self.notifier.clone(),
        }
    }

    fn finish(&self, state: &mut MemorySinkState) {
        if state.auto_complete {
            state.busy = false;
            self.notifier.notify_idle();
        }
    }
}

impl MediaSink for MemorySink {
    fn append(&mut self, payload: Bytes) -> SinkResult<()> {
        let mut state = self.state.lock();
        check_ready(&state)?;
        if let Some(reason) = state.fail_next_append.take() {
            return Err(SinkError::Rejected { reason });
        }

        let start = state.cursor;
        let end = start + state.segment_duration;
        match state.buffered.last_mut() {
            Some(last) if (last.end - start).abs() < f64::EPSILON => last.end = end,
            _ => state.buffered.push(TimeRange::new(start, end)),
        }
        state.cursor = end;
        state.appended.push(payload);
        state.busy = true;
        self.finish(&mut state);
        Ok(())
    }

    fn remove(&mut self, start: f64, end: f64) -> SinkResult<()> {
        let mut state = self.state.lock();
        check_ready(&state)?;
        if let Some(reason) = state.fail_next_remove.take() {
            return Err(SinkError::Rejected { reason });
        }

        let mut kept = Vec::with_capacity(state.buffered.len() + 1);
        for range in &state.buffered {
            if range.start < start {
                kept.push(TimeRange::new(range.start, range.end.min(start)));
            }
            if range.end > end {
                kept.push(TimeRange::new(range.start.max(end), range.end));
            }
        }
        kept.retain(|r| !r.is_empty());
        state.buffered = kept;
        state.removals.push(TimeRange::new(start, end));
        state.busy = true;
        self.finish(&mut state);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    fn buffered(&self) -> SinkResult<Vec<TimeRange>> {
        let state = self.state.lock();
        if state.detached {
            return Err(SinkError::Detached);
        }
        Ok(state.buffered.clone())
    }

    fn abort(&mut self) -> SinkResult<()> {
        let mut state = self.state.lock();
        if state.detached {
            return Err(SinkError::Detached);
        }
        state.aborts += 1;
        state.busy = false;
        Ok(())
    }

    fn set_mode(&mut self, mode: BufferMode) -> SinkResult<()> {
        self.state.lock().mode = mode;
        Ok(())
    }
}

fn check_ready(state: &MemorySinkState) -> SinkResult<()> {
    if state.detached {
        return Err(SinkError::Detached);
    }
    if state.busy {
        return Err(SinkError::Busy);
    }
    Ok(())
}

impl MemorySinkHandle {
    /// Finish the in-flight operation and notify the track
    pub fn complete(&self) {
        let mut state = self.state.lock();
        if state.busy {
            state.busy = false;
            drop(state);
            self.notifier.notify_idle();
        }
    }

    /// Whether an operation is in flight
    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Payloads appended so far, in order
    pub fn appended(&self) -> Vec<Bytes> {
        self.state.lock().appended.clone()
    }

    /// Removals issued so far, in order
    pub fn removals(&self) -> Vec<TimeRange> {
        self.state.lock().removals.clone()
    }

    /// Current buffered intervals
    pub fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    /// Replace the buffered intervals
    pub fn set_buffered(&self, ranges: Vec<TimeRange>) {
        let mut state = self.state.lock();
        state.cursor = ranges.last().map(|r| r.end).unwrap_or(0.0);
        state.buffered = ranges;
    }

    /// Make the next append fail with `reason`
    pub fn fail_next_append(&self, reason: impl Into<String>) {
        self.state.lock().fail_next_append = Some(reason.into());
    }

    /// Make the next remove fail with `reason`
    pub fn fail_next_remove(&self, reason: impl Into<String>) {
        self.state.lock().fail_next_remove = Some(reason.into());
    }

    /// Simulate removal from the media source
    pub fn detach(&self) {
        self.state.lock().detached = true;
    }

    /// Number of aborts received
    pub fn aborts(&self) -> usize {
        self.state.lock().aborts
    }

    /// Current buffer mode
    pub fn mode(&self) -> BufferMode {
        self.state.lock().mode
    }
}
