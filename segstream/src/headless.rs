//! Headless presentation backed by in-memory sinks
//!
//! Useful for buffering without rendering, for demos and for tests. Sinks are
//! [`MemorySink`]s; the position is whatever the owner last set.

use parking_lot::Mutex;
use segstream_core::{ContentKind, SegstreamError};
use segstream_media::{MediaSink, MemorySink, MemorySinkHandle, SinkNotifier};
use std::sync::Arc;

use crate::presentation::{EmptiedHandle, PlayCompleter, PlayHandle, Presentation};

#[derive(Debug, Default)]
struct HeadlessState {
    manual_sinks: bool,
    hold_next_play: bool,
    position: Option<f64>,
    playing: bool,
    sinks: Vec<(ContentKind, MemorySinkHandle)>,
    attaches: usize,
    plays: usize,
    pauses: usize,
    detaches: usize,
    ends_of_stream: usize,
    pending_play: Option<PlayCompleter>,
}

/// Presentation that renders nothing
#[derive(Debug, Clone, Default)]
pub struct HeadlessPresentation {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessPresentation {
    /// Presentation whose sinks complete every operation immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Presentation whose sinks stay busy until completed through their handles
    pub fn with_manual_sinks() -> Self {
        let presentation = Self::default();
        presentation.state.lock().manual_sinks = true;
        presentation
    }

    /// Set the reported position
    pub fn set_position(&self, utc: Option<f64>) {
        self.state.lock().position = utc;
    }

    /// Leave the next `play` pending until [`HeadlessPresentation::resolve_play`]
    pub fn hold_next_play(&self) {
        self.state.lock().hold_next_play = true;
    }

    /// Resolve a held `play`; returns false if none was pending
    pub fn resolve_play(&self) -> bool {
        match self.state.lock().pending_play.take() {
            Some(completer) => {
                completer.resolve();
                true
            }
            None => false,
        }
    }

    /// Handles of every sink created so far, in creation order
    pub fn sinks(&self) -> Vec<(ContentKind, MemorySinkHandle)> {
        self.state.lock().sinks.clone()
    }

    /// Handle of the first sink of `kind`
    pub fn sink(&self, kind: ContentKind) -> Option<MemorySinkHandle> {
        self.state
            .lock()
            .sinks
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, h)| h.clone())
    }

    /// Whether rendering is running
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Number of `play` calls
    pub fn plays(&self) -> usize {
        self.state.lock().plays
    }

    /// Number of `pause` calls
    pub fn pauses(&self) -> usize {
        self.state.lock().pauses
    }

    /// Number of `attach` calls
    pub fn attaches(&self) -> usize {
        self.state.lock().attaches
    }

    /// Number of `detach` calls
    pub fn detaches(&self) -> usize {
        self.state.lock().detaches
    }

    /// Number of `end_of_stream` calls
    pub fn ends_of_stream(&self) -> usize {
        self.state.lock().ends_of_stream
    }
}

impl Presentation for HeadlessPresentation {
    fn attach(&mut self) -> Result<(), SegstreamError> {
        let mut state = self.state.lock();
        state.attaches += 1;
        state.sinks.clear();
        Ok(())
    }

    fn add_sink(
        &mut self,
        kind: ContentKind,
        notifier: SinkNotifier,
    ) -> Result<Box<dyn MediaSink>, SegstreamError> {
        let mut state = self.state.lock();
        let sink = if state.manual_sinks {
            MemorySink::new(notifier)
        } else {
            MemorySink::auto_complete(notifier)
        };
        state.sinks.push((kind, sink.handle()));
        Ok(Box::new(sink))
    }

    fn play(&mut self) -> PlayHandle {
        let mut state = self.state.lock();
        state.plays += 1;
        state.playing = true;
        if state.hold_next_play {
            state.hold_next_play = false;
            let (handle, completer) = PlayHandle::pending();
            state.pending_play = Some(completer);
            return handle;
        }
        PlayHandle::resolved()
    }

    fn pause(&mut self) {
        let mut state = self.state.lock();
        state.pauses += 1;
        state.playing = false;
    }

    fn current_position(&self) -> Option<f64> {
        self.state.lock().position
    }

    fn end_of_stream(&mut self) -> Result<(), SegstreamError> {
        self.state.lock().ends_of_stream += 1;
        Ok(())
    }

    fn detach(&mut self) -> EmptiedHandle {
        let mut state = self.state.lock();
        state.detaches += 1;
        state.playing = false;
        for (_, sink) in &state.sinks {
            sink.detach();
        }
        EmptiedHandle::ready()
    }
}
