//! Playback engine
//!
//! Single-owner state machine behind a [`crate::Player`]. Every handler runs
//! to completion before the next one starts: inbound frames, sink completion
//! events, progress ticks and control commands all arrive through the driver
//! task, one at a time. Only `play`, `pause` and `stop` suspend, and only on
//! the transport or the presentation.

use segstream_core::{
    Command, ContentKind, Frame, FrameReceiver, MediaInfo, OpenParams, SeekTarget,
    SegstreamError, StreamInfo, Transport,
};
use segstream_diagnostics::{frame_summary, SessionStats, TrackReport};
use segstream_media::{
    BufferMode, Delivery, FlushEngine, FlushRange, FlushStatus, Segment, SinkEvent,
    SinkEventKind, SinkNotifier, Track, TrackSet,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::PlayerConfig;
use crate::dispatcher::{classify, DeclaredTrack, Inbound};
use crate::event::{EventBus, PlayerEvent};
use crate::presentation::{PlayHandle, Presentation};
use crate::progress::ProgressReporter;
use crate::session::{PlaybackSession, SessionState};
use crate::switch::SwitchState;

/// Receivers the driver listens on after a successful play
pub(crate) struct SessionChannels {
    pub(crate) frames: FrameReceiver,
    /// Present when a new session was started
    pub(crate) sink_events: Option<mpsc::UnboundedReceiver<SinkEvent>>,
}

pub(crate) struct Engine {
    config: PlayerConfig,
    transport: Box<dyn Transport>,
    presentation: Box<dyn Presentation>,
    session: PlaybackSession,
    tracks: TrackSet,
    flush: FlushEngine,
    switch: SwitchState,
    progress: ProgressReporter,
    media_info: Option<MediaInfo>,
    sink_tx: Option<mpsc::UnboundedSender<SinkEvent>>,
    play_handle: Option<PlayHandle>,
    events: EventBus,
    fatal: Option<SegstreamError>,
}

impl Engine {
    pub(crate) fn new(
        config: PlayerConfig,
        transport: Box<dyn Transport>,
        presentation: Box<dyn Presentation>,
    ) -> Self {
        Self {
            flush: FlushEngine::new(config.flush_policy),
            progress: ProgressReporter::new(config.progress_update_interval),
            config,
            transport,
            presentation,
            session: PlaybackSession::new(),
            tracks: TrackSet::new(),
            switch: SwitchState::Idle,
            media_info: None,
            sink_tx: None,
            play_handle: None,
            events: EventBus::default(),
            fatal: None,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.session.state()
    }

    pub(crate) fn progress_interval(&self) -> Duration {
        self.progress.interval()
    }

    pub(crate) fn subscribe(&mut self, tx: mpsc::UnboundedSender<PlayerEvent>) {
        self.events.subscribe(tx);
    }

    // Control plane

    pub(crate) async fn play(
        &mut self,
        params: OpenParams,
    ) -> Result<Option<SessionChannels>, SegstreamError> {
        match self.session.state() {
            SessionState::Playing => {
                debug!("play ignored, already playing");
                Ok(None)
            }
            SessionState::Stopping => Err(SegstreamError::InvalidState {
                expected: "idle, paused or playing".to_string(),
                actual: SessionState::Stopping.to_string(),
            }),
            SessionState::Paused if !self.switch.after_seek() => {
                self.resume();
                Ok(None)
            }
            // A seek while paused restarts delivery from the new position
            SessionState::Paused => self.reconnect(params).await.map(Some),
            SessionState::Idle => self.start(params).await.map(Some),
        }
    }

    async fn start(&mut self, params: OpenParams) -> Result<SessionChannels, SegstreamError> {
        self.session = PlaybackSession::new();
        self.presentation.attach()?;
        let frames = self.transport.open(&params).await?;

        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        self.sink_tx = Some(sink_tx);
        self.tracks.clear();
        self.flush = FlushEngine::new(self.config.flush_policy);
        self.switch = SwitchState::Idle;
        self.progress.reset();
        self.fatal = None;

        self.send_logged(Command::Resume);
        self.play_handle = Some(self.presentation.play());
        self.set_state(SessionState::Playing);
        info!(
            session_id = %self.session.id(),
            url = %params.to_url(),
            "playback started"
        );
        Ok(SessionChannels {
            frames,
            sink_events: Some(sink_rx),
        })
    }

    async fn reconnect(&mut self, params: OpenParams) -> Result<SessionChannels, SegstreamError> {
        if let Err(e) = self.transport.close().await {
            warn!("closing transport before reconnect failed: {}", e);
        }
        let frames = self.transport.open(&params).await?;
        self.send_logged(Command::Resume);
        self.play_handle = Some(self.presentation.play());
        self.set_state(SessionState::Playing);
        info!(session_id = %self.session.id(), "playback restarted after seek");
        Ok(SessionChannels {
            frames,
            sink_events: None,
        })
    }

    fn resume(&mut self) {
        self.send_logged(Command::Resume);
        self.play_handle = Some(self.presentation.play());
        self.set_state(SessionState::Playing);
    }

    pub(crate) async fn pause(&mut self) -> Result<(), SegstreamError> {
        let state = self.session.state();
        if state != SessionState::Playing {
            return Err(SegstreamError::InvalidState {
                expected: SessionState::Playing.to_string(),
                actual: state.to_string(),
            });
        }

        self.settle_play().await;
        self.presentation.pause();
        self.send_logged(Command::Pause);
        self.set_state(SessionState::Paused);
        self.events.emit(PlayerEvent::Paused);
        Ok(())
    }

    /// Tear the session down. Calling it again, or while idle, does nothing.
    pub(crate) async fn stop(&mut self) {
        let state = self.session.state();
        if matches!(state, SessionState::Idle | SessionState::Stopping) {
            debug!("stop ignored, session is {}", state);
            return;
        }
        self.set_state(SessionState::Stopping);

        self.settle_play().await;
        if let Err(e) = self.presentation.end_of_stream() {
            warn!("end of stream failed: {}", e);
        }
        let emptied = self.presentation.detach();

        self.tracks.clear();
        self.flush.reset();
        self.switch = SwitchState::Idle;
        self.sink_tx = None;
        self.progress.reset();

        if let Err(e) = self.transport.close().await {
            warn!("closing transport failed: {}", e);
        }
        let timeout = self.config.connection.timeout;
        if tokio::time::timeout(timeout, emptied.wait()).await.is_err() {
            warn!("presentation not emptied after {:?}", timeout);
        }

        self.set_state(SessionState::Idle);
        info!(session_id = %self.session.id(), "session stopped");
    }

    /// Stop after the error threshold was crossed and tell subscribers why
    pub(crate) async fn fail(&mut self, reason: SegstreamError) {
        error!(session_id = %self.session.id(), "{}, stopping session", reason);
        self.stop().await;
        self.events.emit(PlayerEvent::error(&reason, true));
    }

    pub(crate) fn take_fatal(&mut self) -> Option<SegstreamError> {
        self.fatal.take()
    }

    async fn settle_play(&mut self) {
        let Some(handle) = self.play_handle.take() else {
            return;
        };
        let timeout = self.config.connection.timeout;
        match tokio::time::timeout(timeout, handle.settle()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("play request failed: {}", e),
            Err(_) => warn!("play request unsettled after {:?}", timeout),
        }
    }

    pub(crate) fn seek(&mut self, target: SeekTarget) -> Result<(), SegstreamError> {
        let command = Command::Seek(target);
        self.send(&command)?;
        self.switch.mark_seek();
        info!(session_id = %self.session.id(), "seek sent: {}", command);
        Ok(())
    }

    pub(crate) fn set_tracks(&mut self, ids: &[String]) -> Result<(), SegstreamError> {
        let info = self
            .media_info
            .as_ref()
            .ok_or_else(|| SegstreamError::InvalidState {
                expected: "media info received".to_string(),
                actual: "no init segment yet".to_string(),
            })?;

        let mut video = String::new();
        let mut audio = String::new();
        for id in ids {
            match info.kind_of(id) {
                Some(ContentKind::Video) => video.push_str(id),
                Some(ContentKind::Audio) => audio.push_str(id),
                _ => debug!("dropping unknown track selector {:?}", id),
            }
        }
        self.request_track_switch(video, audio)
    }

    fn request_track_switch(&mut self, video: String, audio: String) -> Result<(), SegstreamError> {
        if !self.transport.is_connected() {
            warn!("track switch requested without a connection");
            return Err(SegstreamError::NotConnected);
        }
        self.presentation.pause();
        self.send(&Command::SetTracks { video, audio })?;
        self.switch.begin_switch();
        info!(session_id = %self.session.id(), "track switch requested");
        Ok(())
    }

    pub(crate) fn set_buffer_mode(&mut self, mode: BufferMode) {
        self.config.buffer_mode = mode;
    }

    pub(crate) fn streams_of(&self, kind: ContentKind) -> Option<Vec<StreamInfo>> {
        self.media_info.as_ref().map(|info| info.streams_of(kind))
    }

    pub(crate) fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::new(self.session.id(), self.session.started_at());
        stats.state = self.session.state().to_string();
        stats.appended_count = self.session.appended_count;
        stats.error_count = self.session.error_count;
        stats.missed_frames = self.session.missed_frames;
        stats.flush_removals = self.flush.removals_total();
        stats.flushes_abandoned = self.flush.abandoned_total();
        stats.tracks = self
            .tracks
            .iter()
            .map(|track| TrackReport {
                track_id: track.id(),
                selector: track.selector().to_string(),
                kind: track.kind().to_string(),
                queued: track.queued(),
                stats: track.stats().clone(),
            })
            .collect();
        stats
    }

    // Inbound frames

    pub(crate) fn handle_frame(&mut self, frame: Frame) {
        if self.session.state() != SessionState::Playing {
            trace!("ignoring frame while {}", self.session.state());
            return;
        }

        let frame = match frame {
            Frame::Binary(data) => match self.switch.hold(data) {
                Ok(()) => {
                    self.session.missed_frames += 1;
                    return;
                }
                Err(data) => Frame::Binary(data),
            },
            text => {
                if let Some(missed) = self.switch.acknowledge() {
                    info!(
                        session_id = %self.session.id(),
                        "track switch acknowledged, replaying {} held frames",
                        missed.len()
                    );
                    self.play_handle = Some(self.presentation.play());
                    for data in missed {
                        self.dispatch(Frame::Binary(data));
                    }
                }
                text
            }
        };
        self.dispatch(frame);
    }

    fn dispatch(&mut self, frame: Frame) {
        if self.fatal.is_some() {
            return;
        }
        match classify(&frame) {
            Ok(Inbound::Media(segment)) => self.route(segment, false),
            Ok(Inbound::Init { info, tracks }) => self.apply_init(info, tracks),
            Ok(Inbound::Ignored) => {}
            Err(e) => {
                warn!("dropping {}", frame_summary(&frame));
                self.report_error(e);
            }
        }
    }

    fn route(&mut self, segment: Segment, hold: bool) {
        let wire_id = segment.track_id();
        let Some(id) = self.tracks.resolve(wire_id) else {
            self.report_error(SegstreamError::TrackNotFound { track_id: wire_id });
            return;
        };
        let hold = hold || self.flush.is_pending_for(id);
        let Some(track) = self.tracks.get_mut(id) else {
            return;
        };
        match track.enqueue(segment, hold) {
            Ok(Delivery::Appended) => self.session.appended_count += 1,
            Ok(Delivery::Queued) => {}
            Err(e) => self.report_error(e),
        }
    }

    fn apply_init(&mut self, info: MediaInfo, declared: Vec<DeclaredTrack>) {
        self.media_info = Some(info.clone());
        self.events.emit(PlayerEvent::MediaInfo { info });

        if self.tracks.is_empty() {
            // Fresh sinks have nothing to reset, but the marker is still spent
            if self.switch.clear_after_seek() {
                debug!("seek marker consumed by the first init segment");
            }
            if let Err(e) = self.create_tracks(&declared) {
                self.report_error(e);
                return;
            }
            for segment in declared.iter().filter_map(DeclaredTrack::init_segment) {
                self.route(segment, false);
            }
            return;
        }

        if self.switch.clear_after_seek() {
            info!(session_id = %self.session.id(), "init segment after seek, resetting sinks");
            let mode = self.config.buffer_mode;
            for track in self.tracks.iter_mut() {
                if let Err(e) = track.reset_sink(mode) {
                    warn!("resetting sink of track {} failed: {}", track.id(), e);
                }
            }
            for segment in declared.iter().filter_map(DeclaredTrack::init_segment) {
                self.route(segment, false);
            }
            self.drain_idle_tracks();
            return;
        }

        info!(session_id = %self.session.id(), "stream reconfigured, flushing buffers");
        self.flush.request(FlushRange::all());
        for segment in declared.iter().filter_map(DeclaredTrack::init_segment) {
            self.route(segment, true);
        }
        self.run_flush();
    }

    fn create_tracks(&mut self, declared: &[DeclaredTrack]) -> Result<(), SegstreamError> {
        let sink_tx = self
            .sink_tx
            .clone()
            .ok_or_else(|| SegstreamError::InvalidState {
                expected: "an active session".to_string(),
                actual: "no sink channel".to_string(),
            })?;

        let mut tracks = TrackSet::new();
        for declared in declared {
            let notifier = SinkNotifier::new(declared.id, sink_tx.clone());
            let mut sink = self.presentation.add_sink(declared.kind, notifier)?;
            sink.set_mode(self.config.buffer_mode)
                .map_err(|e| e.for_track(declared.id))?;
            tracks.add(Track::new(
                declared.id,
                declared.kind,
                declared.selector.clone(),
                sink,
            ))?;
        }
        info!(
            session_id = %self.session.id(),
            "created {} tracks, audio track {:?}",
            tracks.len(),
            tracks.audio_track_id()
        );
        self.tracks = tracks;
        Ok(())
    }

    // Sink completion

    pub(crate) fn handle_sink_event(&mut self, event: SinkEvent) {
        if matches!(
            self.session.state(),
            SessionState::Idle | SessionState::Stopping
        ) {
            return;
        }
        if let SinkEventKind::Error(reason) = event.kind {
            self.report_error(SegstreamError::Sink {
                track_id: event.track_id,
                reason,
            });
        }
        // A pending flush goes before any queued append
        if self.flush.is_pending() {
            self.run_flush();
        }
        self.drain_track(event.track_id);
    }

    fn run_flush(&mut self) {
        match self
            .flush
            .step(&mut self.tracks, &mut self.session.appended_count)
        {
            FlushStatus::Completed => self.drain_idle_tracks(),
            FlushStatus::Pending | FlushStatus::Blocked => {}
        }
    }

    fn drain_idle_tracks(&mut self) {
        let ids: Vec<u32> = self.tracks.iter().map(Track::id).collect();
        for id in ids {
            self.drain_track(id);
        }
    }

    /// Append the next queued segment of a track. A rejected segment is
    /// dropped and the next one tried.
    fn drain_track(&mut self, track_id: u32) {
        if self.flush.is_pending_for(track_id) {
            return;
        }
        while self.fatal.is_none() {
            let Some(track) = self.tracks.get_mut(track_id) else {
                return;
            };
            match track.drain_one() {
                Ok(true) => {
                    self.session.appended_count += 1;
                    return;
                }
                Ok(false) => return,
                Err(e) => self.report_error(e),
            }
        }
    }

    // Errors and progress

    fn report_error(&mut self, error: SegstreamError) {
        warn!(
            session_id = %self.session.id(),
            code = error.error_code(),
            "{}",
            error
        );
        self.events.emit(PlayerEvent::error(&error, false));

        let threshold = self.config.errors_before_stop;
        if error.counts_toward_threshold()
            && self.session.count_error(threshold)
            && self.fatal.is_none()
        {
            self.fatal = Some(SegstreamError::ErrorThresholdExceeded {
                count: self.session.error_count,
                threshold,
            });
        }
    }

    pub(crate) fn report_progress(&mut self) {
        if self.session.state() != SessionState::Playing {
            return;
        }
        let position = self.presentation.current_position();
        if let Some(utc) = self.progress.sample(position) {
            self.events.emit(PlayerEvent::Progress { utc });
        }
    }

    // Helpers

    fn send(&mut self, command: &Command) -> Result<(), SegstreamError> {
        self.transport.send(command).map_err(|e| {
            warn!("sending {:?} failed: {}", command.to_wire(), e);
            e
        })
    }

    fn send_logged(&mut self, command: Command) {
        let _ = self.send(&command);
    }

    fn set_state(&mut self, state: SessionState) {
        if !self.session.transition(state) {
            return;
        }
        if self.config.debug {
            info!(session_id = %self.session.id(), "session {}", state);
        } else {
            debug!(session_id = %self.session.id(), "session {}", state);
        }
        self.events.emit(PlayerEvent::StateChanged { state });
    }
}
