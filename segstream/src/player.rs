//! Player handle and its driver task

use chrono::{DateTime, Utc};
use segstream_core::{
    http_to_ws, ContentKind, FrameReceiver, OpenParams, SeekTarget, SegstreamError, StreamInfo, Transport,
    WebSocketTransport,
};
use segstream_diagnostics::SessionStats;
use segstream_media::{BufferMode, SinkEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::PlayerConfig;
use crate::engine::{Engine, SessionChannels};
use crate::event::{EventHandler, EventStream, PlayerEvent};
use crate::presentation::Presentation;
use crate::session::SessionState;

type Reply<T> = oneshot::Sender<Result<T, SegstreamError>>;

enum PlayerCommand {
    Play {
        params: OpenParams,
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Seek {
        target: SeekTarget,
        reply: Reply<()>,
    },
    SetTracks {
        ids: Vec<String>,
        reply: Reply<()>,
    },
    SetBufferMode {
        mode: BufferMode,
    },
    Streams {
        kind: ContentKind,
        reply: oneshot::Sender<Option<Vec<StreamInfo>>>,
    },
    Stats {
        reply: oneshot::Sender<SessionStats>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    Subscribe {
        tx: mpsc::UnboundedSender<PlayerEvent>,
    },
}

/// Fluent builder for a [`Player`]
pub struct PlayerBuilder {
    url: String,
    config: PlayerConfig,
    transport: Option<Box<dyn Transport>>,
    presentation: Option<Box<dyn Presentation>>,
}

impl std::fmt::Debug for PlayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerBuilder")
            .field("url", &self.url)
            .field("config", &self.config)
            .field("transport", &self.transport.is_some())
            .field("presentation", &self.presentation.is_some())
            .finish()
    }
}

impl PlayerBuilder {
    fn new(url: &str) -> Self {
        Self {
            url: http_to_ws(url),
            config: PlayerConfig::default(),
            transport: None,
            presentation: None,
        }
    }

    /// Use a custom configuration
    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of a WebSocket
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Set the presentation element (required)
    pub fn presentation(mut self, presentation: impl Presentation + 'static) -> Self {
        self.presentation = Some(Box::new(presentation));
        self
    }

    /// Validate the configuration and spawn the driver task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Player, SegstreamError> {
        let presentation = self
            .presentation
            .ok_or_else(|| SegstreamError::MissingConfiguration {
                field: "presentation".to_string(),
            })?;
        self.config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| SegstreamError::Initialization {
                reason: format!("no async runtime: {}", e),
            })?;

        let transport = self.transport.unwrap_or_else(|| {
            Box::new(WebSocketTransport::new(self.config.connection.clone()))
        });
        let engine = Engine::new(self.config, transport, presentation);
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = runtime.spawn(drive(engine, rx));

        Ok(Player {
            url: Arc::from(self.url.as_str()),
            commands: tx,
            driver: Arc::new(driver),
        })
    }
}

/// Handle to a running player. Clones share the same session.
#[derive(Debug, Clone)]
pub struct Player {
    url: Arc<str>,
    commands: mpsc::UnboundedSender<PlayerCommand>,
    driver: Arc<JoinHandle<()>>,
}

impl std::fmt::Debug for PlayerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerCommand::Play { .. } => "play",
            PlayerCommand::Pause { .. } => "pause",
            PlayerCommand::Stop { .. } => "stop",
            PlayerCommand::Seek { .. } => "seek",
            PlayerCommand::SetTracks { .. } => "set_tracks",
            PlayerCommand::SetBufferMode { .. } => "set_buffer_mode",
            PlayerCommand::Streams { .. } => "streams",
            PlayerCommand::Stats { .. } => "stats",
            PlayerCommand::State { .. } => "state",
            PlayerCommand::Subscribe { .. } => "subscribe",
        };
        f.write_str(name)
    }
}

impl Player {
    /// Start building a player for a stream URL (http URLs are rewritten to ws)
    ///
    /// # Example
    /// ```rust,no_run
    /// use segstream::{HeadlessPresentation, Player};
    ///
    /// # async fn example() -> Result<(), segstream::SegstreamError> {
    /// let player = Player::builder("wss://media.example.com/cam1/mse_ld")
    ///     .presentation(HeadlessPresentation::new())
    ///     .build()?;
    /// player.play(None, "", "").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(url: &str) -> PlayerBuilder {
        PlayerBuilder::new(url)
    }

    /// Stream URL without query parameters
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start playback, or resume it when paused.
    ///
    /// `time` is passed to the server as the start position; `video` and
    /// `audio` select the tracks to deliver (empty means server default).
    pub async fn play(
        &self,
        time: Option<&str>,
        video: &str,
        audio: &str,
    ) -> Result<(), SegstreamError> {
        let params = OpenParams {
            url: self.url.to_string(),
            from: time.map(str::to_string),
            video: video.to_string(),
            audio: audio.to_string(),
        };
        self.request(|reply| PlayerCommand::Play { params, reply })
            .await?
    }

    /// Pause playback; waits for an in-flight play request first
    pub async fn pause(&self) -> Result<(), SegstreamError> {
        self.request(|reply| PlayerCommand::Pause { reply }).await?
    }

    /// Stop playback and tear the session down. Safe to call repeatedly
    /// and from several clones at once.
    pub async fn stop(&self) -> Result<(), SegstreamError> {
        self.request(|reply| PlayerCommand::Stop { reply }).await
    }

    /// Seek to `"live"` or to a UTC value understood by the server
    pub async fn seek(&self, utc_or_live: &str) -> Result<(), SegstreamError> {
        let target = SeekTarget::parse(utc_or_live)?;
        self.seek_to(target).await
    }

    /// Seek to a typed target
    pub async fn seek_to(&self, target: SeekTarget) -> Result<(), SegstreamError> {
        self.request(|reply| PlayerCommand::Seek { target, reply })
            .await?
    }

    /// Seek to a wall-clock instant
    pub async fn seek_to_time(&self, at: DateTime<Utc>) -> Result<(), SegstreamError> {
        self.seek_to(SeekTarget::from_datetime(at)).await
    }

    /// Switch delivered tracks by selector (`["v2", "a1"]`). Requires media
    /// info; unknown selectors are dropped.
    pub async fn set_tracks<I, S>(&self, ids: I) -> Result<(), SegstreamError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        self.request(|reply| PlayerCommand::SetTracks { ids, reply })
            .await?
    }

    /// Change the buffer mode applied to new sinks and after seeks
    pub fn set_buffer_mode(&self, mode: BufferMode) -> Result<(), SegstreamError> {
        self.commands
            .send(PlayerCommand::SetBufferMode { mode })
            .map_err(|_| driver_gone())
    }

    /// Declared video streams, `None` before the first init segment
    pub async fn video_tracks(&self) -> Result<Option<Vec<StreamInfo>>, SegstreamError> {
        self.request(|reply| PlayerCommand::Streams {
            kind: ContentKind::Video,
            reply,
        })
        .await
    }

    /// Declared audio streams, `None` before the first init segment
    pub async fn audio_tracks(&self) -> Result<Option<Vec<StreamInfo>>, SegstreamError> {
        self.request(|reply| PlayerCommand::Streams {
            kind: ContentKind::Audio,
            reply,
        })
        .await
    }

    /// Snapshot of session and per-track counters
    pub async fn stats(&self) -> Result<SessionStats, SegstreamError> {
        self.request(|reply| PlayerCommand::Stats { reply }).await
    }

    /// Current session state
    pub async fn state(&self) -> Result<SessionState, SegstreamError> {
        self.request(|reply| PlayerCommand::State { reply }).await
    }

    /// Subscribe to player events
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        // A stopped driver leaves the stream closed
        let _ = self.commands.send(PlayerCommand::Subscribe { tx });
        EventStream::new(rx)
    }

    /// Deliver player events to a callback handler
    pub fn attach_handler(&self, handler: &EventHandler) -> Result<(), SegstreamError> {
        self.commands
            .send(PlayerCommand::Subscribe {
                tx: handler.sender(),
            })
            .map_err(|_| driver_gone())
    }

    /// Whether the driver task has exited
    pub fn is_closed(&self) -> bool {
        self.driver.is_finished()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand,
    ) -> Result<T, SegstreamError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| driver_gone())?;
        rx.await.map_err(|_| driver_gone())
    }
}

fn driver_gone() -> SegstreamError {
    SegstreamError::InvalidState {
        expected: "running player".to_string(),
        actual: "player driver has exited".to_string(),
    }
}

async fn next_item<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}

/// Driver loop: the only place the engine is touched.
///
/// Sink events and frames are polled before commands, so a command observes
/// every frame that was delivered before it was sent.
async fn drive(mut engine: Engine, mut commands: mpsc::UnboundedReceiver<PlayerCommand>) {
    let mut frames: Option<FrameReceiver> = None;
    let mut sink_events: Option<mpsc::UnboundedReceiver<SinkEvent>> = None;
    let mut ticker = tokio::time::interval(engine.progress_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            Some(event) = next_item(&mut sink_events) => engine.handle_sink_event(event),
            frame = next_item(&mut frames) => match frame {
                Some(frame) => engine.handle_frame(frame),
                None => {
                    info!("transport closed by peer");
                    frames = None;
                }
            },
            command = commands.recv() => match command {
                Some(command) => {
                    if let Some(channels) = execute(&mut engine, command).await {
                        let SessionChannels { frames: f, sink_events: s } = channels;
                        frames = Some(f);
                        if s.is_some() {
                            sink_events = s;
                        }
                        ticker.reset();
                    }
                }
                None => break,
            },
            _ = ticker.tick(), if engine.state() == SessionState::Playing => {
                engine.report_progress();
            }
        }

        if let Some(reason) = engine.take_fatal() {
            engine.fail(reason).await;
        }
        if engine.state() == SessionState::Idle {
            frames = None;
            sink_events = None;
        }
    }

    engine.stop().await;
    debug!("player driver exited");
}

async fn execute(engine: &mut Engine, command: PlayerCommand) -> Option<SessionChannels> {
    debug!("player command: {:?}", command);
    match command {
        PlayerCommand::Play { params, reply } => match engine.play(params).await {
            Ok(channels) => {
                let _ = reply.send(Ok(()));
                return channels;
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        },
        PlayerCommand::Pause { reply } => {
            let _ = reply.send(engine.pause().await);
        }
        PlayerCommand::Stop { reply } => {
            engine.stop().await;
            let _ = reply.send(());
        }
        PlayerCommand::Seek { target, reply } => {
            let _ = reply.send(engine.seek(target));
        }
        PlayerCommand::SetTracks { ids, reply } => {
            let _ = reply.send(engine.set_tracks(&ids));
        }
        PlayerCommand::SetBufferMode { mode } => engine.set_buffer_mode(mode),
        PlayerCommand::Streams { kind, reply } => {
            let _ = reply.send(engine.streams_of(kind));
        }
        PlayerCommand::Stats { reply } => {
            let _ = reply.send(engine.stats());
        }
        PlayerCommand::State { reply } => {
            let _ = reply.send(engine.state());
        }
        PlayerCommand::Subscribe { tx } => engine.subscribe(tx),
    }
    None
}
