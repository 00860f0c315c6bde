//! # segstream
//!
//! Client-side engine that receives media segments over a persistent
//! connection and feeds them, in order, into one playback sink per
//! elementary stream.
//!
//! ## Key Features
//!
//! - **Ordered delivery**: one FIFO per track, never more than one append in flight per sink
//! - **Bounded flush**: buffered media is removed on reconfiguration with a guaranteed end
//! - **Track switching**: frames for the old selection are held and replayed, never lost
//! - **Seek**: live or absolute, with a sink reset on the next init segment
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segstream::{HeadlessPresentation, Player, PlayerEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let player = Player::builder("wss://media.example.com/cam1/mse_ld")
//!         .presentation(HeadlessPresentation::new())
//!         .build()?;
//!
//!     let mut events = player.events();
//!     player.play(None, "", "").await?;
//!
//!     while let Some(event) = events.next().await {
//!         if let PlayerEvent::MediaInfo { info } = &event {
//!             println!("{} streams", info.streams.len());
//!             player.seek("live").await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use segstream_core::{
    decode_base64, encode_base64, http_to_ws, BinarySegment, Command, ConnectionConfig,
    ContentKind, ControlMessage, ErrorCategory, Frame, MediaInfo, OpenParams, SeekTarget,
    SegstreamError, StreamInfo, Transport, WebSocketTransport,
};
pub use segstream_diagnostics::{DebugLogger, SessionStats, TrackReport};
pub use segstream_media::{
    BufferMode, FlushPolicy, MediaSink, MemorySink, MemorySinkHandle, SinkError, SinkNotifier,
    TimeRange, TrackStats,
};

// Public API modules
pub mod config;
pub mod dispatcher;
mod engine;
pub mod event;
pub mod headless;
pub mod loopback;
pub mod player;
pub mod presentation;
pub mod progress;
pub mod session;
pub mod switch;

// Re-export main API types
pub use config::PlayerConfig;
pub use event::{EventHandler, EventStream, PlayerEvent};
pub use headless::HeadlessPresentation;
pub use loopback::LoopbackTransport;
pub use player::{Player, PlayerBuilder};
pub use presentation::{EmptiedHandle, EmptiedNotifier, PlayCompleter, PlayHandle, Presentation};
pub use session::{PlaybackSession, SessionState};
