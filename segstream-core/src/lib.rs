//! # segstream core
//!
//! Wire protocol, transport contract and error types shared by the
//! segstream crates. The media side lives in `segstream-media`; this crate
//! only knows about frames, commands and the connection they travel over.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use error::{ErrorCategory, SegstreamError};
pub use protocol::{
    decode_base64, encode_base64, BinarySegment, Command, ContentKind, ControlMessage, InitTrack,
    MediaInfo, SeekTarget, StreamInfo, BINARY_HEADER_LEN, LIVE,
};
pub use transport::{
    http_to_ws, ConnectionConfig, Frame, FrameReceiver, OpenParams, Transport, WebSocketTransport,
};
