//! Wire protocol: control frames, binary segment frames and command strings

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SegstreamError;

/// Length of the header in front of every binary segment frame.
///
/// Bytes `0..4` carry the track id as a big-endian `u32`; the media payload follows.
pub const BINARY_HEADER_LEN: usize = 4;

/// Seek target string meaning "server's live edge"
pub const LIVE: &str = "live";

/// Content kind of a declared stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Video elementary stream
    Video,
    /// Audio elementary stream
    Audio,
    /// Anything else the server declares (metadata, subtitles...)
    #[serde(other)]
    Other,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Video => write!(f, "video"),
            ContentKind::Audio => write!(f, "audio"),
            ContentKind::Other => write!(f, "other"),
        }
    }
}

/// One stream declared in the init segment metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Server-side selector for the stream ("v1", "a1", ...)
    pub track_id: String,
    /// Content kind
    pub content: ContentKind,
    /// Remaining fields (bitrate, codec, ...) passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Media info published with every init segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Declared streams, in server order
    pub streams: Vec<StreamInfo>,
    /// Remaining fields passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MediaInfo {
    /// Streams of the given kind
    pub fn streams_of(&self, kind: ContentKind) -> Vec<StreamInfo> {
        self.streams
            .iter()
            .filter(|s| s.content == kind)
            .cloned()
            .collect()
    }

    /// Content kind for a server-side selector
    pub fn kind_of(&self, selector: &str) -> Option<ContentKind> {
        self.streams
            .iter()
            .find(|s| s.track_id == selector)
            .map(|s| s.content)
    }
}

/// Per-track initialization payload inside an init segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitTrack {
    /// Numeric track id used by binary frames
    pub id: u32,
    /// Base64 payload
    pub payload: String,
}

impl InitTrack {
    /// Decode the base64 payload
    pub fn decode_payload(&self) -> Result<Bytes, SegstreamError> {
        decode_base64(&self.payload)
    }
}

/// Textual control frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Initialization segment for one or more tracks
    Init {
        /// Stream metadata
        metadata: MediaInfo,
        /// Initialization payloads
        tracks: Vec<InitTrack>,
    },
    /// Single-track media segment carried in JSON
    Media {
        /// Track id
        id: u32,
        /// Base64 payload
        payload: String,
    },
    /// Any other control type; ignored by the dispatcher
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Parse a textual frame
    pub fn parse(text: &str) -> Result<Self, SegstreamError> {
        serde_json::from_str(text).map_err(|e| SegstreamError::InvalidMessage {
            message: truncate(text, 128),
            source: e.into(),
        })
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String, SegstreamError> {
        serde_json::to_string(self).map_err(|e| SegstreamError::parse(e.to_string()))
    }

    /// Wire name of the message type
    pub fn type_name(&self) -> &'static str {
        match self {
            ControlMessage::Init { .. } => "init",
            ControlMessage::Media { .. } => "media",
            ControlMessage::Unknown => "unknown",
        }
    }
}

/// Binary segment frame: track id header followed by the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySegment {
    /// Track id from the header
    pub track_id: u32,
    /// Payload without the header
    pub payload: Bytes,
}

impl BinarySegment {
    /// Split a binary frame into track id and payload
    pub fn parse(frame: &Bytes) -> Result<Self, SegstreamError> {
        if frame.len() < BINARY_HEADER_LEN {
            return Err(SegstreamError::parse(format!(
                "binary frame too short: {} bytes",
                frame.len()
            )));
        }
        let mut id = [0u8; BINARY_HEADER_LEN];
        id.copy_from_slice(&frame[..BINARY_HEADER_LEN]);
        Ok(Self {
            track_id: u32::from_be_bytes(id),
            payload: frame.slice(BINARY_HEADER_LEN..),
        })
    }

    /// Encode back into a wire frame
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(BINARY_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.track_id.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Bytes::from(out)
    }
}

/// Where to resume delivery after a seek
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekTarget {
    /// Server's live edge
    Live,
    /// Absolute position, passed to the server verbatim
    At(String),
}

impl SeekTarget {
    /// Parse a user supplied seek value; empty strings are rejected
    pub fn parse(value: &str) -> Result<Self, SegstreamError> {
        match value.trim() {
            "" => Err(SegstreamError::InvalidState {
                expected: "\"live\" or a UTC value".to_string(),
                actual: "empty seek target".to_string(),
            }),
            LIVE => Ok(SeekTarget::Live),
            other => Ok(SeekTarget::At(other.to_string())),
        }
    }

    /// Seek to a wall-clock instant (whole seconds)
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        SeekTarget::At(at.timestamp().to_string())
    }
}

/// Outbound command strings understood by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resume delivery
    Resume,
    /// Pause delivery
    Pause,
    /// Seek
    Seek(SeekTarget),
    /// Switch delivered tracks
    SetTracks {
        /// Concatenated video selectors
        video: String,
        /// Concatenated audio selectors
        audio: String,
    },
}

impl Command {
    /// Render the wire string
    pub fn to_wire(&self) -> String {
        match self {
            Command::Resume => "resume".to_string(),
            Command::Pause => "pause".to_string(),
            // live seeks use an empty prefix, so the wire string is just "live"
            Command::Seek(SeekTarget::Live) => LIVE.to_string(),
            Command::Seek(SeekTarget::At(utc)) => format!("play_from={}", utc),
            Command::SetTracks { video, audio } => format!("set_tracks={}{}", video, audio),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Decode a base64 payload
pub fn decode_base64(payload: &str) -> Result<Bytes, SegstreamError> {
    STANDARD
        .decode(payload)
        .map(Bytes::from)
        .map_err(|e| SegstreamError::InvalidMessage {
            message: truncate(payload, 32),
            source: e.into(),
        })
}

/// Encode bytes as base64
pub fn encode_base64(payload: &[u8]) -> String {
    STANDARD.encode(payload)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
