//! Frame classification
//!
//! Turns an inbound frame into something the engine can act on. All decoding
//! happens here, before any track is touched, so a malformed frame is
//! rejected as a whole.

use bytes::Bytes;
use segstream_core::{
    BinarySegment, ContentKind, ControlMessage, Frame, InitTrack, MediaInfo, SegstreamError,
};
use segstream_media::Segment;
use tracing::debug;

/// One track declared by an init segment
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredTrack {
    /// Numeric id used by binary frames
    pub id: u32,
    /// Content kind from the metadata
    pub kind: ContentKind,
    /// Server-side selector
    pub selector: String,
    /// Decoded initialization payload, if the server sent one
    pub payload: Option<Bytes>,
}

impl DeclaredTrack {
    /// The initialization segment for this track
    pub fn init_segment(&self) -> Option<Segment> {
        self.payload
            .as_ref()
            .map(|payload| Segment::init(self.id, payload.clone()))
    }
}

/// Result of classifying a frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A media segment for one track
    Media(Segment),
    /// An init segment: metadata plus per-track payloads
    Init {
        /// Published media info
        info: MediaInfo,
        /// Declared audio and video tracks, in metadata order
        tracks: Vec<DeclaredTrack>,
    },
    /// A control frame the engine does not act on
    Ignored,
}

/// Classify one frame
pub fn classify(frame: &Frame) -> Result<Inbound, SegstreamError> {
    match frame {
        Frame::Binary(data) => {
            let segment = BinarySegment::parse(data)?;
            Ok(Inbound::Media(Segment::media(segment.track_id, segment.payload)))
        }
        Frame::Text(text) => match ControlMessage::parse(text)? {
            ControlMessage::Init { metadata, tracks } => {
                let declared = declare_tracks(&metadata, &tracks)?;
                Ok(Inbound::Init {
                    info: metadata,
                    tracks: declared,
                })
            }
            ControlMessage::Media { id, payload } => {
                let payload = segstream_core::decode_base64(&payload)?;
                Ok(Inbound::Media(Segment::media(id, payload)))
            }
            ControlMessage::Unknown => {
                debug!("ignoring control frame of unknown type");
                Ok(Inbound::Ignored)
            }
        },
    }
}

/// Pair each declared stream with the payload at the same position.
///
/// The numeric id comes from the payload entry, or from the stream's
/// one-based position when the server sent fewer payloads than streams. The
/// kind always comes from the metadata.
fn declare_tracks(
    metadata: &MediaInfo,
    tracks: &[InitTrack],
) -> Result<Vec<DeclaredTrack>, SegstreamError> {
    let mut declared = Vec::with_capacity(metadata.streams.len());
    for (i, stream) in metadata.streams.iter().enumerate() {
        if stream.content == ContentKind::Other {
            debug!("skipping {} stream {}", stream.content, stream.track_id);
            continue;
        }
        let entry = tracks.get(i);
        let payload = entry.map(InitTrack::decode_payload).transpose()?;
        declared.push(DeclaredTrack {
            id: entry.map(|t| t.id).unwrap_or(i as u32 + 1),
            kind: stream.content,
            selector: stream.track_id.clone(),
            payload,
        });
    }

    for (i, track) in declared.iter().enumerate() {
        if declared[..i].iter().any(|t| t.id == track.id) {
            return Err(SegstreamError::parse(format!(
                "init segment declares track id {} twice",
                track.id
            )));
        }
    }
    let audio = declared.iter().filter(|t| t.kind == ContentKind::Audio).count();
    if audio > 1 {
        return Err(SegstreamError::parse(format!(
            "init segment declares {} audio streams",
            audio
        )));
    }
    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use segstream_core::encode_base64;

    fn init_frame(streams: &str, tracks: &str) -> Frame {
        Frame::Text(format!(
            r#"{{"type":"init","metadata":{{"streams":[{}]}},"tracks":[{}]}}"#,
            streams, tracks
        ))
    }

    #[test]
    fn test_binary_frame_becomes_media_segment() {
        let frame = Frame::Binary(Bytes::from_static(&[0, 0, 0, 2, 0xaa]));
        match classify(&frame).unwrap() {
            Inbound::Media(segment) => {
                assert_eq!(segment.track_id(), 2);
                assert_eq!(segment.payload().as_ref(), &[0xaa]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_init_declares_tracks_from_metadata() {
        let frame = init_frame(
            r#"{"track_id":"v1","content":"video"},{"track_id":"a1","content":"audio"}"#,
            &format!(
                r#"{{"id":1,"payload":"{}"}},{{"id":2,"payload":"{}"}}"#,
                encode_base64(b"vinit"),
                encode_base64(b"ainit")
            ),
        );
        let Inbound::Init { info, tracks } = classify(&frame).unwrap() else {
            panic!("expected init");
        };
        assert_eq!(info.streams.len(), 2);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].kind, ContentKind::Video);
        assert_eq!(tracks[0].selector, "v1");
        assert_eq!(tracks[1].id, 2);
        assert_eq!(tracks[1].kind, ContentKind::Audio);
        assert_eq!(
            tracks[1].init_segment().unwrap().payload().as_ref(),
            b"ainit"
        );
    }

    #[test]
    fn test_kind_comes_from_metadata_not_id() {
        // Audio first: id 1 is audio, no hardcoded "2 means video"
        let frame = init_frame(
            r#"{"track_id":"a1","content":"audio"},{"track_id":"v1","content":"video"},{"track_id":"t1","content":"text"}"#,
            r#"{"id":1,"payload":""}"#,
        );
        let Inbound::Init { tracks, .. } = classify(&frame).unwrap() else {
            panic!("expected init");
        };
        assert_eq!(tracks.len(), 2);
        assert_eq!((tracks[0].id, tracks[0].kind), (1, ContentKind::Audio));
        assert_eq!((tracks[1].id, tracks[1].kind), (2, ContentKind::Video));
        assert!(tracks[1].payload.is_none());
    }

    #[test]
    fn test_json_media_segment() {
        let frame = Frame::Text(format!(
            r#"{{"type":"media","id":1,"payload":"{}"}}"#,
            encode_base64(b"m")
        ));
        assert_eq!(
            classify(&frame).unwrap(),
            Inbound::Media(Segment::media(1, Bytes::from_static(b"m")))
        );
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        assert!(classify(&Frame::Binary(Bytes::from_static(&[1]))).is_err());
        assert!(classify(&Frame::Text("{".to_string())).is_err());
        let bad_payload = init_frame(
            r#"{"track_id":"v1","content":"video"}"#,
            r#"{"id":1,"payload":"@@@"}"#,
        );
        assert!(classify(&bad_payload).is_err());
        let two_audio = init_frame(
            r#"{"track_id":"a1","content":"audio"},{"track_id":"a2","content":"audio"}"#,
            "",
        );
        assert_eq!(
            classify(&two_audio).unwrap_err().error_code(),
            "PARSE_ERROR"
        );
        let same_id = init_frame(
            r#"{"track_id":"v1","content":"video"},{"track_id":"a1","content":"audio"}"#,
            r#"{"id":1,"payload":""},{"id":1,"payload":""}"#,
        );
        assert!(classify(&same_id).is_err());
    }

    #[test]
    fn test_unknown_control_is_ignored() {
        let frame = Frame::Text(r#"{"type":"event","name":"eos"}"#.to_string());
        assert_eq!(classify(&frame).unwrap(), Inbound::Ignored);
    }
}
