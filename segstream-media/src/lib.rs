//! # segstream media
//!
//! Everything between a classified segment and a playback sink: the sink
//! contract, one FIFO per track, and the flush engine that removes buffered
//! media when the server reconfigures the stream.

#![warn(clippy::all)]

pub mod error;
pub mod flush;
pub mod memory;
pub mod queue;
pub mod sink;
pub mod tracks;

// Re-export main types
pub use error::{SinkError, SinkResult};
pub use flush::{FlushEngine, FlushPolicy, FlushRange, FlushStatus, MIN_REMOVAL_LENGTH};
pub use memory::{MemorySink, MemorySinkHandle};
pub use queue::{Delivery, Track, TrackSet};
pub use sink::{MediaSink, SinkEvent, SinkEventKind, SinkNotifier};
pub use tracks::{BufferMode, Segment, SegmentKind, TimeRange, TrackStats};
