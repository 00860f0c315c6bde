//! # segstream diagnostics
//!
//! Logging bootstrap, frame summaries for error reports, and a serializable
//! snapshot of session counters.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod frame_inspector;
pub mod session_stats;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use frame_inspector::{frame_summary, hex_preview};
pub use session_stats::{SessionStats, TrackReport};
