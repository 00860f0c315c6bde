//! Frame summaries for error reports

use segstream_core::{Frame, BINARY_HEADER_LEN};
use std::fmt::Write;

const PREVIEW_BYTES: usize = 16;
const PREVIEW_CHARS: usize = 80;

/// Hex dump of the first `max` bytes
pub fn hex_preview(data: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(max * 3);
    for (i, byte) in data.iter().take(max).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    if data.len() > max {
        out.push_str(" ..");
    }
    out
}

/// One-line description of a frame for logs
pub fn frame_summary(frame: &Frame) -> String {
    match frame {
        Frame::Binary(data) => {
            let track = (data.len() >= BINARY_HEADER_LEN).then(|| {
                let mut id = [0u8; BINARY_HEADER_LEN];
                id.copy_from_slice(&data[..BINARY_HEADER_LEN]);
                u32::from_be_bytes(id)
            });
            format!(
                "binary frame, {} bytes, track {:?}: {}",
                data.len(),
                track,
                hex_preview(data, PREVIEW_BYTES)
            )
        }
        Frame::Text(text) => {
            let preview: String = text.chars().take(PREVIEW_CHARS).collect();
            let ellipsis = if text.chars().count() > PREVIEW_CHARS {
                "..."
            } else {
                ""
            };
            format!("text frame, {} bytes: {}{}", text.len(), preview, ellipsis)
        }
    }
}
