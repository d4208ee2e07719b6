//! Logging utilities for binary link data. Frames and payloads are raw bytes,
//! so logs carry a bounded hex preview instead of the data itself.

/// Render up to `max` bytes of `data` as a contiguous lowercase hex string.
/// Keeps trace logs single-line and caps their size regardless of frame length.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    use std::cmp::min;
    data.iter()
        .take(min(max, data.len()))
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join("")
}
