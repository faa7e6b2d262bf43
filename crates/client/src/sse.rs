//! SSE frame decoding
//!
//! The gateway answers with a sequence of `"data: " + json + "\n\n"` frames
//! over one long-lived response body. Transport chunks split frames at
//! arbitrary byte boundaries, so decoding is incremental: bytes go in,
//! complete frames come out, partial trailing data stays buffered. Only
//! complete frames are converted to text, which keeps multi-byte characters
//! split across chunks intact.

use partforge_common::errors::{AppError, Result};

const FRAME_BOUNDARY: &[u8] = b"\n\n";

/// Incremental decoder for an SSE byte stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes in; get every newly completed frame body back.
    ///
    /// Returned strings carry the `data: ` prefix and no trailing blank
    /// line. Comment frames (keep-alives, starting with `:`) are filtered
    /// out here.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(boundary) = find_boundary(&self.buffer) {
            let frame_bytes: Vec<u8> = self
                .buffer
                .drain(..boundary + FRAME_BOUNDARY.len())
                .take(boundary)
                .collect();

            let frame = String::from_utf8(frame_bytes).map_err(|e| AppError::InvalidFormat {
                message: format!("frame is not valid UTF-8: {}", e),
            })?;

            let frame = frame.trim_start_matches('\n');
            if frame.is_empty() || frame.starts_with(':') {
                continue;
            }
            frames.push(frame.to_string());
        }

        Ok(frames)
    }

    /// Bytes received but not yet forming a complete frame
    pub fn residual(&self) -> usize {
        self.buffer.len()
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_BOUNDARY.len())
        .position(|window| window == FRAME_BOUNDARY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(b"data: {\"type\":\"start\"}\n\n")
            .unwrap();
        assert_eq!(frames, vec!["data: {\"type\":\"start\"}"]);
        assert_eq!(decoder.residual(), 0);
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":").unwrap().is_empty());
        assert!(decoder.push(b"\"start\"}").unwrap().is_empty());
        let frames = decoder.push(b"\n\n").unwrap();
        assert_eq!(frames, vec!["data: {\"type\":\"start\"}"]);
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(b"data: 1\n\ndata: 2\n\ndata: 3")
            .unwrap();
        assert_eq!(frames, vec!["data: 1", "data: 2"]);
        // "data: 3" is still waiting for its boundary
        assert!(decoder.residual() > 0);
        let frames = decoder.push(b"\n\n").unwrap();
        assert_eq!(frames, vec!["data: 3"]);
    }

    #[test]
    fn test_keep_alive_comments_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .push(b": keep-alive\n\ndata: {\"type\":\"start\"}\n\n")
            .unwrap();
        assert_eq!(frames, vec!["data: {\"type\":\"start\"}"]);
    }

    #[test]
    fn test_multibyte_characters_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        let frame = "data: {\"notes\":\"Temp \u{00b0}C\"}\n\n".as_bytes();
        // Split inside the two-byte degree sign
        let split = frame.iter().position(|&b| b == 0xc2).unwrap() + 1;
        assert!(decoder.push(&frame[..split]).unwrap().is_empty());
        let frames = decoder.push(&frame[split..]).unwrap();
        assert_eq!(frames, vec!["data: {\"notes\":\"Temp \u{00b0}C\"}"]);
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.push(b"data: \xff\xfe\n\n").unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
    }
}
