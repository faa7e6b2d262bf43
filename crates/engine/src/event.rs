//! Event stream protocol
//!
//! The wire contract between the dispatcher and a consumer: an ordered
//! sequence of tagged JSON events over one long-lived connection, each frame
//! `"data: " + json + "\n\n"`. Exactly one `start` opens the stream and
//! exactly one terminal event (`complete`, or a job-scoped `error`) ends it.
//! Per-chunk ordering is guaranteed (`chunk_start` → `result` →
//! `chunk_complete`); cross-chunk ordering is not.
//!
//! The payload type is generic: classification jobs carry
//! `ClassificationResult`, replacement jobs carry `ReplacementResult`.

use partforge_common::errors::{AppError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// SSE frame prefix
pub const FRAME_PREFIX: &str = "data: ";

/// SSE frame terminator
pub const FRAME_TERMINATOR: &str = "\n\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent<R> {
    /// Job accepted; the skip count is known before any dispatch
    Start {
        total_records: usize,
        total_chunks: usize,
        total_skipped: usize,
    },

    /// A chunk began processing
    ChunkStart {
        chunk: u32,
        total_chunks: usize,
        records_in_chunk: usize,
    },

    /// A chunk finished, successfully or with a handled error
    ChunkComplete { chunk: u32, total_chunks: usize },

    /// Incremental payload: one chunk's results, as soon as available
    Result { chunk: u32, results: Vec<R> },

    /// Chunk-scoped (recoverable) or job-scoped (fatal, no chunk) failure
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk: Option<u32>,
    },

    /// Terminal: the full accumulated result set, superseding prior `result`s
    Complete {
        total_analyzed: usize,
        total_skipped: usize,
        results: Vec<R>,
    },
}

impl<R> StreamEvent<R> {
    /// True for events that end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Error { chunk: None, .. }
        )
    }
}

impl<R: Serialize> StreamEvent<R> {
    /// Encode this event as one SSE frame
    pub fn to_frame(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{FRAME_PREFIX}{json}{FRAME_TERMINATOR}"))
    }
}

/// Decode one SSE frame body (without the trailing blank line) into an event
pub fn decode_frame<R: DeserializeOwned>(frame: &str) -> Result<StreamEvent<R>> {
    let body = frame
        .strip_prefix(FRAME_PREFIX)
        .ok_or_else(|| AppError::InvalidFormat {
            message: format!("frame missing '{}' prefix: {:.120}", FRAME_PREFIX.trim(), frame),
        })?;

    Ok(serde_json::from_str(body.trim_end())?)
}
