//! Chunk codec for child process output.
//!
//! Unlike a line codec, [`ChunkCodec`] yields whatever text has arrived as
//! soon as it arrives: interactive programs print prompts without a
//! trailing newline, and those must reach the client immediately.
//!
//! The only thing held back is an incomplete UTF-8 sequence at the end of
//! the buffer, which is completed by the next read. Invalid bytes are
//! replaced with U+FFFD.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Decoder turning raw output bytes into UTF-8 text chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkCodec;

impl ChunkCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Number of leading bytes of `buf` that can be decoded now.
fn ready_len(buf: &[u8]) -> usize {
    match std::str::from_utf8(buf) {
        Ok(_) => buf.len(),
        Err(err) => match err.error_len() {
            // Truncated sequence at the end: wait for the rest.
            None => err.valid_up_to(),
            // Invalid bytes: emit them (lossily) with the valid prefix.
            Some(invalid) => err.valid_up_to() + invalid,
        },
    }
}

impl Decoder for ChunkCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let take = ready_len(src);
        if take == 0 {
            return Ok(None);
        }
        let chunk = src.split_to(take);
        Ok(Some(String::from_utf8_lossy(&chunk).into_owned()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Stream ended mid-character.
        let rest = src.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}
