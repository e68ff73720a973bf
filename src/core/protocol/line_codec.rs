// src/core/protocol/line_codec.rs

//! Frames a TCP byte stream into newline-delimited JSON lines. Mirrors the
//! shape of a `tokio_util::codec::{Decoder,Encoder}` pair: scan the buffer
//! for the frame delimiter, hand complete frames to `serde_json` instead of
//! a binary parser.

use bytes::BytesMut;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::errors::FsError;

/// Maximum line length per the transport spec.
pub const MAX_LINE_LEN: usize = 8192;

pub struct LineCodec<T> {
    _marker: PhantomData<T>,
}

impl<T> Default for LineCodec<T> {
    fn default() -> Self {
        LineCodec {
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Decoder for LineCodec<T> {
    type Item = T;
    type Error = FsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, FsError> {
        let Some(newline_pos) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_LINE_LEN {
                return Err(FsError::LineTooLong);
            }
            return Ok(None);
        };

        if newline_pos > MAX_LINE_LEN {
            return Err(FsError::LineTooLong);
        }

        let line = src.split_to(newline_pos + 1);
        // Drop the trailing '\n' (and a possible preceding '\r').
        let line = &line[..line.len() - 1];
        let line = if line.last() == Some(&b'\r') {
            &line[..line.len() - 1]
        } else {
            line
        };

        if line.is_empty() {
            return self.decode(src);
        }

        let value: T = serde_json::from_slice(line)?;
        Ok(Some(value))
    }
}

// `Encoder` is implemented for any serializable `U`, independent of the
// decoder's item type `T`: a connection reads one message shape and writes
// another (a server decodes `Request` and encodes `Response`; a client does
// the reverse), and `LineCodec` carries no state that depends on which type
// it's framing.
impl<T, U: Serialize> Encoder<U> for LineCodec<T> {
    type Error = FsError;

    fn encode(&mut self, item: U, dst: &mut BytesMut) -> Result<(), FsError> {
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');
        dst.extend_from_slice(&line);
        Ok(())
    }
}
