// src/core/protocol/mod.rs

//! The wire protocol: newline-delimited JSON framing plus the request and
//! response message shapes exchanged by clients, the Name Server, and
//! Storage Servers.

pub mod line_codec;
pub mod messages;

pub use line_codec::LineCodec;
pub use messages::{Request, Response, StreamMessage};
