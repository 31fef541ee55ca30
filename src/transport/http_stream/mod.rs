//! Chunked-HTTP chat transport
//!
//! Used when a persistent socket is unavailable. One POST per chat message;
//! the reply body is decoded incrementally by [`ChunkDecoder`].

mod client;
mod decoder;

pub use client::{ChatEventStream, HttpStreamTransport};
pub use decoder::ChunkDecoder;
