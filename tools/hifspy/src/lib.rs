//! Host-side utilities for decoding sensor hub host-interface streams.
//!
//! The hub answers Get-Data transactions with back-to-back packets. This
//! crate splits such a byte stream into packets, resynchronises after
//! corrupted ones and renders them for a terminal or as JSON lines.

mod decoder;
mod formatter;

pub use decoder::{DecodeError, DecoderStats, StreamDecoder};
pub use formatter::PacketFormatter;
