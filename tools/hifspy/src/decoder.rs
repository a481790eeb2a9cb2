use sensorhub_core::HubError;
use sensorhub_packets::{
    parse_packet, LocalPacket, ParseError, CTRL_PKT_HEADER_SIZE, MAX_HIF_PACKET_SIZE,
};
use thiserror::Error;

/// Problems found while splitting a host-interface stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("crc mismatch in {size} byte packet")]
    InvalidCrc { size: usize },
    #[error("skipped byte {byte:#04x}: {error}")]
    Unrecognized { byte: u8, error: HubError },
    #[error("stream ended inside a packet ({pending} bytes pending)")]
    Truncated { pending: usize },
}

/// Running totals kept by [`StreamDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub packets: usize,
    pub crc_errors: usize,
    pub skipped_bytes: usize,
}

/// Incremental decoder that accepts arbitrary byte chunks and yields parsed
/// packets.
///
/// Packets with a bad CRC are skipped by their nominal size. Bytes that do
/// not start any known packet are dropped one at a time until the stream
/// lines up again.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    stats: DecoderStats,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears any partial packet.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes held back waiting for the rest of a packet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds raw bytes into the decoder and returns every packet, or skip,
    /// that the bytes completed.
    pub fn push_bytes(&mut self, input: &[u8]) -> Vec<Result<LocalPacket, DecodeError>> {
        self.buffer.extend_from_slice(input);
        let mut results = Vec::new();
        let mut pos = 0;

        while pos < self.buffer.len() {
            match parse_packet(&self.buffer[pos..]) {
                Ok(parsed) => {
                    pos += parsed.size;
                    self.stats.packets += 1;
                    results.push(Ok(parsed.packet));
                }
                // wait for the rest unless the size is bogus
                Err(ParseError {
                    error: HubError::BufferTooSmall,
                    size,
                }) if size > 0 && size <= MAX_HIF_PACKET_SIZE => break,
                // header not complete yet
                Err(ParseError {
                    error: HubError::BufferTooSmall,
                    size: 0,
                }) if self.buffer.len() - pos < CTRL_PKT_HEADER_SIZE => break,
                Err(ParseError {
                    error: HubError::InvalidCrc,
                    size,
                }) if size > 0 => {
                    pos += size;
                    self.stats.crc_errors += 1;
                    self.stats.skipped_bytes += size;
                    results.push(Err(DecodeError::InvalidCrc { size }));
                }
                Err(err) => {
                    let byte = self.buffer[pos];
                    pos += 1;
                    self.stats.skipped_bytes += 1;
                    results.push(Err(DecodeError::Unrecognized {
                        byte,
                        error: err.error,
                    }));
                }
            }
        }

        self.buffer.drain(..pos);
        results
    }

    /// Ends the stream, reporting a trailing partial packet.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        let pending = self.buffer.len();
        self.reset();
        if pending == 0 {
            Ok(())
        } else {
            self.stats.skipped_bytes += pending;
            Err(DecodeError::Truncated { pending })
        }
    }
}
